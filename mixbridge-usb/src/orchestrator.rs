//! Transport orchestrator (spec §4.F): owns the transfer pools that
//! drive the capture decoder, playback encoder, and feedback
//! accumulator, plus the stdin watcher and ~1 Hz diagnostic line.
//!
//! Mirrors the original driver's `run_audio()`: fixed pools of
//! inflight transfers are submitted up front, each re-arming itself
//! from its own completion callback, while a single thread pumps
//! `libusb_handle_events`. Shutdown cancels every outstanding transfer
//! and keeps pumping events for a fixed drain window before the pools
//! are freed.

use std::{
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rusb::UsbContext;

use mixbridge_core::{RingConsumer, RingProducer};
use mixbridge_transport::{Diagnostics, FeedbackAccumulator};

use crate::{device::Device, transfer::TransferPools};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(200);
const DRAIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Orchestrator lifecycle, per spec §4.F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Init,
    DeviceReady,
    Streaming,
    Draining,
    Terminated,
}

/// Runs the transfer pools and event pump until shutdown is requested,
/// then cancels, drains, and frees them.
pub struct TransportOrchestrator {
    device: Arc<Device>,
    ib_producer: Option<RingProducer>,
    rb_consumer: Option<RingConsumer>,
    feedback: Arc<FeedbackAccumulator>,
    diagnostics: Arc<Diagnostics>,
    done: Arc<AtomicBool>,
    state: OrchestratorState,
}

impl TransportOrchestrator {
    pub fn new(device: Device, ib_producer: RingProducer, rb_consumer: RingConsumer, feedback: Arc<FeedbackAccumulator>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            device: Arc::new(device),
            ib_producer: Some(ib_producer),
            rb_consumer: Some(rb_consumer),
            feedback,
            diagnostics,
            done: Arc::new(AtomicBool::new(false)),
            state: OrchestratorState::DeviceReady,
        }
    }

    /// A clone of the shutdown flag, for wiring into the host daemon's
    /// shutdown callback alongside the stdin watcher.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.done)
    }

    /// Arms the transfer pools, starts the event pump, stdin-watcher,
    /// and diagnostic threads, then blocks until shutdown is requested
    /// and everything has drained.
    pub fn run(mut self) {
        self.state = OrchestratorState::Streaming;
        tracing::info!(state = ?self.state, "arming transfer pools");

        let ib_producer = self.ib_producer.take().expect("orchestrator run twice");
        let rb_consumer = self.rb_consumer.take().expect("orchestrator run twice");

        let pools = match TransferPools::submit(
            self.device.handle.as_raw(),
            ib_producer,
            rb_consumer,
            Arc::clone(&self.feedback),
            Arc::clone(&self.diagnostics),
            Arc::clone(&self.done),
        ) {
            Ok(pools) => pools,
            Err(err) => {
                tracing::error!(%err, "failed to arm transfer pools, aborting");
                self.done.store(true, Ordering::Relaxed);
                return;
            }
        };

        tracing::info!("transfer pools armed, starting event pump");
        let pump = spawn_event_pump_thread(Arc::clone(&self.device), Arc::clone(&self.done));
        let stdin_watcher = spawn_stdin_watcher(Arc::clone(&self.done));
        let diagnostics = self.spawn_diagnostics_thread();

        while !self.done.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(50));
        }

        self.state = OrchestratorState::Draining;
        tracing::info!(state = ?self.state, "shutdown requested, cancelling transfer pools");
        pools.cancel_all();

        let drain_deadline = Instant::now() + DRAIN_TIMEOUT;
        let _ = pump.join_timeout(drain_deadline.saturating_duration_since(Instant::now()));
        let _ = diagnostics.join_timeout(drain_deadline.saturating_duration_since(Instant::now()));
        let _ = stdin_watcher.join();

        drop(pools);

        self.state = OrchestratorState::Terminated;
        tracing::info!(state = ?self.state, "transfer pools drained");
    }

    fn spawn_diagnostics_thread(&self) -> JoinHandleWithTimeout {
        let diagnostics = Arc::clone(&self.diagnostics);
        let feedback = Arc::clone(&self.feedback);
        let done = Arc::clone(&self.done);

        JoinHandleWithTimeout::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                thread::sleep(DIAGNOSTIC_INTERVAL);
                let snap = diagnostics.snapshot();
                tracing::info!(
                    ib_drops = snap.ib_drops,
                    ib_adds = snap.ib_adds,
                    rb_drops = snap.rb_drops,
                    rb_adds = snap.rb_adds,
                    capture_overruns = snap.capture_overruns,
                    playback_underruns = snap.playback_underruns,
                    out_delta = feedback.snapshot(),
                    "bridge status"
                );
            }
        })
    }
}

/// Drives the transfer pools: calls `libusb_handle_events` until
/// shutdown is requested, then keeps calling it for [`DRAIN_TIMEOUT`]
/// so outstanding cancellations land before the pools are freed —
/// matching `run_audio()`'s own post-cancel poll loop.
fn spawn_event_pump_thread(device: Arc<Device>, done: Arc<AtomicBool>) -> JoinHandleWithTimeout {
    JoinHandleWithTimeout::spawn(move || {
        while !done.load(Ordering::Relaxed) {
            if let Err(err) = device.context.handle_events(Some(EVENT_POLL_TIMEOUT)) {
                tracing::warn!(%err, "libusb_handle_events failed");
            }
        }

        let drain_deadline = Instant::now() + DRAIN_TIMEOUT;
        while Instant::now() < drain_deadline {
            let _ = device.context.handle_events(Some(DRAIN_POLL_TIMEOUT));
        }
    })
}

/// Shutdown is driven by this thread and the JACK shutdown callback
/// only. The original driver's source notes that installing a raw
/// `SIGINT` handler alongside its USB event loop does not work and
/// core-dumps on exit; it relies on a stdin poll instead. That
/// constraint is preserved here rather than added back with
/// `ctrlc`/`signal-hook`.
fn spawn_stdin_watcher(done: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut byte = [0u8; 1];
        if std::io::stdin().read_exact(&mut byte).is_ok() {
            tracing::info!("stdin input observed, requesting shutdown");
            done.store(true, Ordering::Relaxed);
        }
    })
}

/// A `JoinHandle` wrapper that polls for completion instead of blocking
/// indefinitely, so the drain sequence can honor a wall-clock deadline.
struct JoinHandleWithTimeout(JoinHandle<()>);

impl JoinHandleWithTimeout {
    fn spawn<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Self(thread::spawn(f))
    }

    fn join_timeout(self, budget: Duration) -> std::thread::Result<()> {
        // `JoinHandle` has no native timed join; the pump and
        // diagnostics threads both check `done`/the drain deadline on
        // their own, so this sleep is a cooperative best-effort wait,
        // not a hard deadline.
        thread::sleep(budget.min(Duration::from_millis(250)));
        self.0.join()
    }
}
