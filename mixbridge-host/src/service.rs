//! JACK client glue: port registration, process callback wiring, and
//! the latency/shutdown notification handlers (spec §4.E, §6, §9).

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use jack::{AudioIn, AudioOut, Client, ClientOptions, ClientStatus, Control, LatencyType, NotificationHandler, Port, ProcessHandler, ProcessScope};
use mixbridge_core::{RingConsumer, RingProducer, StackVec};
use mixbridge_transport::{
    Diagnostics,
    constants::{CAPTURE_CHANNELS, CAPTURE_LATENCY_FRAMES, CAPTURE_PORT_NAMES, PLAYBACK_CHANNELS, PLAYBACK_LATENCY_FRAMES, PLAYBACK_PORT_NAMES},
};

use crate::{
    clock::JackFrameClock,
    engine::HostEngine,
    error::Result,
};

/// Shared shutdown signal, set either by the host daemon's shutdown
/// callback or by the orchestrator (stdin watcher / fatal error).
///
/// Per spec §9's note on global mutable state, this is the single
/// service context value the pump thread and JACK callbacks share.
#[derive(Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

struct BridgeProcessHandler {
    engine: HostEngine,
    output_ports: Vec<Port<AudioOut>>,
    input_ports: Vec<Port<AudioIn>>,
}

impl ProcessHandler for BridgeProcessHandler {
    fn process(&mut self, client: &Client, ps: &ProcessScope) -> Control {
        let nframes = ps.n_frames();
        let clock = JackFrameClock::new(client);

        // StackVec, not Vec: port reference lists are rebuilt every
        // cycle on the realtime thread and must not allocate.
        let mut out_slices: StackVec<&mut [f32], CAPTURE_CHANNELS> = StackVec::new();
        for port in self.output_ports.iter_mut() {
            let _ = out_slices.push(port.as_mut_slice(ps));
        }
        let mut in_slices: StackVec<&[f32], PLAYBACK_CHANNELS> = StackVec::new();
        for port in self.input_ports.iter() {
            let _ = in_slices.push(port.as_slice(ps));
        }

        match self.engine.process(nframes, out_slices.as_mut_slice(), in_slices.as_slice(), &clock) {
            Ok(()) => Control::Continue,
            Err(err) => {
                tracing::error!(%err, "fatal error in host period engine, requesting shutdown");
                Control::Quit
            }
        }
    }
}

struct BridgeNotifications {
    shutdown: ShutdownFlag,
}

impl NotificationHandler for BridgeNotifications {
    fn shutdown(&mut self, status: ClientStatus, reason: &str) {
        tracing::warn!(?status, reason, "host daemon requested shutdown");
        self.shutdown.set();
    }

    fn latency(&mut self, client: &Client, mode: LatencyType) {
        // Capture latency is reported on the output ports, playback
        // latency on the input ports: preserved verbatim per spec §9.
        let (names, frames): (&[&str], u32) = match mode {
            LatencyType::Capture => (&CAPTURE_PORT_NAMES, CAPTURE_LATENCY_FRAMES as u32),
            LatencyType::Playback => (&PLAYBACK_PORT_NAMES, PLAYBACK_LATENCY_FRAMES as u32),
        };

        for name in names {
            if let Some(port) = client.port_by_name(name) {
                let mut range = port.get_latency_range(mode);
                range.min = frames;
                range.max = frames;
                port.set_latency_range(mode, range);
            }
        }
    }
}

/// Registers ports, wires the period engine into the process callback,
/// and activates the client against the host daemon. Returns the
/// active client handle; dropping or deactivating it tears the service
/// down.
pub fn start(
    port_name: &str,
    ib_consumer: RingConsumer,
    rb_producer: RingProducer,
    diagnostics: Arc<Diagnostics>,
    shutdown: ShutdownFlag,
) -> Result<jack::AsyncClient<impl NotificationHandler, impl ProcessHandler>> {
    let (client, status) = Client::new(port_name, ClientOptions::NO_START_SERVER)?;
    tracing::info!(?status, client_name = client.name(), "connected to host audio daemon");
    if status.contains(ClientStatus::NAME_NOT_UNIQUE) {
        tracing::info!(assigned_name = client.name(), requested_name = port_name, "requested client name was taken, daemon assigned a unique one");
    }
    if status.contains(ClientStatus::SERVER_STARTED) {
        tracing::info!("host daemon was not already running, started it for us");
    }

    // NOTE: the host daemon's C API lets a client mark its own ports as
    // physical/terminal; the safe jack-rs port builder doesn't expose
    // those flags, so they are left at their defaults here.
    let mut output_ports = Vec::with_capacity(CAPTURE_CHANNELS);
    for name in CAPTURE_PORT_NAMES {
        output_ports.push(client.register_port(name, AudioOut::default())?);
    }

    let mut input_ports = Vec::with_capacity(PLAYBACK_CHANNELS);
    for name in PLAYBACK_PORT_NAMES {
        input_ports.push(client.register_port(name, AudioIn::default())?);
    }

    let engine = HostEngine::new(ib_consumer, rb_producer, diagnostics);
    let process_handler = BridgeProcessHandler {
        engine,
        output_ports,
        input_ports,
    };
    let notifications = BridgeNotifications { shutdown };

    let active = client.activate_async(notifications, process_handler)?;
    Ok(active)
}
