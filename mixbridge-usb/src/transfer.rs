//! Async USB transfer pools (spec §4.F).
//!
//! Three fixed-size pools of inflight `libusb_transfer`s — BULK IN
//! capture, ISO IN feedback, ISO OUT playback — are submitted up front
//! and re-arm themselves from their own completion callbacks, mirroring
//! the original driver's `run_audio()`. A single pump thread drives
//! everything by calling `libusb_handle_events` in a loop; no transfer
//! is ever touched from a second thread.

use std::{
    os::raw::{c_int, c_uint, c_void},
    slice,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use mixbridge_core::{RingConsumer, RingProducer};
use mixbridge_transport::{
    Diagnostics, FeedbackAccumulator,
    capture::{CAPTURE_SCRATCH_BYTES, decode_capture_transfer},
    constants::{CAPTURE_PRELOAD, FEEDBACK_PRELOAD, PLAYBACK_PACKET_BYTES, PLAYBACK_PACKETS, PLAYBACK_PRELOAD},
    playback::{PLAYBACK_MAX_TRANSFER_BYTES, PLAYBACK_SCRATCH_BYTES, encode_playback_transfer},
};
use rusb::ffi;

use crate::{
    constants::{CAPTURE_ENDPOINT, CAPTURE_TRANSFER_BYTES, FEEDBACK_ENDPOINT, FEEDBACK_ISO_PACKET_BYTES, FEEDBACK_ISO_PACKETS, FEEDBACK_TRANSFER_BYTES, OUTPUT_ENDPOINT},
    error::{Result, UsbError},
};

/// libusb.h `enum libusb_transfer_type` values this module drives.
const LIBUSB_TRANSFER_TYPE_ISOCHRONOUS: u8 = 1;
const LIBUSB_TRANSFER_TYPE_BULK: u8 = 2;

/// libusb.h `enum libusb_transfer_status` values this module checks for.
const LIBUSB_TRANSFER_COMPLETED: i32 = 0;
const LIBUSB_TRANSFER_CANCELLED: i32 = 3;

/// No per-transfer timeout: a stuck transfer is reclaimed by the
/// orchestrator's drain window, not a libusb timeout, matching
/// `run_audio()`'s own transfers (all submitted with `timeout = 0`).
const TRANSFER_TIMEOUT_MS: c_uint = 0;

/// Nominal (non-feedback-adjusted) playback transfer length.
const PLAYBACK_NOMINAL_BYTES: usize = PLAYBACK_PACKETS * PLAYBACK_PACKET_BYTES;

/// State reached by every completion callback through its transfer's
/// `user_data` pointer. `libusb_handle_events` invokes callbacks
/// synchronously, one at a time, on the thread that calls it, so plain
/// `&mut` access here needs no additional synchronization as long as
/// only one thread ever pumps events for this context.
struct PumpContext {
    ib_producer: RingProducer,
    rb_consumer: RingConsumer,
    feedback: Arc<FeedbackAccumulator>,
    diagnostics: Arc<Diagnostics>,
    done: Arc<AtomicBool>,
    capture_scratch: Vec<u8>,
    playback_scratch: Vec<u8>,
}

/// Owns the three transfer pools and the boxed [`PumpContext`] every
/// callback reaches through. `submit` arms all of them; `cancel_all`
/// requests their teardown, and dropping frees them unconditionally
/// once the caller's drain window has elapsed.
pub struct TransferPools {
    capture: Vec<*mut ffi::libusb_transfer>,
    feedback: Vec<*mut ffi::libusb_transfer>,
    playback: Vec<*mut ffi::libusb_transfer>,
    _capture_buffers: Vec<Box<[u8]>>,
    _feedback_buffers: Vec<Box<[u8]>>,
    _playback_buffers: Vec<Box<[u8]>>,
    context: *mut PumpContext,
}

// SAFETY: after `submit` returns, every raw pointer owned here is only
// ever dereferenced from completion callbacks invoked on the single
// thread pumping `libusb_handle_events`, or from `cancel_all`/`Drop`
// which the orchestrator calls only after that thread has stopped or
// is about to join. Nothing aliases across threads concurrently.
unsafe impl Send for TransferPools {}

impl TransferPools {
    /// Builds the shared pump context and submits [`CAPTURE_PRELOAD`]
    /// capture, [`FEEDBACK_PRELOAD`] feedback, and [`PLAYBACK_PRELOAD`]
    /// playback transfers against `dev_handle`.
    pub fn submit(
        dev_handle: *mut ffi::libusb_device_handle,
        ib_producer: RingProducer,
        rb_consumer: RingConsumer,
        feedback: Arc<FeedbackAccumulator>,
        diagnostics: Arc<Diagnostics>,
        done: Arc<AtomicBool>,
    ) -> Result<Self> {
        let context = Box::into_raw(Box::new(PumpContext {
            ib_producer,
            rb_consumer,
            feedback,
            diagnostics,
            done,
            capture_scratch: vec![0u8; CAPTURE_SCRATCH_BYTES],
            playback_scratch: vec![0u8; PLAYBACK_SCRATCH_BYTES],
        }));

        let mut pools = Self {
            capture: Vec::with_capacity(CAPTURE_PRELOAD),
            feedback: Vec::with_capacity(FEEDBACK_PRELOAD),
            playback: Vec::with_capacity(PLAYBACK_PRELOAD),
            _capture_buffers: Vec::with_capacity(CAPTURE_PRELOAD),
            _feedback_buffers: Vec::with_capacity(FEEDBACK_PRELOAD),
            _playback_buffers: Vec::with_capacity(PLAYBACK_PRELOAD),
            context,
        };

        for _ in 0..CAPTURE_PRELOAD {
            if let Err(err) = pools.arm_capture(dev_handle) {
                // SAFETY: nothing has been submitted to a second thread
                // yet, so tearing down what's armed so far is safe here.
                unsafe { drop(Box::from_raw(pools.context)) };
                return Err(err);
            }
        }
        for _ in 0..FEEDBACK_PRELOAD {
            if let Err(err) = pools.arm_feedback(dev_handle) {
                unsafe { drop(Box::from_raw(pools.context)) };
                return Err(err);
            }
        }
        for _ in 0..PLAYBACK_PRELOAD {
            if let Err(err) = pools.arm_playback(dev_handle) {
                unsafe { drop(Box::from_raw(pools.context)) };
                return Err(err);
            }
        }

        Ok(pools)
    }

    fn arm_capture(&mut self, dev_handle: *mut ffi::libusb_device_handle) -> Result<()> {
        let mut buffer = vec![0u8; CAPTURE_TRANSFER_BYTES].into_boxed_slice();
        let transfer = alloc_transfer(0)?;
        unsafe {
            fill_transfer(
                transfer,
                dev_handle,
                CAPTURE_ENDPOINT,
                LIBUSB_TRANSFER_TYPE_BULK,
                &mut buffer,
                CAPTURE_TRANSFER_BYTES as c_int,
                0,
                capture_completed,
                self.context as *mut c_void,
            );
            submit_transfer(transfer)?;
        }
        self.capture.push(transfer);
        self._capture_buffers.push(buffer);
        Ok(())
    }

    fn arm_feedback(&mut self, dev_handle: *mut ffi::libusb_device_handle) -> Result<()> {
        let mut buffer = vec![0u8; FEEDBACK_TRANSFER_BYTES].into_boxed_slice();
        let transfer = alloc_transfer(FEEDBACK_ISO_PACKETS as c_int)?;
        unsafe {
            fill_transfer(
                transfer,
                dev_handle,
                FEEDBACK_ENDPOINT,
                LIBUSB_TRANSFER_TYPE_ISOCHRONOUS,
                &mut buffer,
                FEEDBACK_TRANSFER_BYTES as c_int,
                FEEDBACK_ISO_PACKETS as c_int,
                feedback_completed,
                self.context as *mut c_void,
            );
            set_iso_packet_lengths(transfer, FEEDBACK_ISO_PACKETS, FEEDBACK_ISO_PACKET_BYTES as c_uint);
            submit_transfer(transfer)?;
        }
        self.feedback.push(transfer);
        self._feedback_buffers.push(buffer);
        Ok(())
    }

    fn arm_playback(&mut self, dev_handle: *mut ffi::libusb_device_handle) -> Result<()> {
        let mut buffer = vec![0u8; PLAYBACK_MAX_TRANSFER_BYTES].into_boxed_slice();
        let transfer = alloc_transfer(PLAYBACK_PACKETS as c_int)?;
        unsafe {
            fill_transfer(
                transfer,
                dev_handle,
                OUTPUT_ENDPOINT,
                LIBUSB_TRANSFER_TYPE_ISOCHRONOUS,
                &mut buffer,
                PLAYBACK_NOMINAL_BYTES as c_int,
                PLAYBACK_PACKETS as c_int,
                playback_completed,
                self.context as *mut c_void,
            );
            // Primed silent: the first transfer goes out before any
            // playback encode has run, same as `cb_out()`'s own initial
            // buffer contents (zeroed on allocation).
            set_iso_packet_lengths(transfer, PLAYBACK_PACKETS, PLAYBACK_PACKET_BYTES as c_uint);
            submit_transfer(transfer)?;
        }
        self.playback.push(transfer);
        self._playback_buffers.push(buffer);
        Ok(())
    }

    /// Requests cancellation of every outstanding transfer. Best-effort:
    /// return codes are not checked, matching `run_audio()`'s own
    /// shutdown loop. The caller still has to keep pumping events for a
    /// while afterward for the cancellations to actually land.
    pub fn cancel_all(&self) {
        for &transfer in self.capture.iter().chain(&self.feedback).chain(&self.playback) {
            unsafe {
                ffi::libusb_cancel_transfer(transfer);
            }
        }
    }
}

impl Drop for TransferPools {
    fn drop(&mut self) {
        // Freed unconditionally, not gated on every callback having
        // confirmed cancellation — the same risk `run_audio()` accepts
        // at shutdown.
        for &transfer in self.capture.iter().chain(&self.feedback).chain(&self.playback) {
            unsafe {
                ffi::libusb_free_transfer(transfer);
            }
        }
        unsafe {
            drop(Box::from_raw(self.context));
        }
    }
}

fn alloc_transfer(iso_packets: c_int) -> Result<*mut ffi::libusb_transfer> {
    let transfer = unsafe { ffi::libusb_alloc_transfer(iso_packets) };
    if transfer.is_null() {
        // libusb.h: `libusb_alloc_transfer` returns NULL only on ENOMEM.
        return Err(UsbError::LibusbCode(-11));
    }
    Ok(transfer)
}

fn submit_transfer(transfer: *mut ffi::libusb_transfer) -> Result<()> {
    let rc = unsafe { ffi::libusb_submit_transfer(transfer) };
    if rc != 0 {
        return Err(UsbError::LibusbCode(rc as i32));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
unsafe fn fill_transfer(
    transfer: *mut ffi::libusb_transfer,
    dev_handle: *mut ffi::libusb_device_handle,
    endpoint: u8,
    transfer_type: u8,
    buffer: &mut [u8],
    length: c_int,
    num_iso_packets: c_int,
    callback: extern "system" fn(*mut ffi::libusb_transfer),
    user_data: *mut c_void,
) {
    unsafe {
        (*transfer).dev_handle = dev_handle;
        (*transfer).flags = 0;
        (*transfer).endpoint = endpoint;
        (*transfer).transfer_type = transfer_type;
        (*transfer).timeout = TRANSFER_TIMEOUT_MS;
        (*transfer).buffer = buffer.as_mut_ptr();
        (*transfer).length = length;
        (*transfer).num_iso_packets = num_iso_packets;
        (*transfer).callback = callback;
        (*transfer).user_data = user_data;
    }
}

unsafe fn set_iso_packet_lengths(transfer: *mut ffi::libusb_transfer, num_packets: usize, length: c_uint) {
    unsafe {
        let descs = slice::from_raw_parts_mut((*transfer).iso_packet_desc.as_mut_ptr(), num_packets);
        for desc in descs {
            desc.length = length;
        }
    }
}

/// Resubmits `transfer` unless shutdown was requested or it was just
/// cancelled. On a resubmit failure, requests shutdown rather than
/// leaving a dead transfer silently out of the pool.
unsafe fn rearm(transfer: *mut ffi::libusb_transfer, ctx: &PumpContext, cancelled: bool) {
    if cancelled || ctx.done.load(Ordering::Relaxed) {
        return;
    }
    let rc = unsafe { ffi::libusb_submit_transfer(transfer) };
    if rc != 0 {
        tracing::warn!(rc, "failed to resubmit transfer, requesting shutdown");
        ctx.done.store(true, Ordering::Relaxed);
    }
}

extern "system" fn capture_completed(transfer: *mut ffi::libusb_transfer) {
    unsafe {
        let ctx = &mut *((*transfer).user_data as *mut PumpContext);
        let status = (*transfer).status as i32;
        let cancelled = status == LIBUSB_TRANSFER_CANCELLED;

        if status == LIBUSB_TRANSFER_COMPLETED {
            let actual = (*transfer).actual_length as usize;
            if actual == CAPTURE_TRANSFER_BYTES {
                let data = slice::from_raw_parts((*transfer).buffer, actual);
                if let Err(err) = decode_capture_transfer(data, &mut ctx.capture_scratch, &mut ctx.ib_producer) {
                    tracing::error!(%err, "fatal capture ring write, shutting down");
                    ctx.done.store(true, Ordering::Relaxed);
                }
            } else {
                ctx.diagnostics.capture_overruns.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(actual, expected = CAPTURE_TRANSFER_BYTES, "short capture transfer, discarding");
            }
        } else if !cancelled {
            tracing::warn!(status, "capture transfer completion status not COMPLETED");
        }

        rearm(transfer, ctx, cancelled);
    }
}

extern "system" fn feedback_completed(transfer: *mut ffi::libusb_transfer) {
    unsafe {
        let ctx = &mut *((*transfer).user_data as *mut PumpContext);
        let status = (*transfer).status as i32;
        let cancelled = status == LIBUSB_TRANSFER_CANCELLED;

        // `fb_in()` in the original resubmits the transfer before
        // touching its buffer at all. Preserved here verbatim even
        // though process-then-submit would read more naturally.
        rearm(transfer, ctx, cancelled);

        if status == LIBUSB_TRANSFER_COMPLETED {
            let actual = (*transfer).actual_length as usize;
            if actual == FEEDBACK_TRANSFER_BYTES {
                let data = slice::from_raw_parts((*transfer).buffer, actual);
                let packet: [u8; FEEDBACK_TRANSFER_BYTES] = data.try_into().unwrap();
                ctx.feedback.accumulate(packet);
            } else {
                tracing::warn!(actual, "short feedback transfer, discarding");
            }
        } else if !cancelled {
            tracing::warn!(status, "feedback transfer completion status not COMPLETED");
        }
    }
}

extern "system" fn playback_completed(transfer: *mut ffi::libusb_transfer) {
    unsafe {
        let ctx = &mut *((*transfer).user_data as *mut PumpContext);
        let status = (*transfer).status as i32;
        let cancelled = status == LIBUSB_TRANSFER_CANCELLED;

        if !cancelled {
            let buffer = slice::from_raw_parts_mut((*transfer).buffer, PLAYBACK_MAX_TRANSFER_BYTES);
            let shape = encode_playback_transfer(buffer, &mut ctx.playback_scratch, &mut ctx.rb_consumer, &ctx.feedback);
            if shape.underrun {
                ctx.diagnostics.playback_underruns.fetch_add(1, Ordering::Relaxed);
            }
            (*transfer).length = shape.transfer_len as c_int;
            let packets = slice::from_raw_parts_mut((*transfer).iso_packet_desc.as_mut_ptr(), PLAYBACK_PACKETS);
            packets[PLAYBACK_PACKETS - 1].length = shape.last_packet_len as c_uint;
        }

        rearm(transfer, ctx, cancelled);
    }
}
