//! Host period engine (spec §4.E).
//!
//! Runs once per host audio cycle on the realtime thread: drains the
//! input ring into the ten capture output ports with an adaptive
//! ±1-frame trim, and gathers the two playback input ports into the
//! output ring with the same trim applied in reverse. Allocates
//! nothing; every scratch buffer is sized up-front for the maximum
//! period length and reused every cycle.

use std::sync::{Arc, atomic::Ordering};

use mixbridge_core::{RingConsumer, RingProducer, flush_denormal_f32};
use mixbridge_transport::{
    Diagnostics,
    constants::{AVGSCALE, CAPTURE_CHANNELS, DEADBAND, IB_FRAME_BYTES, IB_TARGET, MAX_PERIOD_FRAMES, PLAYBACK_CHANNELS, RB_FRAME_BYTES, RB_TARGET, SAMPLE_SIZE},
};

use crate::{
    clock::FrameClock,
    error::{HostError, Result},
};

const CAPTURE_SCRATCH_BYTES: usize = (MAX_PERIOD_FRAMES + 1) * IB_FRAME_BYTES;
const PLAYBACK_SCRATCH_BYTES: usize = (MAX_PERIOD_FRAMES + 1) * RB_FRAME_BYTES;

/// Owns the realtime-safe state of the host period engine: ring
/// handles, occupancy EWMAs, and preallocated scratch buffers.
pub struct HostEngine {
    ib_consumer: RingConsumer,
    rb_producer: RingProducer,
    ib_avg: f64,
    rb_avg: f64,
    capture_scratch: Vec<u8>,
    playback_scratch: Vec<u8>,
    diagnostics: Arc<Diagnostics>,
}

impl HostEngine {
    pub fn new(ib_consumer: RingConsumer, rb_producer: RingProducer, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            ib_consumer,
            rb_producer,
            ib_avg: 0.0,
            rb_avg: 0.0,
            capture_scratch: vec![0u8; CAPTURE_SCRATCH_BYTES],
            playback_scratch: vec![0u8; PLAYBACK_SCRATCH_BYTES],
            diagnostics,
        }
    }

    /// Runs one host cycle. `output_ports` must have exactly
    /// [`CAPTURE_CHANNELS`] slices and `input_ports` exactly
    /// [`PLAYBACK_CHANNELS`], each `nframes` long.
    pub fn process(&mut self, nframes: u32, output_ports: &mut [&mut [f32]], input_ports: &[&[f32]], clock: &dyn FrameClock) -> Result<()> {
        if nframes as usize > MAX_PERIOD_FRAMES {
            tracing::warn!(nframes, max = MAX_PERIOD_FRAMES, "oversized host period, dropping cycle");
            return Ok(());
        }
        debug_assert_eq!(output_ports.len(), CAPTURE_CHANNELS);
        debug_assert_eq!(input_ports.len(), PLAYBACK_CHANNELS);

        self.process_capture(nframes, output_ports, clock);
        self.process_playback(nframes, input_ports, clock)
    }

    fn process_capture(&mut self, nframes: u32, output_ports: &mut [&mut [f32]], clock: &dyn FrameClock) {
        let nframes = nframes as usize;
        let nb = self.ib_consumer.read_space();
        let nr = nframes * IB_FRAME_BYTES;

        if nb < nr {
            tracing::warn!(nb, nr, "IB underrun, emitting nothing this cycle");
            self.ib_avg = nb as f64;
            return;
        }

        let elapsed_bytes = clock.frames_since_cycle_start() as i64 * IB_FRAME_BYTES as i64;
        let sample = nb as i64 - nr as i64 - elapsed_bytes;
        self.ib_avg += (sample as f64 - self.ib_avg) / AVGSCALE as f64;

        let low = (IB_TARGET - DEADBAND) as f64 * IB_FRAME_BYTES as f64;
        let high = (IB_TARGET + DEADBAND) as f64 * IB_FRAME_BYTES as f64;
        let sd: i64 = if self.ib_avg < low {
            -1
        } else if self.ib_avg > high {
            1
        } else {
            0
        };

        let want = ((nr as i64 + sd * IB_FRAME_BYTES as i64) as usize).min(nb);
        let read = self.ib_consumer.read(&mut self.capture_scratch[..want]);
        debug_assert_eq!(read, want);

        if sd == 1 {
            self.diagnostics.ib_drops.fetch_add(1, Ordering::Relaxed);
        } else if sd == -1 {
            self.diagnostics.ib_adds.fetch_add(1, Ordering::Relaxed);
        }

        // Duplicate the last ten-channel frame forward to cover any
        // shortfall, whether from the sd = -1 choice or the `nb` clamp.
        let mut filled = want;
        while filled < nr {
            self.capture_scratch.copy_within(filled - IB_FRAME_BYTES..filled, filled..filled + IB_FRAME_BYTES);
            filled += IB_FRAME_BYTES;
        }

        for frame in 0..nframes {
            let base = frame * IB_FRAME_BYTES;
            for (ch, port) in output_ports.iter_mut().enumerate() {
                let off = base + ch * SAMPLE_SIZE;
                let bytes: [u8; SAMPLE_SIZE] = self.capture_scratch[off..off + SAMPLE_SIZE].try_into().unwrap();
                port[frame] = flush_denormal_f32(f32::from_ne_bytes(bytes));
            }
        }
    }

    fn process_playback(&mut self, nframes: u32, input_ports: &[&[f32]], clock: &dyn FrameClock) -> Result<()> {
        let nframes = nframes as usize;
        let nr = nframes * RB_FRAME_BYTES;

        for frame in 0..nframes {
            let base = frame * RB_FRAME_BYTES;
            let left = flush_denormal_f32(input_ports[0][frame]);
            let right = flush_denormal_f32(input_ports[1][frame]);
            self.playback_scratch[base..base + SAMPLE_SIZE].copy_from_slice(&left.to_ne_bytes());
            self.playback_scratch[base + SAMPLE_SIZE..base + 2 * SAMPLE_SIZE].copy_from_slice(&right.to_ne_bytes());
        }

        let occupancy = self.rb_producer.occupied();
        if self.rb_producer.write_space() < nr + RB_FRAME_BYTES {
            tracing::warn!(occupancy, nr, "RB overrun, discarding this cycle's input");
            self.rb_avg = occupancy as f64;
            return Ok(());
        }

        let elapsed_bytes = clock.frames_since_cycle_start() as i64 * RB_FRAME_BYTES as i64;
        let sample = occupancy as i64 + elapsed_bytes;
        self.rb_avg += (sample as f64 - self.rb_avg) / AVGSCALE as f64;

        let low = (RB_TARGET - DEADBAND) as f64 * RB_FRAME_BYTES as f64;
        let high = (RB_TARGET + DEADBAND) as f64 * RB_FRAME_BYTES as f64;

        let write_len = if self.rb_avg < low {
            self.playback_scratch.copy_within(nr - RB_FRAME_BYTES..nr, nr..nr + RB_FRAME_BYTES);
            self.diagnostics.rb_adds.fetch_add(1, Ordering::Relaxed);
            nr + RB_FRAME_BYTES
        } else if self.rb_avg > high {
            self.diagnostics.rb_drops.fetch_add(1, Ordering::Relaxed);
            nr - RB_FRAME_BYTES
        } else {
            nr
        };

        let written = self.rb_producer.write(&self.playback_scratch[..write_len]);
        if written != write_len {
            return Err(HostError::FatalRingWrite);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mixbridge_core::ByteRing;
    use mixbridge_transport::constants::{IB_FRAME_LENGTH, RB_FRAME_LENGTH};

    use super::*;
    use crate::clock::FixedFrameClock;

    fn new_engine() -> (HostEngine, mixbridge_core::RingProducer, mixbridge_core::RingConsumer) {
        let (ib_producer, ib_consumer) = ByteRing::new(IB_FRAME_LENGTH * IB_FRAME_BYTES);
        let (rb_producer, rb_consumer) = ByteRing::new(RB_FRAME_LENGTH * RB_FRAME_BYTES);
        let engine = HostEngine::new(ib_consumer, rb_producer, Arc::new(Diagnostics::new()));
        (engine, ib_producer, rb_consumer)
    }

    fn fill_ib_frames(producer: &mut mixbridge_core::RingProducer, frames: usize, value: f32) {
        let mut bytes = Vec::with_capacity(frames * IB_FRAME_BYTES);
        for _ in 0..frames {
            for _ in 0..CAPTURE_CHANNELS {
                bytes.extend_from_slice(&value.to_ne_bytes());
            }
        }
        assert_eq!(producer.write(&bytes), bytes.len());
    }

    #[test]
    fn test_oversized_period_is_refused() {
        let (mut engine, _ib, _rb) = new_engine();
        let mut out_storage = vec![vec![0f32; 1025]; CAPTURE_CHANNELS];
        let mut out_refs: Vec<&mut [f32]> = out_storage.iter_mut().map(|v| v.as_mut_slice()).collect();
        let in_storage = vec![vec![0f32; 1025]; PLAYBACK_CHANNELS];
        let in_refs: Vec<&[f32]> = in_storage.iter().map(|v| v.as_slice()).collect();

        let result = engine.process(1025, &mut out_refs, &in_refs, &FixedFrameClock(0));
        assert!(result.is_ok());
    }

    #[test]
    fn test_underrun_leaves_ib_avg_at_available_bytes() {
        let (mut engine, _ib, _rb) = new_engine();
        let mut out_storage = vec![vec![0f32; 64]; CAPTURE_CHANNELS];
        let mut out_refs: Vec<&mut [f32]> = out_storage.iter_mut().map(|v| v.as_mut_slice()).collect();
        let in_storage = vec![vec![0f32; 64]; PLAYBACK_CHANNELS];
        let in_refs: Vec<&[f32]> = in_storage.iter().map(|v| v.as_slice()).collect();

        engine.process(64, &mut out_refs, &in_refs, &FixedFrameClock(0)).unwrap();
        assert_eq!(engine.ib_avg, 0.0);
    }

    #[test]
    fn test_nominal_cycle_deinterleaves_capture_samples() {
        let (mut engine, mut ib_producer, _rb) = new_engine();
        fill_ib_frames(&mut ib_producer, 128, 0.5);

        let mut out_storage = vec![vec![0f32; 64]; CAPTURE_CHANNELS];
        let mut out_refs: Vec<&mut [f32]> = out_storage.iter_mut().map(|v| v.as_mut_slice()).collect();
        let in_storage = vec![vec![0f32; 64]; PLAYBACK_CHANNELS];
        let in_refs: Vec<&[f32]> = in_storage.iter().map(|v| v.as_slice()).collect();

        engine.process(64, &mut out_refs, &in_refs, &FixedFrameClock(0)).unwrap();

        for port in &out_storage {
            assert!(port.iter().all(|&s| s == 0.5));
        }
    }

    #[test]
    fn test_playback_direction_writes_interleaved_rb_bytes() {
        let (mut engine, _ib, mut rb_consumer) = new_engine();
        let mut out_storage = vec![vec![0f32; 32]; CAPTURE_CHANNELS];
        let mut out_refs: Vec<&mut [f32]> = out_storage.iter_mut().map(|v| v.as_mut_slice()).collect();
        let in_storage = vec![vec![0.25f32; 32], vec![-0.25f32; 32]];
        let in_refs: Vec<&[f32]> = in_storage.iter().map(|v| v.as_slice()).collect();

        engine.process(32, &mut out_refs, &in_refs, &FixedFrameClock(0)).unwrap();

        let mut out = [0u8; SAMPLE_SIZE * 2];
        assert_eq!(rb_consumer.read(&mut out), out.len());
        let left = f32::from_ne_bytes(out[0..4].try_into().unwrap());
        let right = f32::from_ne_bytes(out[4..8].try_into().unwrap());
        assert_eq!(left, 0.25);
        assert_eq!(right, -0.25);
    }
}
