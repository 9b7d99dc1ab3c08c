//! Feedback accumulator (spec §4.D).
//!
//! A leaky integrator fed by the device's ISO feedback endpoint and
//! drained by the playback encoder. The accumulator is the sole point
//! of coordination between the USB device clock and the playback
//! stream's frame count; it lives behind a relaxed atomic so the two
//! sides never need to synchronize directly.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::constants::{FEEDBACK_SENSITIVITY, FEEDBACK_SETPOINT};

/// Accumulates device feedback and exposes the damped ±1 frame
/// adjustment consumed by the playback encoder.
#[derive(Debug, Default)]
pub struct FeedbackAccumulator {
    out_delta: AtomicI64,
}

impl FeedbackAccumulator {
    pub fn new() -> Self {
        Self {
            out_delta: AtomicI64::new(0),
        }
    }

    /// Folds in one feedback IN transfer's six bytes (two little-endian
    /// 24-bit-ish values the original driver treats as raw byte sums).
    ///
    /// Called from the feedback completion path (component D's producer
    /// side).
    pub fn accumulate(&self, bytes: [u8; 6]) {
        let sum: i64 = bytes.iter().map(|&b| b as i64).sum();
        let delta = sum - FEEDBACK_SETPOINT;
        self.out_delta.fetch_add(delta, Ordering::Relaxed);
    }

    /// Consumes the accumulator, returning a damped adjustment in
    /// `{-1, 0, +1}` frames. When the adjustment is nonzero the
    /// accumulator resets to zero so each correction is applied once.
    ///
    /// Called once per playback transfer (component C).
    pub fn take_frame_adjustment(&self) -> i32 {
        let value = self.out_delta.load(Ordering::Relaxed);
        let damped = value / FEEDBACK_SENSITIVITY;
        let sd = damped.signum() as i32;
        if sd != 0 {
            self.out_delta.store(0, Ordering::Relaxed);
        }
        sd
    }

    /// Current raw accumulator value, for the ~1Hz diagnostic line.
    pub fn snapshot(&self) -> i64 {
        self.out_delta.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bytes_push_negative_by_setpoint() {
        let acc = FeedbackAccumulator::new();
        acc.accumulate([0; 6]);
        assert_eq!(acc.snapshot(), -FEEDBACK_SETPOINT);
    }

    #[test]
    fn test_exact_setpoint_leaves_accumulator_at_zero() {
        let acc = FeedbackAccumulator::new();
        // six bytes summing to exactly 576
        acc.accumulate([96, 96, 96, 96, 96, 96]);
        assert_eq!(acc.snapshot(), 0);
        assert_eq!(acc.take_frame_adjustment(), 0);
    }

    #[test]
    fn test_adjustment_is_zero_below_sensitivity_threshold() {
        let acc = FeedbackAccumulator::new();
        acc.accumulate([97, 96, 96, 96, 96, 96]); // delta = +1, damped 1/3 = 0
        assert_eq!(acc.take_frame_adjustment(), 0);
        assert_eq!(acc.snapshot(), 1, "accumulator is not reset when the adjustment stays zero");
    }

    #[test]
    fn test_positive_adjustment_resets_accumulator() {
        let acc = FeedbackAccumulator::new();
        acc.accumulate([100, 100, 96, 96, 96, 96]); // delta = +8, damped 8/3 = 2
        assert_eq!(acc.take_frame_adjustment(), 1);
        assert_eq!(acc.snapshot(), 0);
    }

    #[test]
    fn test_negative_adjustment_resets_accumulator() {
        let acc = FeedbackAccumulator::new();
        acc.accumulate([0, 0, 96, 96, 96, 96]); // delta = -192, damped -64
        assert_eq!(acc.take_frame_adjustment(), -1);
        assert_eq!(acc.snapshot(), 0);
    }

    #[test]
    fn test_accumulates_across_multiple_transfers() {
        let acc = FeedbackAccumulator::new();
        acc.accumulate([97, 96, 96, 96, 96, 96]); // +1, damped 0, no reset
        acc.accumulate([97, 96, 96, 96, 96, 96]); // +1 again -> total +2, damped 0
        assert_eq!(acc.snapshot(), 2);
        acc.accumulate([100, 96, 96, 96, 96, 96]); // +4 -> total +6, damped 2 -> sd=1
        assert_eq!(acc.take_frame_adjustment(), 1);
        assert_eq!(acc.snapshot(), 0);
    }
}
