//! Shared diagnostic counters (spec §4.F, §9).
//!
//! Replaces the original driver's file-scope globals (`ibdrop`,
//! `ibadd`, `rbdrop`, `rbadd`) with atomics any producer can bump and
//! the orchestrator's ~1Hz status line can read without locking.
//!
//! Counters here are tracked in whole-frame units (one increment per
//! corrective event), not the original's per-sample/per-channel
//! scaling, which existed only to line up with a display-time divisor.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Input ring frames dropped (read ahead of schedule) to relieve backpressure.
    pub ib_drops: AtomicU64,
    /// Input ring frames duplicated to cover a shortfall.
    pub ib_adds: AtomicU64,
    /// Output ring frames dropped (trimmed) to relieve backpressure.
    pub rb_drops: AtomicU64,
    /// Output ring frames duplicated to cover a shortfall.
    pub rb_adds: AtomicU64,
    /// Capture transfers that overran the input ring's free space.
    pub capture_overruns: AtomicU64,
    /// Playback transfers that underran the output ring.
    pub playback_underruns: AtomicU64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            ib_drops: self.ib_drops.load(Ordering::Relaxed),
            ib_adds: self.ib_adds.load(Ordering::Relaxed),
            rb_drops: self.rb_drops.load(Ordering::Relaxed),
            rb_adds: self.rb_adds.load(Ordering::Relaxed),
            capture_overruns: self.capture_overruns.load(Ordering::Relaxed),
            playback_underruns: self.playback_underruns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Diagnostics`], suitable for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsSnapshot {
    pub ib_drops: u64,
    pub ib_adds: u64,
    pub rb_drops: u64,
    pub rb_adds: u64,
    pub capture_overruns: u64,
    pub playback_underruns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let diag = Diagnostics::new();
        diag.ib_drops.fetch_add(3, Ordering::Relaxed);
        diag.rb_adds.fetch_add(1, Ordering::Relaxed);
        let snap = diag.snapshot();
        assert_eq!(snap.ib_drops, 3);
        assert_eq!(snap.rb_adds, 1);
        assert_eq!(snap.ib_adds, 0);
    }
}
