//! Abstraction over the host daemon's notion of "how far into this
//! cycle are we right now", used by the period engine's EWMA sample
//! (spec §4.E, §9 Open Questions).
//!
//! The production implementation asks the JACK client directly;
//! [`FixedFrameClock`] stands in for tests that need a deterministic
//! value without a running JACK server.

/// Supplies the number of frames elapsed since the start of the
/// current host processing cycle.
pub trait FrameClock {
    fn frames_since_cycle_start(&self) -> u32;
}

/// A [`FrameClock`] backed by a live `jack::Client`.
pub struct JackFrameClock<'a> {
    client: &'a jack::Client,
}

impl<'a> JackFrameClock<'a> {
    pub fn new(client: &'a jack::Client) -> Self {
        Self { client }
    }
}

impl FrameClock for JackFrameClock<'_> {
    fn frames_since_cycle_start(&self) -> u32 {
        self.client.frames_since_cycle_start()
    }
}

/// A [`FrameClock`] that always reports a fixed value, for unit tests.
pub struct FixedFrameClock(pub u32);

impl FrameClock for FixedFrameClock {
    fn frames_since_cycle_start(&self) -> u32 {
        self.0
    }
}
