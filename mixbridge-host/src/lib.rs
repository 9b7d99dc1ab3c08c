//! # mixbridge-host
//!
//! The host-daemon-facing half of the bridge: the realtime period
//! engine that trims ring occupancy by ±1 frame per cycle, and the
//! JACK client glue that registers ports and wires the engine into the
//! process callback.

pub mod clock;
pub mod engine;
pub mod error;
pub mod service;

pub use clock::{FixedFrameClock, FrameClock, JackFrameClock};
pub use engine::HostEngine;
pub use error::{HostError, Result};
pub use service::ShutdownFlag;
