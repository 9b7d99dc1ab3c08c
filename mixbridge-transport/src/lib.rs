//! # mixbridge-transport
//!
//! The rate-matched codecs that sit between the USB device clock and
//! the host audio clock: the capture bit-demux decoder, the playback
//! 24-bit encoder, the feedback accumulator that links them, and the
//! constants and diagnostics shared across both directions.

pub mod capture;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod feedback;
pub mod playback;

pub use capture::decode_capture_transfer;
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::{Result, TransportError};
pub use feedback::FeedbackAccumulator;
pub use playback::{PlaybackShape, encode_playback_transfer};
