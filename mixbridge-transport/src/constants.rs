//! Device- and protocol-specific constants (spec §3, §6).
//!
//! Mirrors the `#define`s at the top of the original driver
//! (`alesis_jackd_plugin.c`) as named, documented constants.

/// Number of ten-channel frames the input ring buffer can hold.
pub const IB_FRAME_LENGTH: usize = 8192;
/// Target occupancy of the input ring buffer, in frames.
pub const IB_TARGET: usize = 1536;
/// Number of stereo frames the output ring buffer can hold.
pub const RB_FRAME_LENGTH: usize = 3072;
/// Target occupancy of the output ring buffer, in frames.
pub const RB_TARGET: usize = 768;
/// Deadband, in frames, around each ring's target occupancy before a
/// ±1 frame adaptive correction is applied.
pub const DEADBAND: usize = 48;
/// Divisor for the EWMA occupancy update: `avg += (sample - avg) / AVGSCALE`.
pub const AVGSCALE: i64 = 300;

/// Number of channels in a capture frame (8 inputs + stereo mix bus).
pub const CAPTURE_CHANNELS: usize = 10;
/// Number of channels in a playback frame (stereo monitor return).
pub const PLAYBACK_CHANNELS: usize = 2;
/// Bytes per sample in the host's `f32` domain.
pub const SAMPLE_SIZE: usize = 4;
/// Bytes per capture frame (10 channels × 4 bytes).
pub const IB_FRAME_BYTES: usize = CAPTURE_CHANNELS * SAMPLE_SIZE;
/// Bytes per playback frame (2 channels × 4 bytes).
pub const RB_FRAME_BYTES: usize = PLAYBACK_CHANNELS * SAMPLE_SIZE;

/// Bytes per capture wire row (24 payload + 8 padding).
pub const ROW_BYTES: usize = 32;
/// Valid payload bytes per capture wire row.
pub const ROW_PAYLOAD_BYTES: usize = 24;
/// Channels carried by a single capture row (half of a ten-channel frame).
pub const ROW_CHANNELS: usize = 5;
/// Rows per capture BULK IN transfer (2048 frames × 2 rows/frame).
pub const ROWS_PER_TRANSFER: usize = 4096;
/// Frames per capture BULK IN transfer.
pub const CAPTURE_FRAMES_PER_TRANSFER: usize = 2048;

/// Nominal stereo frames per playback ISO OUT transfer before feedback
/// adjustment (40 packets × 12 stereo samples/packet).
pub const PLAYBACK_BASE_FRAMES: usize = 480;
/// ISO OUT packets per playback transfer.
pub const PLAYBACK_PACKETS: usize = 40;
/// Baseline bytes per playback ISO OUT packet.
pub const PLAYBACK_PACKET_BYTES: usize = 72;
/// Bytes per playback stereo sample on the wire (2 channels × 3 bytes).
pub const PLAYBACK_WIRE_FRAME_BYTES: usize = PLAYBACK_CHANNELS * 3;

/// Feedback setpoint subtracted from the summed feedback bytes.
///
/// Empirically tuned in the original driver; no descriptor or comment
/// justifies the value `576`. Preserved verbatim per spec §9 Open
/// Questions.
pub const FEEDBACK_SETPOINT: i64 = 576;
/// Divisor damping the feedback accumulator's sensitivity before it
/// is reduced to `{-1, 0, +1}`.
///
/// Also empirically tuned and preserved verbatim.
pub const FEEDBACK_SENSITIVITY: i64 = 3;

/// Maximum `nframes` the host period engine accepts per cycle.
pub const MAX_PERIOD_FRAMES: usize = 1024;

/// Outstanding BULK IN capture transfers kept in flight (absorbs BULK jitter).
pub const CAPTURE_PRELOAD: usize = 7;
/// Outstanding ISO feedback transfers kept in flight.
pub const FEEDBACK_PRELOAD: usize = 7;
/// Outstanding ISO OUT playback transfers kept in flight.
///
/// Deliberately short relative to [`CAPTURE_PRELOAD`] to minimize OUT latency.
pub const PLAYBACK_PRELOAD: usize = 3;

/// Capture-path latency advertised on the output ports, in frames.
pub const CAPTURE_LATENCY_FRAMES: usize = CAPTURE_FRAMES_PER_TRANSFER + IB_TARGET;
/// Playback-path latency advertised on the input ports, in frames.
pub const PLAYBACK_LATENCY_FRAMES: usize = PLAYBACK_BASE_FRAMES * PLAYBACK_PRELOAD + RB_TARGET;

/// Output port names, in wire bit-interleave order (spec §6).
pub const CAPTURE_PORT_NAMES: [&str; CAPTURE_CHANNELS] = ["ch1", "ch3", "ch5", "ch7", "mixL", "ch2", "ch4", "ch6", "ch8", "mixR"];
/// Input port names (stereo monitor return).
pub const PLAYBACK_PORT_NAMES: [&str; PLAYBACK_CHANNELS] = ["2trackL", "2trackR"];
