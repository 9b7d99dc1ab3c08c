//! Playback encoder (spec §4.C).
//!
//! Shapes one ISO OUT transfer's worth of 24-bit little-endian stereo
//! samples from the output ring buffer, applying the feedback
//! accumulator's ±1 frame correction to the transfer's packet sizing.

use mixbridge_core::{RingConsumer, encode_24bit_le};

use crate::{
    constants::{PLAYBACK_BASE_FRAMES, PLAYBACK_CHANNELS, PLAYBACK_PACKET_BYTES, PLAYBACK_PACKETS, RB_FRAME_BYTES, SAMPLE_SIZE},
    feedback::FeedbackAccumulator,
};

/// Bytes of scratch space the playback encoder needs to hold one
/// transfer's worth of `f32` samples read back out of the ring buffer.
pub const PLAYBACK_SCRATCH_BYTES: usize = (PLAYBACK_BASE_FRAMES + 1) * PLAYBACK_CHANNELS * SAMPLE_SIZE;

/// Maximum transfer length in bytes (40 packets at the largest
/// feedback-adjusted packet size).
pub const PLAYBACK_MAX_TRANSFER_BYTES: usize = PLAYBACK_PACKETS * (PLAYBACK_PACKET_BYTES + 6);

/// Result of shaping one playback transfer.
pub struct PlaybackShape {
    /// Total valid bytes written into the caller's transfer buffer.
    pub transfer_len: usize,
    /// Length of the transfer's final ISO packet, in bytes.
    pub last_packet_len: usize,
    /// `true` if the output ring buffer underran and `buffer` was
    /// filled with silence instead of decoded audio.
    pub underrun: bool,
}

/// Encodes one playback transfer into `buffer`.
///
/// `buffer` must be at least [`PLAYBACK_MAX_TRANSFER_BYTES`] long.
/// `scratch` must be at least [`PLAYBACK_SCRATCH_BYTES`] long. Neither
/// buffer is read past the returned `transfer_len`.
pub fn encode_playback_transfer(
    buffer: &mut [u8],
    scratch: &mut [u8],
    consumer: &mut RingConsumer,
    feedback: &FeedbackAccumulator,
) -> PlaybackShape {
    assert!(buffer.len() >= PLAYBACK_MAX_TRANSFER_BYTES, "playback transfer buffer too small");
    assert!(scratch.len() >= PLAYBACK_SCRATCH_BYTES, "playback scratch buffer too small");

    let sd = feedback.take_frame_adjustment();
    let frame_count = (PLAYBACK_BASE_FRAMES as i32 + sd) as usize;
    let transfer_len = ((PLAYBACK_PACKETS * PLAYBACK_PACKET_BYTES) as i32 + 6 * sd) as usize;
    let last_packet_len = (PLAYBACK_PACKET_BYTES as i32 + 6 * sd) as usize;

    let required_rb_bytes = frame_count * RB_FRAME_BYTES;

    if consumer.read_space() < required_rb_bytes {
        tracing::warn!(
            required = required_rb_bytes,
            available = consumer.read_space(),
            "OUT underrun: emitting silence for this transfer"
        );
        buffer[..transfer_len].fill(0);
        return PlaybackShape {
            transfer_len,
            last_packet_len,
            underrun: true,
        };
    }

    let read = consumer.read(&mut scratch[..required_rb_bytes]);
    debug_assert_eq!(read, required_rb_bytes);

    let mut out_pos = 0usize;
    for chunk in scratch[..required_rb_bytes].chunks_exact(SAMPLE_SIZE) {
        let sample = f32::from_ne_bytes(chunk.try_into().unwrap());
        let encoded = encode_24bit_le(sample);
        buffer[out_pos..out_pos + 3].copy_from_slice(&encoded);
        out_pos += 3;
    }
    debug_assert_eq!(out_pos, transfer_len);

    PlaybackShape {
        transfer_len,
        last_packet_len,
        underrun: false,
    }
}

#[cfg(test)]
mod tests {
    use mixbridge_core::ByteRing;

    use super::*;
    use crate::constants::RB_FRAME_LENGTH;

    fn fill_ring_with_frames(producer: &mut mixbridge_core::RingProducer, frames: usize, value: f32) {
        let mut bytes = Vec::with_capacity(frames * RB_FRAME_BYTES);
        for _ in 0..frames {
            bytes.extend_from_slice(&value.to_ne_bytes());
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        assert_eq!(producer.write(&bytes), bytes.len());
    }

    #[test]
    fn test_nominal_transfer_has_no_sd_adjustment() {
        let (mut producer, mut consumer) = ByteRing::new(RB_FRAME_LENGTH * RB_FRAME_BYTES);
        fill_ring_with_frames(&mut producer, PLAYBACK_BASE_FRAMES, 0.0);
        let feedback = FeedbackAccumulator::new();

        let mut buffer = vec![0u8; PLAYBACK_MAX_TRANSFER_BYTES];
        let mut scratch = vec![0u8; PLAYBACK_SCRATCH_BYTES];
        let shape = encode_playback_transfer(&mut buffer, &mut scratch, &mut consumer, &feedback);

        assert_eq!(shape.transfer_len, PLAYBACK_PACKETS * PLAYBACK_PACKET_BYTES);
        assert_eq!(shape.last_packet_len, PLAYBACK_PACKET_BYTES);
        assert!(!shape.underrun);
        assert_eq!(consumer.read_space(), 0);
    }

    #[test]
    fn test_underrun_fills_silence_and_leaves_ring_untouched() {
        let (mut producer, mut consumer) = ByteRing::new(RB_FRAME_LENGTH * RB_FRAME_BYTES);
        fill_ring_with_frames(&mut producer, 10, 1.0); // far fewer than 480 frames
        let feedback = FeedbackAccumulator::new();

        let mut buffer = vec![0xFFu8; PLAYBACK_MAX_TRANSFER_BYTES];
        let mut scratch = vec![0u8; PLAYBACK_SCRATCH_BYTES];
        let shape = encode_playback_transfer(&mut buffer, &mut scratch, &mut consumer, &feedback);

        assert!(shape.underrun);
        assert!(buffer[..shape.transfer_len].iter().all(|&b| b == 0));
        assert_eq!(consumer.read_space(), 10 * RB_FRAME_BYTES, "underrun must not drain the ring");
    }

    #[test]
    fn test_positive_sd_grows_transfer_by_one_frame() {
        let (mut producer, mut consumer) = ByteRing::new(RB_FRAME_LENGTH * RB_FRAME_BYTES);
        fill_ring_with_frames(&mut producer, PLAYBACK_BASE_FRAMES + 1, 0.0);
        let feedback = FeedbackAccumulator::new();
        feedback.accumulate([100, 100, 96, 96, 96, 96]); // forces sd = +1

        let mut buffer = vec![0u8; PLAYBACK_MAX_TRANSFER_BYTES];
        let mut scratch = vec![0u8; PLAYBACK_SCRATCH_BYTES];
        let shape = encode_playback_transfer(&mut buffer, &mut scratch, &mut consumer, &feedback);

        assert_eq!(shape.transfer_len, PLAYBACK_PACKETS * PLAYBACK_PACKET_BYTES + 6);
        assert_eq!(shape.last_packet_len, PLAYBACK_PACKET_BYTES + 6);
    }

    #[test]
    fn test_full_scale_sample_encodes_without_overflow() {
        let (mut producer, mut consumer) = ByteRing::new(RB_FRAME_LENGTH * RB_FRAME_BYTES);
        fill_ring_with_frames(&mut producer, PLAYBACK_BASE_FRAMES, 1.0);
        let feedback = FeedbackAccumulator::new();

        let mut buffer = vec![0u8; PLAYBACK_MAX_TRANSFER_BYTES];
        let mut scratch = vec![0u8; PLAYBACK_SCRATCH_BYTES];
        let shape = encode_playback_transfer(&mut buffer, &mut scratch, &mut consumer, &feedback);

        assert_eq!(&buffer[0..3], &encode_24bit_le(1.0));
        assert!(!shape.underrun);
    }
}
