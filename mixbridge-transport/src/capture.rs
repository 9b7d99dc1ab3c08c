//! Bit-demultiplexing capture decoder (spec §4.B).
//!
//! Converts one fixed-shape BULK IN transfer (4096 rows of 32 bytes,
//! 24 payload + 8 padding) into interleaved ten-channel `f32` frames
//! and streams them into the input ring buffer.

use mixbridge_core::{RingProducer, decode_24bit};

use crate::{
    constants::{IB_FRAME_BYTES, ROW_BYTES, ROW_CHANNELS, ROW_PAYLOAD_BYTES, ROWS_PER_TRANSFER, SAMPLE_SIZE},
    error::{Result, TransportError},
};

/// Bytes of scratch space the capture decoder needs: one `f32` per
/// channel-sample across the maximum number of rows a transfer holds.
pub const CAPTURE_SCRATCH_BYTES: usize = ROWS_PER_TRANSFER * ROW_CHANNELS * SAMPLE_SIZE;

/// Decodes one BULK IN transfer into `producer`, returning the number
/// of ten-channel frames written.
///
/// `scratch` must be at least [`CAPTURE_SCRATCH_BYTES`] long; it is
/// provided by the caller so this function never allocates.
///
/// # Panics
///
/// Panics if `transfer` is not exactly `ROWS_PER_TRANSFER * ROW_BYTES`
/// bytes, or if `scratch` is shorter than [`CAPTURE_SCRATCH_BYTES`].
pub fn decode_capture_transfer(transfer: &[u8], scratch: &mut [u8], producer: &mut RingProducer) -> Result<usize> {
    assert_eq!(transfer.len(), ROWS_PER_TRANSFER * ROW_BYTES, "capture transfer has the wrong shape");
    assert!(scratch.len() >= CAPTURE_SCRATCH_BYTES, "capture scratch buffer too small");

    // How many complete frames fit? Round down to an even row count so
    // we never write half a frame (spec §4.B step 1).
    let frames_that_fit = producer.write_space() / IB_FRAME_BYTES;
    let mut rows = frames_that_fit * 2;

    if rows < ROWS_PER_TRANSFER {
        tracing::warn!(rows, capacity_rows = ROWS_PER_TRANSFER, "capture overrun: dropping the remainder of this transfer");
    }
    rows = rows.min(ROWS_PER_TRANSFER);

    let mut pos = 0usize;
    for row in 0..rows {
        let base = row * ROW_BYTES;
        let payload = &transfer[base..base + ROW_PAYLOAD_BYTES];

        // Accumulate five 24-bit channel samples, MSB-first across the
        // 24 payload bytes: bit `ch` of each byte belongs to channel `ch`.
        let mut samples = [0i32; ROW_CHANNELS];
        for &byte in payload {
            for (ch, acc) in samples.iter_mut().enumerate() {
                let bit = (byte >> ch) & 0x01;
                *acc = (*acc << 1) | bit as i32;
            }
        }

        for &raw in &samples {
            let value = decode_24bit(raw);
            scratch[pos..pos + SAMPLE_SIZE].copy_from_slice(&value.to_ne_bytes());
            pos += SAMPLE_SIZE;
        }
    }

    let written = producer.write(&scratch[..pos]);
    if written != pos {
        // Should be unreachable: `rows` was derived from `write_space()`
        // moments ago and nothing else produces into this ring.
        return Err(TransportError::ShortRingWrite);
    }

    Ok(rows / 2)
}

#[cfg(test)]
mod tests {
    use mixbridge_core::ByteRing;

    use super::*;
    use crate::constants::{CAPTURE_CHANNELS, IB_FRAME_LENGTH};

    fn make_transfer_with_pattern() -> Vec<u8> {
        // Every row: payload bytes all zero except bit 0 set on byte 0,
        // giving channel 0 a value of 1 (all other channels stay at 0).
        let mut buf = vec![0u8; ROWS_PER_TRANSFER * ROW_BYTES];
        for row in 0..ROWS_PER_TRANSFER {
            let base = row * ROW_BYTES;
            buf[base] = 0x01; // bit 0 -> channel 0's first accumulated bit
        }
        buf
    }

    #[test]
    fn test_decodes_all_rows_when_space_available() {
        let (mut producer, mut consumer) = ByteRing::new(IB_FRAME_LENGTH * CAPTURE_CHANNELS * SAMPLE_SIZE);
        let transfer = make_transfer_with_pattern();
        let mut scratch = vec![0u8; CAPTURE_SCRATCH_BYTES];

        let frames = decode_capture_transfer(&transfer, &mut scratch, &mut producer).unwrap();
        assert_eq!(frames, ROWS_PER_TRANSFER / 2);

        let mut out = vec![0u8; frames * IB_FRAME_BYTES];
        assert_eq!(consumer.read(&mut out), out.len());
    }

    #[test]
    fn test_sample_count_matches_invariant() {
        // spec §8 property 4: 4096 rows * 5 channels = 20480 channel-samples
        let (mut producer, _consumer) = ByteRing::new(IB_FRAME_LENGTH * CAPTURE_CHANNELS * SAMPLE_SIZE);
        let transfer = make_transfer_with_pattern();
        let mut scratch = vec![0u8; CAPTURE_SCRATCH_BYTES];

        decode_capture_transfer(&transfer, &mut scratch, &mut producer).unwrap();
        assert_eq!(producer.occupied() / SAMPLE_SIZE, ROWS_PER_TRANSFER * ROW_CHANNELS);
    }

    #[test]
    fn test_overrun_truncates_to_available_space() {
        // Only room for 10 frames (20 rows) worth of bytes.
        let (mut producer, mut consumer) = ByteRing::new(10 * IB_FRAME_BYTES);
        let transfer = make_transfer_with_pattern();
        let mut scratch = vec![0u8; CAPTURE_SCRATCH_BYTES];

        let frames = decode_capture_transfer(&transfer, &mut scratch, &mut producer).unwrap();
        assert!(frames <= 10);
        assert!(consumer.read_space() <= 10 * IB_FRAME_BYTES);
    }

    #[test]
    fn test_decoded_value_for_known_bit_pattern() {
        // All bits zero except channel 0's MSB (first bit of the 24-bit
        // accumulation) set on every payload byte -> channel 0 becomes
        // 0xFFFFFF (24 bits of 1s), a negative full-scale 24-bit value.
        let mut buf = vec![0u8; ROW_BYTES];
        for b in buf.iter_mut().take(ROW_PAYLOAD_BYTES) {
            *b = 0x01;
        }
        let mut full_transfer = vec![0u8; ROWS_PER_TRANSFER * ROW_BYTES];
        full_transfer[..ROW_BYTES].copy_from_slice(&buf);

        let (mut producer, mut consumer) = ByteRing::new(IB_FRAME_LENGTH * CAPTURE_CHANNELS * SAMPLE_SIZE);
        let mut scratch = vec![0u8; CAPTURE_SCRATCH_BYTES];
        decode_capture_transfer(&full_transfer, &mut scratch, &mut producer).unwrap();

        let mut out = [0u8; SAMPLE_SIZE];
        assert_eq!(consumer.read(&mut out), SAMPLE_SIZE);
        let value = f32::from_ne_bytes(out);
        assert_eq!(value, decode_24bit(0x00FF_FFFF));
        assert!(value < 0.0, "all-ones 24-bit pattern should decode as negative");
    }
}
