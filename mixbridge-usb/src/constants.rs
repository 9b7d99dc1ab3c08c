//! USB target identity and the opaque vendor control sequence (spec §6).

/// Target device vendor ID.
pub const VENDOR_ID: u16 = 0x13B2;
/// Target device product ID.
pub const PRODUCT_ID: u16 = 0x0030;

/// Output (playback) interface number.
pub const OUTPUT_INTERFACE: u8 = 0;
/// Output interface alternate setting.
pub const OUTPUT_ALT_SETTING: u8 = 1;
/// Playback ISO OUT endpoint address.
pub const OUTPUT_ENDPOINT: u8 = 0x02;

/// Input (capture/feedback) interface number.
pub const INPUT_INTERFACE: u8 = 1;
/// Input interface alternate setting.
pub const INPUT_ALT_SETTING: u8 = 1;
/// Feedback ISO IN endpoint address.
pub const FEEDBACK_ENDPOINT: u8 = 0x81;
/// Capture BULK IN endpoint address.
pub const CAPTURE_ENDPOINT: u8 = 0x86;

/// One row of the vendor control sequence table (spec §6).
pub struct VendorControl {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub data: &'static [u8],
}

/// Controls 1 and 2, issued [`CTL_REPEAT`] times each; control 3 issued once.
/// Byte patterns are opaque magic required to enable 96 kHz streaming.
pub const VENDOR_CONTROLS: [VendorControl; 3] = [
    VendorControl {
        bm_request_type: 0x22,
        b_request: 0x01,
        w_value: 0x0100,
        w_index: 0x0086,
        data: &[0x00, 0x77, 0x01],
    },
    VendorControl {
        bm_request_type: 0x22,
        b_request: 0x01,
        w_value: 0x0100,
        w_index: 0x0002,
        data: &[0x00, 0x77, 0x01],
    },
    VendorControl {
        bm_request_type: 0x40,
        b_request: 0x49,
        w_value: 0x0030,
        w_index: 0x0000,
        data: &[],
    },
];

/// Number of times controls 1 and 2 are each issued.
pub const CTL_REPEAT: usize = 1;

/// Time allowed to elapse between `set_configuration(0)` and
/// `set_configuration(1)` during bring-up.
pub const CONFIG_RESET_DELAY_MS: u64 = 10;

/// Bytes per BULK IN capture transfer (2048 frames × 32-byte rows × 2 rows/frame).
pub const CAPTURE_TRANSFER_BYTES: usize = 2048 * 2 * 32;

/// ISO packets per feedback IN transfer.
pub const FEEDBACK_ISO_PACKETS: usize = 2;
/// Bytes per feedback ISO packet.
pub const FEEDBACK_ISO_PACKET_BYTES: usize = 3;
/// Total bytes per feedback ISO IN transfer (2 packets × 3 bytes).
pub const FEEDBACK_TRANSFER_BYTES: usize = FEEDBACK_ISO_PACKETS * FEEDBACK_ISO_PACKET_BYTES;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_controls_table_shape() {
        assert_eq!(VENDOR_CONTROLS[0].data, &[0x00, 0x77, 0x01]);
        assert_eq!(VENDOR_CONTROLS[1].data, &[0x00, 0x77, 0x01]);
        assert!(VENDOR_CONTROLS[2].data.is_empty());
        assert_eq!(VENDOR_CONTROLS[2].b_request, 0x49);
    }

    #[test]
    fn test_capture_transfer_matches_transport_row_layout() {
        assert_eq!(CAPTURE_TRANSFER_BYTES, mixbridge_transport::constants::ROWS_PER_TRANSFER * mixbridge_transport::constants::ROW_BYTES);
    }

    #[test]
    fn test_target_identity() {
        assert_eq!(VENDOR_ID, 0x13B2);
        assert_eq!(PRODUCT_ID, 0x0030);
    }

    #[test]
    fn test_feedback_transfer_is_two_three_byte_packets() {
        assert_eq!(FEEDBACK_TRANSFER_BYTES, 6);
    }

    #[test]
    fn test_config_reset_delay_matches_original_driver() {
        assert_eq!(CONFIG_RESET_DELAY_MS, 10);
    }
}
