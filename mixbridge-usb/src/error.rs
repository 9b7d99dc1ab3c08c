use std::fmt;

/// Errors surfaced by device bring-up and transport orchestration.
#[derive(Debug)]
pub enum UsbError {
    /// No device matching the target vendor/product ID was enumerated.
    DeviceNotFound,
    /// A libusb call failed during bring-up or streaming.
    Rusb(rusb::Error),
    /// A raw libusb async transfer call (`libusb_alloc_transfer`,
    /// `libusb_submit_transfer`) failed. These return a bare negative
    /// `libusb_error` code rather than an `rusb::Error`, since that
    /// conversion isn't exposed outside the `rusb` crate itself.
    LibusbCode(i32),
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::DeviceNotFound => write!(f, "no target device found"),
            UsbError::Rusb(err) => write!(f, "usb error: {err}"),
            UsbError::LibusbCode(code) => write!(f, "libusb async transfer call failed with code {code}"),
        }
    }
}

impl std::error::Error for UsbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UsbError::DeviceNotFound => None,
            UsbError::Rusb(err) => Some(err),
            UsbError::LibusbCode(_) => None,
        }
    }
}

impl From<rusb::Error> for UsbError {
    fn from(err: rusb::Error) -> Self {
        UsbError::Rusb(err)
    }
}

pub type Result<T> = std::result::Result<T, UsbError>;
