//! # mixbridge-usb
//!
//! Device bring-up and transport orchestration: enumerates and
//! configures the target mixer, then pumps capture, playback, and
//! feedback transfers against the ring buffers owned by
//! `mixbridge-host` and `mixbridge-transport`.

pub mod constants;
pub mod device;
pub mod error;
pub mod orchestrator;
mod transfer;

pub use device::{Device, open};
pub use error::{Result, UsbError};
pub use orchestrator::{OrchestratorState, TransportOrchestrator};
