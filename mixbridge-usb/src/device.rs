//! Device bring-up (spec §4.G): enumerate, claim, and configure the
//! target mixer for 96 kHz streaming.

use std::time::Duration;

use rusb::{Context, DeviceHandle, UsbContext};

use crate::{
    constants::{
        CAPTURE_ENDPOINT, CONFIG_RESET_DELAY_MS, CTL_REPEAT, FEEDBACK_ENDPOINT, INPUT_ALT_SETTING, INPUT_INTERFACE, OUTPUT_ALT_SETTING, OUTPUT_ENDPOINT,
        OUTPUT_INTERFACE, PRODUCT_ID, VENDOR_CONTROLS, VENDOR_ID,
    },
    error::{Result, UsbError},
};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

/// A claimed, configured handle to the target mixer, ready for
/// streaming to begin.
pub struct Device {
    pub handle: DeviceHandle<Context>,
    /// Kept alongside `handle` so the transport orchestrator can drive
    /// `handle_events` for the async transfer pools without needing a
    /// second `libusb_context`.
    pub context: Context,
}

/// Runs the fixed bring-up sequence against the first enumerated
/// device matching the target vendor/product ID.
///
/// `raise_usb_log` mirrors the CLI's `-vv` flag (spec §6): when set,
/// the underlying USB library's own log level is raised in addition to
/// this crate's `tracing` output.
pub fn open(raise_usb_log: bool) -> Result<Device> {
    let mut context = Context::new()?;
    if raise_usb_log {
        context.set_log_level(rusb::LogLevel::Debug);
    }
    let handle = find_and_open(&context)?;
    bring_up(handle, context)
}

fn find_and_open(context: &Context) -> Result<DeviceHandle<Context>> {
    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(err) => {
                tracing::debug!(%err, "failed to read device descriptor, skipping");
                continue;
            }
        };

        tracing::debug!(vendor = descriptor.vendor_id(), product = descriptor.product_id(), "enumerated USB device");

        if descriptor.vendor_id() == VENDOR_ID && descriptor.product_id() == PRODUCT_ID {
            return Ok(device.open()?);
        }
    }

    tracing::error!("no target device found");
    Err(UsbError::DeviceNotFound)
}

fn bring_up(mut handle: DeviceHandle<Context>, context: Context) -> Result<Device> {
    tracing::info!("USB set_configuration 0");
    handle.set_active_configuration(0)?;
    std::thread::sleep(Duration::from_millis(CONFIG_RESET_DELAY_MS));

    tracing::info!("USB set_configuration 1");
    handle.set_active_configuration(1)?;

    tracing::info!("USB set_auto_detach_kernel_driver");
    handle.set_auto_detach_kernel_driver(true)?;

    tracing::info!(interface = INPUT_INTERFACE, "USB claim_interface(in)");
    handle.claim_interface(INPUT_INTERFACE)?;

    tracing::info!(interface = OUTPUT_INTERFACE, "USB claim_interface(out)");
    handle.claim_interface(OUTPUT_INTERFACE)?;

    tracing::info!("USB alt_setting(in)");
    handle.set_alternate_setting(INPUT_INTERFACE, INPUT_ALT_SETTING)?;

    tracing::info!("USB alt_setting(out)");
    handle.set_alternate_setting(OUTPUT_INTERFACE, OUTPUT_ALT_SETTING)?;

    log_max_packet_sizes(&handle);

    send_vendor_controls(&handle)?;

    tracing::info!("interfaces open, ready to stream");
    Ok(Device { handle, context })
}

/// Logs the configured max packet size for each streaming endpoint, a
/// sanity check the original driver runs before issuing vendor
/// controls.
fn log_max_packet_sizes(handle: &DeviceHandle<Context>) {
    let device = handle.device();
    let config = match device.active_config_descriptor() {
        Ok(config) => config,
        Err(err) => {
            tracing::debug!(%err, "could not read active config descriptor, skipping packet size log");
            return;
        }
    };

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            for endpoint in descriptor.endpoint_descriptors() {
                let address = endpoint.address();
                if address == OUTPUT_ENDPOINT || address == FEEDBACK_ENDPOINT || address == CAPTURE_ENDPOINT {
                    tracing::debug!(endpoint = format!("{address:#04x}"), max_packet_size = endpoint.max_packet_size(), "endpoint descriptor");
                }
            }
        }
    }
}

fn send_vendor_controls(handle: &DeviceHandle<Context>) -> Result<()> {
    for (index, control) in VENDOR_CONTROLS.iter().enumerate() {
        // Controls 1 and 2 are issued CTL_REPEAT times; control 3 once.
        // Yes, this really does resend the same bytes repeatedly —
        // no comment in the source explains why. Preserved verbatim.
        let repeats = if index < 2 { CTL_REPEAT } else { 1 };
        for _ in 0..repeats {
            handle.write_control(control.bm_request_type, control.b_request, control.w_value, control.w_index, control.data, CONTROL_TIMEOUT)?;
        }
    }
    Ok(())
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::info!(interface = OUTPUT_INTERFACE, "USB release_interface(out)");
        let _ = self.handle.release_interface(OUTPUT_INTERFACE);
        tracing::info!(interface = INPUT_INTERFACE, "USB release_interface(in)");
        let _ = self.handle.release_interface(INPUT_INTERFACE);
    }
}
