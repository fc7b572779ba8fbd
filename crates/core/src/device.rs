//! Device discovery and the hidapi-backed transport.

use std::ffi::CString;

use hidapi::{HidApi, HidDevice, HidError};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::framing::ReportType;
use crate::transport::{DeviceDescriptor, HidTransport, OpenMode, StatusCode, Submission};

/// First usage page reserved for vendor-defined collections.
const VENDOR_USAGE_PAGE: u16 = 0xFF00;

/// Enumerate and keep the devices matching `vendor_id:product_id`.
pub fn discover_devices(
    transport: &mut dyn HidTransport,
    vendor_id: u16,
    product_id: u16,
) -> Result<Vec<DeviceDescriptor>> {
    debug!("Starting HID device enumeration");
    let devices: Vec<DeviceDescriptor> = transport
        .enumerate_devices()?
        .into_iter()
        .filter(|d| d.matches(vendor_id, product_id))
        .collect();

    for d in &devices {
        info!(
            vid = format_args!("0x{:04X}", d.vendor_id),
            pid = format_args!("0x{:04X}", d.product_id),
            usage_page = format_args!("0x{:04X}", d.usage_page),
            interface = d.interface_number,
            path = %d.path,
            "Found HID bridge"
        );
    }
    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}

/// Pick the device to probe.
///
/// The bridge exposes more than one HID collection; a vendor-defined usage
/// page is preferred, otherwise the first match wins.
pub fn locate_target(
    transport: &mut dyn HidTransport,
    vendor_id: u16,
    product_id: u16,
) -> Result<DeviceDescriptor> {
    let devices = discover_devices(transport, vendor_id, product_id)?;
    let preferred = devices
        .iter()
        .position(|d| d.usage_page >= VENDOR_USAGE_PAGE)
        .unwrap_or(0);
    devices.into_iter().nth(preferred).ok_or_else(|| {
        Error::DeviceNotFound(format!(
            "no HID device with VID=0x{vendor_id:04X} PID=0x{product_id:04X}"
        ))
    })
}

/// [`HidTransport`] over the system HID stack via hidapi.
///
/// On macOS the access mode is passed to IOKit on every open, so a shared
/// handle really is shared and a seize really seizes. hidraw and the Windows
/// HID stack have no exclusive mode, and an exclusive open fails.
pub struct HidapiTransport {
    api: HidApi,
    device: Option<HidDevice>,
}

impl HidapiTransport {
    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(|e| Error::Hid(format!("hidapi init: {e}")))?;
        Ok(Self { api, device: None })
    }
}

impl HidTransport for HidapiTransport {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        self.api
            .refresh_devices()
            .map_err(|e| Error::Enumeration(e.to_string()))?;

        Ok(self
            .api
            .device_list()
            .map(|info| DeviceDescriptor {
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                path: info.path().to_string_lossy().into_owned(),
                usage_page: info.usage_page(),
                usage: info.usage(),
                interface_number: info.interface_number(),
                product: info.product_string().map(str::to_string),
            })
            .collect())
    }

    fn open(&mut self, device: &DeviceDescriptor, mode: OpenMode) -> Result<()> {
        if self.device.is_some() {
            return Err(Error::Open {
                mode,
                reason: "a handle is already open".to_string(),
            });
        }
        if seizes(mode) && !cfg!(target_os = "macos") {
            return Err(Error::Open {
                mode,
                reason: "exclusive access is not supported by the HID stack on this platform"
                    .to_string(),
            });
        }

        let path = CString::new(device.path.as_str()).map_err(|e| Error::Open {
            mode,
            reason: format!("invalid device path: {e}"),
        })?;
        // hidapi defaults to exclusive opens on macOS.
        #[cfg(target_os = "macos")]
        self.api.set_open_exclusive(seizes(mode));

        let handle = self.api.open_path(&path).map_err(|e| Error::Open {
            mode,
            reason: e.to_string(),
        })?;

        debug!(path = %device.path, %mode, "Device opened");
        self.device = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("Device closed");
        }
    }

    fn send_report(&mut self, report_type: ReportType, report_id: u8, data: &[u8]) -> Submission {
        let Some(device) = &self.device else {
            return Submission::failed(StatusCode::NOT_OPEN, "device not open");
        };

        // hidapi expects the report ID as the first byte; ID 0 is stripped
        // for devices without numbered reports.
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(report_id);
        buf.extend_from_slice(data);

        match report_type {
            ReportType::Output => match device.write(&buf) {
                Ok(n) if n < data.len() => Submission::failed(
                    StatusCode::INCOMPLETE,
                    format!("wrote {n} of {} bytes", data.len()),
                ),
                Ok(_) => Submission::success(),
                Err(e) => failed_submission(e),
            },
            ReportType::Feature => match device.send_feature_report(&buf) {
                Ok(()) => Submission::success(),
                Err(e) => failed_submission(e),
            },
            ReportType::Input => Submission::failed(
                StatusCode::UNSUPPORTED,
                "hidapi cannot write input reports",
            ),
        }
    }
}

/// Whether an open in `mode` must keep other clients off the device.
fn seizes(mode: OpenMode) -> bool {
    mode == OpenMode::Exclusive
}

/// Map a hidapi error to a status, keeping the OS error code when there is one.
fn failed_submission(e: HidError) -> Submission {
    let status = match &e {
        HidError::IoError { error } => error
            .raw_os_error()
            .map_or(StatusCode::GENERIC_FAILURE, |code| StatusCode(i64::from(code))),
        HidError::IncompleteSendError { .. } => StatusCode::INCOMPLETE,
        _ => StatusCode::GENERIC_FAILURE,
    };
    Submission::failed(status, e.to_string())
}
