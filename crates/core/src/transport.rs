//! HID transport abstraction for device communication.
//!
//! Provides a trait-based transport layer so that the real hidapi session and
//! the mock device share the same interface. The transport owns at most one
//! open handle at a time; switching between shared and exclusive access is
//! an explicit close followed by a reopen.

use crate::error::Result;
use crate::framing::ReportType;
use serde::{Deserialize, Serialize};

/// A HID device found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Platform path used to reopen the device.
    pub path: String,
    pub usage_page: u16,
    pub usage: u16,
    pub interface_number: i32,
    pub product: Option<String>,
}

impl DeviceDescriptor {
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

/// How the device handle is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Other processes may hold the device too.
    Shared,
    /// Seize the device; no other process may claim it meanwhile.
    Exclusive,
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Transport-native status returned by a report submission.
///
/// [`StatusCode::SUCCESS`] is the only value meaning the report was accepted.
/// Every other value is a distinct failure cause; the negotiator records it
/// without interpreting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i64);

impl StatusCode {
    pub const SUCCESS: Self = Self(0);
    /// Failure with no more specific code available.
    pub const GENERIC_FAILURE: Self = Self(-1);
    /// The transport cannot carry this report type at all.
    pub const UNSUPPORTED: Self = Self(-2);
    /// Fewer bytes were written than submitted.
    pub const INCOMPLETE: Self = Self(-3);
    /// No device handle is open.
    pub const NOT_OPEN: Self = Self(-4);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

/// Outcome of a single `send_report` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub status: StatusCode,
    /// Transport error text, if any.
    pub detail: Option<String>,
}

impl Submission {
    pub fn success() -> Self {
        Self {
            status: StatusCode::SUCCESS,
            detail: None,
        }
    }

    pub fn failed(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }
}

/// Abstraction over device enumeration and raw report submission.
pub trait HidTransport {
    /// List every HID device visible to the transport.
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>>;

    /// Open `device` in `mode`. The transport must be closed beforehand.
    fn open(&mut self, device: &DeviceDescriptor, mode: OpenMode) -> Result<()>;

    /// Release the current handle. Closing an already closed transport is a no-op.
    fn close(&mut self);

    /// Submit one report synchronously.
    ///
    /// `data` excludes the report ID; the transport places it however the
    /// platform requires.
    fn send_report(&mut self, report_type: ReportType, report_id: u8, data: &[u8]) -> Submission;
}

/// A mock HID transport for testing.
///
/// Records every call and answers with scripted statuses.
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;

    /// A report as the mock received it.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentReport {
        pub report_type: ReportType,
        pub report_id: u8,
        pub data: Vec<u8>,
        pub mode: OpenMode,
    }

    /// Lifecycle calls, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Enumerate,
        Open(OpenMode),
        Close,
        Send,
    }

    /// Mock transport that returns preconfigured statuses.
    pub struct MockTransport {
        pub devices: Vec<DeviceDescriptor>,
        pub enumerate_error: Option<String>,
        /// Modes for which `open` fails.
        pub refuse: Vec<OpenMode>,
        /// Statuses returned in order; once empty, `default_status` is used.
        pub scripted: VecDeque<StatusCode>,
        pub default_status: StatusCode,
        pub sent: Vec<SentReport>,
        pub calls: Vec<Call>,
        current: Option<OpenMode>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                devices: vec![descriptor(crate::REALTEK_VID, crate::pids::PL81_PRO)],
                enumerate_error: None,
                refuse: Vec::new(),
                scripted: VecDeque::new(),
                default_status: StatusCode::SUCCESS,
                sent: Vec::new(),
                calls: Vec::new(),
                current: None,
            }
        }

        /// A device that rejects every report with `status`.
        pub fn stalling(status: StatusCode) -> Self {
            let mut mock = Self::new();
            mock.default_status = status;
            mock
        }

        pub fn is_open(&self) -> bool {
            self.current.is_some()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Descriptor for a fake device on interface 0.
    pub fn descriptor(vendor_id: u16, product_id: u16) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id,
            product_id,
            path: format!("mock:{vendor_id:04x}:{product_id:04x}"),
            usage_page: 0xFF00,
            usage: 0x0001,
            interface_number: 0,
            product: Some("Mock HID".to_string()),
        }
    }

    impl HidTransport for MockTransport {
        fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
            self.calls.push(Call::Enumerate);
            match &self.enumerate_error {
                Some(msg) => Err(Error::Enumeration(msg.clone())),
                None => Ok(self.devices.clone()),
            }
        }

        fn open(&mut self, device: &DeviceDescriptor, mode: OpenMode) -> Result<()> {
            self.calls.push(Call::Open(mode));
            if self.current.is_some() {
                return Err(Error::Open {
                    mode,
                    reason: format!("mock: {} is already open", device.path),
                });
            }
            if self.refuse.contains(&mode) {
                return Err(Error::Open {
                    mode,
                    reason: "mock: access refused".to_string(),
                });
            }
            self.current = Some(mode);
            Ok(())
        }

        fn close(&mut self) {
            self.calls.push(Call::Close);
            self.current = None;
        }

        fn send_report(
            &mut self,
            report_type: ReportType,
            report_id: u8,
            data: &[u8],
        ) -> Submission {
            self.calls.push(Call::Send);
            let Some(mode) = self.current else {
                return Submission::failed(StatusCode::NOT_OPEN, "mock: device not open");
            };
            self.sent.push(SentReport {
                report_type,
                report_id,
                data: data.to_vec(),
                mode,
            });
            let status = self.scripted.pop_front().unwrap_or(self.default_status);
            if status.is_success() {
                Submission::success()
            } else {
                Submission::failed(status, format!("mock: status {status}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{Call, MockTransport};
    use super::*;

    #[test]
    fn status_success_sentinel() {
        assert!(StatusCode::SUCCESS.is_success());
        assert!(!StatusCode(0xE000_5000).is_success());
        assert!(!StatusCode::GENERIC_FAILURE.is_success());
    }

    #[test]
    fn status_display() {
        assert_eq!(StatusCode(0xE000_5000).to_string(), "0xE0005000");
        assert_eq!(StatusCode::UNSUPPORTED.to_string(), "-2");
    }

    #[test]
    fn descriptor_matching() {
        let d = mock::descriptor(0x0BDA, 0x1100);
        assert!(d.matches(0x0BDA, 0x1100));
        assert!(!d.matches(0x0BDA, 0x1101));
    }

    #[test]
    fn mock_requires_open_before_send() {
        let mut mock = MockTransport::new();
        let sub = mock.send_report(ReportType::Output, 0, &[0x00]);
        assert_eq!(sub.status, StatusCode::NOT_OPEN);
        assert!(mock.sent.is_empty());
    }

    #[test]
    fn mock_close_is_idempotent() {
        let mut mock = MockTransport::new();
        let dev = mock.devices[0].clone();
        mock.open(&dev, OpenMode::Shared).unwrap();
        mock.close();
        mock.close();
        assert!(!mock.is_open());
        assert_eq!(
            mock.calls,
            vec![Call::Open(OpenMode::Shared), Call::Close, Call::Close]
        );
    }

    #[test]
    fn mock_rejects_double_open() {
        let mut mock = MockTransport::new();
        let dev = mock.devices[0].clone();
        mock.open(&dev, OpenMode::Shared).unwrap();
        assert!(mock.open(&dev, OpenMode::Exclusive).is_err());
    }
}
