//! Error types for neewer-hid-core.

use crate::transport::OpenMode;
use thiserror::Error;

/// Core library error type.
///
/// Only run-aborting conditions live here. A report the device refuses is
/// not an error: it is recorded as a rejected attempt in the run result.
#[derive(Debug, Error)]
pub enum Error {
    /// The HID subsystem could not be queried for a device list.
    #[error("HID enumeration failed: {0}")]
    Enumeration(String),

    /// No device matched during enumeration.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The target device could not be acquired in the requested mode.
    #[error("cannot open device in {mode} mode: {reason}")]
    Open { mode: OpenMode, reason: String },

    /// Padding target shorter than the framed command.
    #[error("framing error: pad_to {pad_to} is shorter than the framed length {framed_len}")]
    Framing { pad_to: usize, framed_len: usize },

    /// Value out of safe range.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Generic HID failure outside of a report submission.
    #[error("HID error: {0}")]
    Hid(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
