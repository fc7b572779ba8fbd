//! Framing strategies: how a command frame is wrapped into a HID report.
//!
//! The target's expected framing has never been confirmed, so the catalog
//! holds every variant worth trying. A strategy decides:
//! - whether a one-byte length prefix precedes the command,
//! - which report ID the report is sent under,
//! - which report type (pipe) carries it,
//! - how far the buffer is zero-padded.
//!
//! The first entry mirrors what the vendor app does: length prefix, report ID
//! equal to the command length, 192-byte buffer.

use crate::command::Command;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Buffer size the vendor app hands to the HID layer.
pub const DEFAULT_PAD: usize = 192;

/// HID report type, numbered as the HID class specification does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Input,
    Output,
    Feature,
}

impl ReportType {
    /// Numeric report type (input = 0, output = 1, feature = 2).
    pub fn code(&self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::Feature => 2,
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Feature => "feature",
        };
        f.write_str(name)
    }
}

/// How the report ID is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportIdMode {
    /// Always report ID 0 (unnumbered reports).
    Zero,
    /// Report ID equals the command length, excluding any prefix or padding.
    EqualToDataLength,
}

impl ReportIdMode {
    pub fn resolve(&self, command: &Command) -> u8 {
        match self {
            Self::Zero => 0,
            // Frames are bounded by the one-byte length field plus overhead.
            Self::EqualToDataLength => command.len().min(usize::from(u8::MAX)) as u8,
        }
    }
}

/// One way of wrapping a command into a HID report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FramingStrategy {
    pub label: String,
    pub prepend_length_byte: bool,
    pub report_id_mode: ReportIdMode,
    pub report_type: ReportType,
    /// Zero-pad the report to this many bytes. `None` sends the exact length.
    pub pad_to: Option<usize>,
    /// The device must be reopened for exclusive access before submitting.
    #[serde(default)]
    pub requires_exclusive: bool,
}

impl FramingStrategy {
    /// Length prefix, report ID = data length, output report, no padding.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prepend_length_byte: true,
            report_id_mode: ReportIdMode::EqualToDataLength,
            report_type: ReportType::Output,
            pad_to: None,
            requires_exclusive: false,
        }
    }

    pub fn length_prefix(mut self, enabled: bool) -> Self {
        self.prepend_length_byte = enabled;
        self
    }

    pub fn report_id(mut self, mode: ReportIdMode) -> Self {
        self.report_id_mode = mode;
        self
    }

    pub fn report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = report_type;
        self
    }

    pub fn padded(mut self, pad_to: usize) -> Self {
        self.pad_to = Some(pad_to);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.requires_exclusive = true;
        self
    }

    /// Wrap `command` into the report this strategy describes.
    ///
    /// Fails if `pad_to` is shorter than the prefix plus command; reports are
    /// never truncated.
    pub fn frame(&self, command: &Command) -> Result<FramedReport> {
        let prefix = usize::from(self.prepend_length_byte);
        let core_len = prefix + command.len();
        let mut data = Vec::with_capacity(self.pad_to.unwrap_or(core_len).max(core_len));

        if self.prepend_length_byte {
            data.push(command.len() as u8);
        }
        data.extend_from_slice(command.as_bytes());

        if let Some(pad_to) = self.pad_to {
            if pad_to < core_len {
                return Err(Error::Framing {
                    pad_to,
                    framed_len: core_len,
                });
            }
            data.resize(pad_to, 0);
        }

        Ok(FramedReport {
            report_type: self.report_type,
            report_id: self.report_id_mode.resolve(command),
            data,
            prefix_len: prefix,
            core_len,
        })
    }
}

impl std::fmt::Display for FramingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (prefix={}, id={}, type={}, pad={}{})",
            self.label,
            self.prepend_length_byte,
            match self.report_id_mode {
                ReportIdMode::Zero => "0",
                ReportIdMode::EqualToDataLength => "len",
            },
            self.report_type,
            self.pad_to.map_or_else(|| "none".to_string(), |p| p.to_string()),
            if self.requires_exclusive { ", seize" } else { "" }
        )
    }
}

/// The buffer handed to the transport for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedReport {
    pub report_type: ReportType,
    pub report_id: u8,
    /// Prefix, command and padding.
    pub data: Vec<u8>,
    prefix_len: usize,
    core_len: usize,
}

impl FramedReport {
    /// Prefix and command, without padding.
    pub fn core(&self) -> &[u8] {
        &self.data[..self.core_len]
    }

    /// The command bytes alone.
    pub fn command_bytes(&self) -> &[u8] {
        &self.data[self.prefix_len..self.core_len]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Every strategy worth trying, in trial order.
///
/// `pad_to` is the padded buffer size used by the padded variants.
pub fn catalog(pad_to: usize) -> Vec<FramingStrategy> {
    use ReportIdMode::{EqualToDataLength, Zero};

    vec![
        FramingStrategy::new("app-protocol").padded(pad_to),
        FramingStrategy::new("raw-id0-padded")
            .length_prefix(false)
            .report_id(Zero)
            .padded(pad_to),
        FramingStrategy::new("raw-idlen-unpadded")
            .length_prefix(false)
            .report_id(EqualToDataLength),
        FramingStrategy::new("raw-id0-unpadded")
            .length_prefix(false)
            .report_id(Zero),
        FramingStrategy::new("prefixed-idlen-unpadded"),
        FramingStrategy::new("input-type")
            .report_type(ReportType::Input)
            .padded(pad_to),
        FramingStrategy::new("feature-type")
            .report_type(ReportType::Feature)
            .padded(pad_to),
        FramingStrategy::new("seized-app-protocol")
            .padded(pad_to)
            .exclusive(),
        FramingStrategy::new("seized-raw-id0")
            .length_prefix(false)
            .report_id(Zero)
            .padded(pad_to)
            .exclusive(),
    ]
}

/// Look up a catalog strategy by label.
pub fn find(label: &str, pad_to: usize) -> Option<FramingStrategy> {
    catalog(pad_to).into_iter().find(|s| s.label == label)
}
