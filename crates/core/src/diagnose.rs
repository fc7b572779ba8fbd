//! Status classification and run-level diagnostics.
//!
//! The negotiator treats every non-success status the same way. Once a run
//! is over, this module looks at the statuses as a whole: when every
//! submission failed with one and the same code, that code usually names
//! the real problem (a stalled pipe, a missing permission), and the user gets
//! a hint instead of a wall of identical failures.

use serde::Serialize;

use crate::negotiate::AttemptResult;
use crate::transport::StatusCode;

/// IOKit status codes seen on macOS.
pub mod iokit {
    pub const PIPE_STALLED: i64 = 0xE000_5000;
    pub const NO_DEVICE: i64 = 0xE000_02C0;
    pub const NOT_PRIVILEGED: i64 = 0xE000_02C1;
    pub const EXCLUSIVE_ACCESS: i64 = 0xE000_02C5;
    pub const UNSUPPORTED: i64 = 0xE000_02C7;
    pub const BUSY: i64 = 0xE000_02D5;
    pub const TIMEOUT: i64 = 0xE000_02D6;
    pub const NOT_PERMITTED: i64 = 0xE000_02E2;
}

/// errno values reported by hidraw on Linux.
pub mod errno {
    pub const EPERM: i64 = 1;
    pub const EACCES: i64 = 13;
    pub const EBUSY: i64 = 16;
    pub const ENODEV: i64 = 19;
    pub const EINVAL: i64 = 22;
    pub const EPIPE: i64 = 32;
    pub const ENOSYS: i64 = 38;
    pub const EOPNOTSUPP: i64 = 95;
    pub const ETIMEDOUT: i64 = 110;
}

/// Coarse cause of a submission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Accepted,
    /// The device stalled the control pipe: it refused the report outright.
    PipeStall,
    /// Another client holds the device.
    Busy,
    AccessDenied,
    /// The platform or device does not support this report type.
    Unsupported,
    Disconnected,
    Timeout,
    Other,
}

impl StatusClass {
    pub fn classify(status: StatusCode) -> Self {
        match status.0 {
            0 => Self::Accepted,
            iokit::PIPE_STALLED | errno::EPIPE => Self::PipeStall,
            iokit::BUSY | iokit::EXCLUSIVE_ACCESS | errno::EBUSY => Self::Busy,
            iokit::NOT_PRIVILEGED | iokit::NOT_PERMITTED | errno::EPERM | errno::EACCES => {
                Self::AccessDenied
            }
            iokit::UNSUPPORTED | errno::ENOSYS | errno::EOPNOTSUPP | errno::EINVAL => {
                Self::Unsupported
            }
            _ if status == StatusCode::UNSUPPORTED => Self::Unsupported,
            iokit::NO_DEVICE | errno::ENODEV => Self::Disconnected,
            _ if status == StatusCode::NOT_OPEN => Self::Disconnected,
            iokit::TIMEOUT | errno::ETIMEDOUT => Self::Timeout,
            _ => Self::Other,
        }
    }

    /// Guidance for a run where every submission ended in this class.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PipeStall => Some(
                "Every report stalled the USB pipe. The device rejects the reports at the \
                 transport level; on macOS this usually means the process lacks the \
                 com.apple.security.device.usb entitlement signed with a Developer ID.",
            ),
            Self::Busy => Some(
                "The device is held by another process. Quit the vendor app or any other \
                 HID client and try again.",
            ),
            Self::AccessDenied => Some(
                "Access to the device was denied. On Linux install a udev rule granting \
                 access to the hidraw node; on macOS grant Input Monitoring permission.",
            ),
            Self::Unsupported => Some(
                "The transport does not support these reports. Try a different report type \
                 or framing strategy.",
            ),
            Self::Disconnected => Some("The device disappeared during the run. Reconnect it."),
            Self::Timeout => Some(
                "Every report timed out. The device may be busy with another host connection.",
            ),
            Self::Accepted | Self::Other => None,
        }
    }
}

/// Statuses the transport produced without the report reaching the device.
fn refused_locally(status: StatusCode) -> bool {
    status == StatusCode::UNSUPPORTED || status == StatusCode::NOT_OPEN
}

/// Verdict over all attempts of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnosis {
    /// At least one report was accepted.
    Accepted { count: usize },
    /// Every report that reached the device failed with the same status.
    UniformFailure {
        status: StatusCode,
        class: StatusClass,
        submissions: usize,
    },
    /// Submissions failed with a mix of statuses. `class` is set when every
    /// report that reached the device still failed for the same cause.
    MixedFailure {
        distinct: Vec<StatusCode>,
        class: Option<StatusClass>,
    },
    /// Nothing reached the transport.
    NothingSubmitted,
}

impl Diagnosis {
    /// Reports the transport refused on its own (an unsupported report type,
    /// a missing handle) say nothing about the device and are left out of
    /// the uniformity check, unless nothing else was submitted.
    pub fn of(attempts: &[AttemptResult]) -> Self {
        let statuses: Vec<StatusCode> = attempts.iter().filter_map(|a| a.status).collect();

        let accepted = statuses.iter().filter(|s| s.is_success()).count();
        if accepted > 0 {
            return Self::Accepted { count: accepted };
        }

        if statuses.is_empty() {
            return Self::NothingSubmitted;
        }

        let reached: Vec<StatusCode> = statuses
            .iter()
            .copied()
            .filter(|&s| !refused_locally(s))
            .collect();
        let considered = if reached.is_empty() { &statuses } else { &reached };
        let lead = considered[0];

        if considered.iter().all(|&s| s == lead) {
            return Self::UniformFailure {
                status: lead,
                class: StatusClass::classify(lead),
                submissions: considered.len(),
            };
        }

        let lead_class = StatusClass::classify(lead);
        let class = considered
            .iter()
            .all(|&s| StatusClass::classify(s) == lead_class)
            .then_some(lead_class);

        let mut distinct: Vec<StatusCode> = Vec::new();
        for s in statuses {
            if !distinct.contains(&s) {
                distinct.push(s);
            }
        }
        Self::MixedFailure { distinct, class }
    }

    /// User-facing guidance, if the outcome warrants any.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Accepted { .. } => None,
            Self::UniformFailure { status, class, .. } => Some(
                class
                    .hint()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Every report failed with status {status}.")),
            ),
            Self::MixedFailure { class, .. } => {
                class.and_then(|c| c.hint()).map(str::to_string)
            }
            Self::NothingSubmitted => Some(
                "No report was submitted. Check that the device can be opened in the \
                 required access mode."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiate::Outcome;
    use crate::framing::ReportType;
    use crate::transport::OpenMode;

    fn attempt(status: Option<StatusCode>) -> AttemptResult {
        AttemptResult {
            round: "r".into(),
            command_label: "c".into(),
            framing_label: "f".into(),
            report_type: ReportType::Output,
            report_id: 0,
            access: OpenMode::Shared,
            bytes_sent: if status.is_some() { 6 } else { 0 },
            frame: vec![],
            status,
            detail: None,
            outcome: match status {
                Some(s) if s.is_success() => Outcome::Accepted,
                Some(_) => Outcome::Rejected,
                None => Outcome::Skipped {
                    reason: "refused".into(),
                },
            },
        }
    }

    #[test]
    fn classify_known_codes() {
        assert_eq!(
            StatusClass::classify(StatusCode(iokit::PIPE_STALLED)),
            StatusClass::PipeStall
        );
        assert_eq!(StatusClass::classify(StatusCode(errno::EPIPE)), StatusClass::PipeStall);
        assert_eq!(StatusClass::classify(StatusCode(errno::EBUSY)), StatusClass::Busy);
        assert_eq!(
            StatusClass::classify(StatusCode(errno::EACCES)),
            StatusClass::AccessDenied
        );
        assert_eq!(
            StatusClass::classify(StatusCode::UNSUPPORTED),
            StatusClass::Unsupported
        );
        assert_eq!(
            StatusClass::classify(StatusCode::NOT_OPEN),
            StatusClass::Disconnected
        );
        assert_eq!(StatusClass::classify(StatusCode::SUCCESS), StatusClass::Accepted);
        assert_eq!(StatusClass::classify(StatusCode(12345)), StatusClass::Other);
    }

    #[test]
    fn every_failure_class_but_other_has_a_hint() {
        for class in [
            StatusClass::PipeStall,
            StatusClass::Busy,
            StatusClass::AccessDenied,
            StatusClass::Unsupported,
            StatusClass::Disconnected,
            StatusClass::Timeout,
        ] {
            assert!(class.hint().is_some(), "{class:?} has no hint");
        }
        assert!(StatusClass::Other.hint().is_none());
    }

    #[test]
    fn uniform_stall_is_surfaced() {
        let stall = Some(StatusCode(iokit::PIPE_STALLED));
        let attempts = vec![attempt(stall), attempt(stall), attempt(None)];

        let d = Diagnosis::of(&attempts);

        assert_eq!(
            d,
            Diagnosis::UniformFailure {
                status: StatusCode(iokit::PIPE_STALLED),
                class: StatusClass::PipeStall,
                submissions: 2,
            }
        );
        assert!(d.hint().unwrap().contains("entitlement"));
    }

    #[test]
    fn uniform_unknown_code_names_the_status() {
        let attempts = vec![attempt(Some(StatusCode(777))); 3];
        let hint = Diagnosis::of(&attempts).hint().unwrap();
        assert!(hint.contains("0x00000309"));
    }

    #[test]
    fn any_success_wins() {
        let attempts = vec![
            attempt(Some(StatusCode(errno::EPIPE))),
            attempt(Some(StatusCode::SUCCESS)),
        ];
        assert_eq!(Diagnosis::of(&attempts), Diagnosis::Accepted { count: 1 });
        assert_eq!(Diagnosis::of(&attempts).hint(), None);
    }

    #[test]
    fn mixed_failures_list_distinct_codes() {
        let attempts = vec![
            attempt(Some(StatusCode(errno::EPIPE))),
            attempt(Some(StatusCode(errno::EBUSY))),
            attempt(Some(StatusCode(errno::EPIPE))),
        ];
        assert_eq!(
            Diagnosis::of(&attempts),
            Diagnosis::MixedFailure {
                distinct: vec![StatusCode(errno::EPIPE), StatusCode(errno::EBUSY)],
                class: None,
            }
        );
        assert_eq!(Diagnosis::of(&attempts).hint(), None);
    }

    #[test]
    fn locally_refused_reports_do_not_hide_a_stall() {
        let stall = Some(StatusCode(errno::EPIPE));
        let attempts = vec![
            attempt(stall),
            attempt(stall),
            attempt(Some(StatusCode::UNSUPPORTED)),
        ];

        let d = Diagnosis::of(&attempts);

        assert_eq!(
            d,
            Diagnosis::UniformFailure {
                status: StatusCode(errno::EPIPE),
                class: StatusClass::PipeStall,
                submissions: 2,
            }
        );
        assert!(d.hint().unwrap().contains("stalled"));
    }

    #[test]
    fn only_local_refusals_are_still_uniform() {
        let attempts = vec![attempt(Some(StatusCode::UNSUPPORTED)); 2];
        assert_eq!(
            Diagnosis::of(&attempts),
            Diagnosis::UniformFailure {
                status: StatusCode::UNSUPPORTED,
                class: StatusClass::Unsupported,
                submissions: 2,
            }
        );
    }

    #[test]
    fn mixed_codes_of_one_class_keep_the_hint() {
        let attempts = vec![
            attempt(Some(StatusCode(iokit::PIPE_STALLED))),
            attempt(Some(StatusCode(errno::EPIPE))),
            attempt(Some(StatusCode::NOT_OPEN)),
        ];

        let d = Diagnosis::of(&attempts);

        assert_eq!(
            d,
            Diagnosis::MixedFailure {
                distinct: vec![
                    StatusCode(iokit::PIPE_STALLED),
                    StatusCode(errno::EPIPE),
                    StatusCode::NOT_OPEN,
                ],
                class: Some(StatusClass::PipeStall),
            }
        );
        assert!(d.hint().unwrap().contains("entitlement"));
    }

    #[test]
    fn nothing_submitted() {
        let attempts = vec![attempt(None), attempt(None)];
        let d = Diagnosis::of(&attempts);
        assert_eq!(d, Diagnosis::NothingSubmitted);
        assert!(d.hint().is_some());
        assert_eq!(Diagnosis::of(&[]), Diagnosis::NothingSubmitted);
    }
}
