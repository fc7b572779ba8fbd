//! Transport negotiation: try every command under every framing strategy.
//!
//! A [`ProbePlan`] is a list of rounds, each pairing a set of strategies with
//! the commands worth sending under them. The [`Negotiator`] walks the plan
//! strategy by strategy, command by command, and records one
//! [`AttemptResult`] per pair. It never stops at the first accepted report:
//! the point of a run is to see how the device answers every variant.
//!
//! Only two things abort a run: a strategy that cannot frame one of its
//! commands (caught before any traffic), and failure to open the device for
//! the first round. A failed reopen later on, such as the seize round on a
//! platform without exclusive access, marks that round's pairs as skipped.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::command::{probe_commands, LabeledCommand};
use crate::diagnose::Diagnosis;
use crate::error::Result;
use crate::framing::{catalog, FramedReport, FramingStrategy, ReportType};
use crate::transport::{DeviceDescriptor, HidTransport, OpenMode, StatusCode, Submission};

/// A group of strategies tried against a group of commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Round {
    pub label: String,
    pub strategies: Vec<FramingStrategy>,
    pub commands: Vec<LabeledCommand>,
}

impl Round {
    pub fn new(
        label: impl Into<String>,
        strategies: Vec<FramingStrategy>,
        commands: Vec<LabeledCommand>,
    ) -> Self {
        Self {
            label: label.into(),
            strategies,
            commands,
        }
    }

    /// Access mode the device must be held in for this round.
    ///
    /// A round with any strategy that requires exclusive access runs seized.
    pub fn access(&self) -> OpenMode {
        if self.strategies.iter().any(|s| s.requires_exclusive) {
            OpenMode::Exclusive
        } else {
            OpenMode::Shared
        }
    }

    /// Strategy-major pairs, in submission order.
    pub fn pairs(&self) -> impl Iterator<Item = (&FramingStrategy, &LabeledCommand)> {
        self.strategies
            .iter()
            .flat_map(move |s| self.commands.iter().map(move |c| (s, c)))
    }

    pub fn attempt_count(&self) -> usize {
        self.strategies.len() * self.commands.len()
    }
}

/// Ordered rounds making up one negotiation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbePlan {
    pub rounds: Vec<Round>,
}

impl ProbePlan {
    pub fn new(rounds: Vec<Round>) -> Self {
        Self { rounds }
    }

    /// Plan covering the whole strategy catalog.
    ///
    /// Round 1 sends every probe command with the vendor app's framing; the
    /// later rounds vary one aspect at a time with fewer commands each.
    pub fn standard(pad_to: usize) -> Self {
        let strategies = catalog(pad_to);
        let pick = |labels: &[&str]| -> Vec<FramingStrategy> {
            strategies
                .iter()
                .filter(|s| labels.contains(&s.label.as_str()))
                .cloned()
                .collect()
        };

        let commands = probe_commands();
        let power_on = commands[0].clone();
        let cct_full = commands[1].clone();

        Self::new(vec![
            Round::new("app protocol", pick(&["app-protocol"]), commands.clone()),
            Round::new(
                "no prefix, id 0, padded",
                pick(&["raw-id0-padded"]),
                vec![power_on.clone(), cct_full.clone()],
            ),
            Round::new(
                "no padding",
                pick(&[
                    "raw-idlen-unpadded",
                    "raw-id0-unpadded",
                    "prefixed-idlen-unpadded",
                ]),
                vec![power_on.clone()],
            ),
            Round::new(
                "input report type",
                pick(&["input-type"]),
                vec![power_on.clone(), cct_full.clone()],
            ),
            Round::new("feature report type", pick(&["feature-type"]), vec![power_on]),
            Round::new(
                "seize then send",
                pick(&["seized-app-protocol", "seized-raw-id0"]),
                vec![cct_full],
            ),
        ])
    }

    /// Restrict the plan to the rounds whose 1-based index is in `keep`.
    pub fn select(mut self, keep: &[usize]) -> Self {
        let mut index = 0;
        self.rounds.retain(|_| {
            index += 1;
            keep.contains(&index)
        });
        self
    }

    pub fn attempt_count(&self) -> usize {
        self.rounds.iter().map(Round::attempt_count).sum()
    }

    /// Frame every pair up front so a bad strategy fails before any traffic.
    fn prepare(&self) -> Result<Vec<PreparedRound<'_>>> {
        self.rounds
            .iter()
            .map(|round| {
                let attempts = round
                    .pairs()
                    .map(|(strategy, command)| {
                        strategy.frame(&command.command).map(|report| Prepared {
                            strategy,
                            command,
                            report,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(PreparedRound { round, attempts })
            })
            .collect()
    }
}

struct Prepared<'p> {
    strategy: &'p FramingStrategy,
    command: &'p LabeledCommand,
    report: FramedReport,
}

struct PreparedRound<'p> {
    round: &'p Round,
    attempts: Vec<Prepared<'p>>,
}

/// What happened to one (strategy, command) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The transport returned its success status.
    Accepted,
    /// The report was submitted and the transport returned a failure status.
    Rejected,
    /// The report was never submitted.
    Skipped { reason: String },
}

/// Record of a single attempt. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptResult {
    pub round: String,
    pub command_label: String,
    pub framing_label: String,
    pub report_type: ReportType,
    pub report_id: u8,
    pub access: OpenMode,
    /// Length of the submitted buffer, padding included.
    pub bytes_sent: usize,
    /// Prefix and command bytes, without padding.
    pub frame: Vec<u8>,
    /// `None` when the report was never submitted.
    pub status: Option<StatusCode>,
    pub detail: Option<String>,
    pub outcome: Outcome,
}

impl AttemptResult {
    fn submitted(
        round: &str,
        prepared: &Prepared<'_>,
        access: OpenMode,
        submission: Submission,
    ) -> Self {
        let outcome = if submission.status.is_success() {
            Outcome::Accepted
        } else {
            Outcome::Rejected
        };
        Self {
            round: round.to_string(),
            command_label: prepared.command.label.clone(),
            framing_label: prepared.strategy.label.clone(),
            report_type: prepared.report.report_type,
            report_id: prepared.report.report_id,
            access,
            bytes_sent: prepared.report.len(),
            frame: prepared.report.core().to_vec(),
            status: Some(submission.status),
            detail: submission.detail,
            outcome,
        }
    }

    fn skipped(round: &str, prepared: &Prepared<'_>, access: OpenMode, reason: &str) -> Self {
        Self {
            round: round.to_string(),
            command_label: prepared.command.label.clone(),
            framing_label: prepared.strategy.label.clone(),
            report_type: prepared.report.report_type,
            report_id: prepared.report.report_id,
            access,
            bytes_sent: 0,
            frame: prepared.report.core().to_vec(),
            status: None,
            detail: None,
            outcome: Outcome::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Accepted
    }

    pub fn was_submitted(&self) -> bool {
        self.status.is_some()
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub device: DeviceDescriptor,
    pub attempts: Vec<AttemptResult>,
    pub any_succeeded: bool,
    pub diagnosis: Diagnosis,
}

impl ProbeReport {
    fn new(device: DeviceDescriptor, attempts: Vec<AttemptResult>) -> Self {
        Self {
            device,
            any_succeeded: attempts.iter().any(AttemptResult::succeeded),
            diagnosis: Diagnosis::of(&attempts),
            attempts,
        }
    }

    /// Attempts that reached the transport.
    pub fn submitted(&self) -> impl Iterator<Item = &AttemptResult> {
        self.attempts.iter().filter(|a| a.was_submitted())
    }
}

/// Drives a [`ProbePlan`] against one device.
///
/// The negotiator is the sole owner of the device handle for the duration of
/// a run.
pub struct Negotiator<'t> {
    transport: &'t mut dyn HidTransport,
    delay: Duration,
    mode: Option<OpenMode>,
}

impl<'t> Negotiator<'t> {
    pub fn new(transport: &'t mut dyn HidTransport) -> Self {
        Self {
            transport,
            delay: Duration::ZERO,
            mode: None,
        }
    }

    /// Pause between consecutive submissions of a shared-access round, giving
    /// an observer time to watch the light react.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `plan` against `device`.
    pub fn run(&mut self, device: &DeviceDescriptor, plan: &ProbePlan) -> Result<ProbeReport> {
        self.run_with(device, plan, &mut |_| {})
    }

    /// Run `plan`, handing each result to `on_attempt` as soon as it exists.
    pub fn run_with(
        &mut self,
        device: &DeviceDescriptor,
        plan: &ProbePlan,
        on_attempt: &mut dyn FnMut(&AttemptResult),
    ) -> Result<ProbeReport> {
        let prepared = plan.prepare()?;

        info!(
            path = %device.path,
            rounds = plan.rounds.len(),
            attempts = plan.attempt_count(),
            "Starting negotiation"
        );
        self.transport.open(device, OpenMode::Shared)?;
        self.mode = Some(OpenMode::Shared);

        let mut attempts = Vec::with_capacity(plan.attempt_count());
        for (n, prepared_round) in prepared.iter().enumerate() {
            let round = prepared_round.round;
            let access = round.access();
            info!(round = n + 1, label = %round.label, %access, "Round start");

            if let Err(reason) = self.acquire(device, access) {
                warn!(
                    round = n + 1,
                    %access,
                    reason = %reason,
                    "Cannot acquire device, skipping round"
                );
                for p in &prepared_round.attempts {
                    let result = AttemptResult::skipped(&round.label, p, access, &reason);
                    on_attempt(&result);
                    attempts.push(result);
                }
                continue;
            }

            for (i, p) in prepared_round.attempts.iter().enumerate() {
                if i > 0 && access == OpenMode::Shared && !self.delay.is_zero() {
                    std::thread::sleep(self.delay);
                }
                let result = self.submit(&round.label, p, access);
                on_attempt(&result);
                attempts.push(result);
            }
        }

        self.release();
        let report = ProbeReport::new(device.clone(), attempts);
        info!(
            any_succeeded = report.any_succeeded,
            attempts = report.attempts.len(),
            "Negotiation finished"
        );
        Ok(report)
    }

    fn submit(&mut self, round: &str, p: &Prepared<'_>, access: OpenMode) -> AttemptResult {
        trace!(
            command = %p.command.label,
            framing = %p.strategy.label,
            report_type = %p.report.report_type,
            report_id = p.report.report_id,
            len = p.report.len(),
            frame_hex = format_args!("{:02X?}", p.report.core()),
            "HID TX"
        );
        let submission =
            self.transport
                .send_report(p.report.report_type, p.report.report_id, &p.report.data);
        let result = AttemptResult::submitted(round, p, access, submission);
        debug!(
            command = %result.command_label,
            framing = %result.framing_label,
            status = ?result.status,
            accepted = result.succeeded(),
            "Attempt recorded"
        );
        result
    }

    /// Hold the device in `mode`, closing and reopening when it differs.
    fn acquire(&mut self, device: &DeviceDescriptor, mode: OpenMode) -> std::result::Result<(), String> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        if self.mode.is_some() {
            debug!(from = ?self.mode, to = %mode, "Closing device to change access mode");
            self.transport.close();
            self.mode = None;
        }
        self.transport
            .open(device, mode)
            .map_err(|e| e.to_string())?;
        self.mode = Some(mode);
        Ok(())
    }

    fn release(&mut self) {
        self.transport.close();
        self.mode = None;
    }
}

/// Send one command with one strategy, outside of a probe run.
///
/// Opens the device in the access mode the strategy needs, submits, and
/// closes. A rejected report is returned as a result, not an error.
pub fn send_command(
    transport: &mut dyn HidTransport,
    device: &DeviceDescriptor,
    command: &LabeledCommand,
    strategy: &FramingStrategy,
) -> Result<AttemptResult> {
    let report = strategy.frame(&command.command)?;
    let access = if strategy.requires_exclusive {
        OpenMode::Exclusive
    } else {
        OpenMode::Shared
    };

    transport.open(device, access)?;
    let prepared = Prepared {
        strategy,
        command,
        report,
    };
    let submission = transport.send_report(
        prepared.report.report_type,
        prepared.report.report_id,
        &prepared.report.data,
    );
    transport.close();

    let result = AttemptResult::submitted("single", &prepared, access, submission);
    info!(
        command = %result.command_label,
        framing = %result.framing_label,
        status = ?result.status,
        accepted = result.succeeded(),
        "Command sent"
    );
    Ok(result)
}
