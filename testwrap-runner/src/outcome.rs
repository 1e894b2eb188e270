// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verdicts, per-shard results and their aggregation into a target outcome.

use crate::{
    errors::{ChildFdError, ChildStartError, DisplayErrorChain, ReportWriteError, SetupError},
    shard::ShardSlot,
    test_output::ChildSplitOutput,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use std::{fmt, process::ExitStatus, time::Duration};
use testwrap_metadata::{OutcomeSummary, ShardSummary, TestWrapExitCode, VerdictSummary};

/// The verdict of a shard or a target.
///
/// Verdicts are ordered from best to worst: `Pass < Fail < InfrastructureError`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Verdict {
    /// The test ran and passed.
    Pass,

    /// The test ran and failed, or timed out.
    Fail,

    /// The wrapper could not run the test correctly.
    InfrastructureError,
}

impl Verdict {
    /// Reduces a sequence of verdicts to the worst one.
    ///
    /// A single verdict is returned verbatim. An empty sequence is an infrastructure error,
    /// since no shard reported anything.
    pub fn worst(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
        verdicts
            .into_iter()
            .max()
            .unwrap_or(Verdict::InfrastructureError)
    }

    /// Returns the process exit code for this verdict.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Pass => TestWrapExitCode::OK,
            Self::Fail => TestWrapExitCode::TESTS_FAILED,
            Self::InfrastructureError => TestWrapExitCode::INFRASTRUCTURE_FAILED,
        }
    }

    /// Converts this verdict to its machine-readable form.
    pub fn to_summary(self) -> VerdictSummary {
        match self {
            Self::Pass => VerdictSummary::Pass,
            Self::Fail => VerdictSummary::Fail,
            Self::InfrastructureError => VerdictSummary::InfrastructureError,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
            Self::InfrastructureError => f.write_str("INFRA"),
        }
    }
}

/// Aggregates shard results into a target verdict.
pub fn aggregate(results: &[InvocationResult]) -> Verdict {
    Verdict::worst(results.iter().map(|result| result.verdict()))
}

/// Why a test process failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureStatus {
    /// The process exited with a nonzero exit code.
    ExitCode(i32),

    /// The process was terminated by a signal.
    Signal(i32),

    /// The process exited with code 0, but left the premature exit file behind.
    PrematureExit,
}

impl FailureStatus {
    /// Extracts a failure status from an exit status that isn't a success.
    pub fn extract(exit_status: ExitStatus) -> Option<Self> {
        if let Some(code) = exit_status.code() {
            return (code != 0).then_some(Self::ExitCode(code));
        }
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                use std::os::unix::process::ExitStatusExt;
                exit_status.signal().map(Self::Signal)
            } else {
                None
            }
        }
    }
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode(code) => write!(f, "exit code {code}"),
            #[cfg(unix)]
            Self::Signal(signal) => match crate::helpers::signal_str(*signal) {
                Some(name) => write!(f, "signal {signal} (SIG{name})"),
                None => write!(f, "signal {signal}"),
            },
            #[cfg(not(unix))]
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::PrematureExit => f.write_str("premature exit"),
        }
    }
}

/// Why a test could not be executed correctly.
#[derive(Clone, Debug)]
pub enum ExecFailReason {
    /// The process could not be started.
    Start(ChildStartError),

    /// Waiting for the process failed.
    Wait(ChildFdError),

    /// The test wrote a reason to the infrastructure failure file.
    Reported {
        /// The contents of the file.
        message: String,
    },
}

impl fmt::Display for ExecFailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(error) => write!(f, "{error}"),
            Self::Wait(error) => write!(f, "{error}"),
            Self::Reported { message } => write!(f, "test reported: {}", message.trim_end()),
        }
    }
}

/// How a test process finished.
#[derive(Clone, Debug)]
pub enum ExecutionResult {
    /// The process exited with code 0.
    Pass,

    /// The process failed.
    Fail {
        /// How it failed.
        status: FailureStatus,
    },

    /// The process ran past its timeout and was terminated.
    Timeout,

    /// The process could not be executed correctly.
    ExecFail {
        /// Why.
        reason: ExecFailReason,
    },
}

impl ExecutionResult {
    /// Maps an exit status to an execution result. `0` passes, anything else fails.
    pub fn from_exit_status(exit_status: ExitStatus) -> Self {
        if exit_status.success() {
            return Self::Pass;
        }
        match FailureStatus::extract(exit_status) {
            Some(status) => Self::Fail { status },
            // Neither an exit code nor a signal. Treat it like a generic failure.
            None => Self::Fail {
                status: FailureStatus::ExitCode(1),
            },
        }
    }

    /// Returns the verdict for this result.
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Pass => Verdict::Pass,
            Self::Fail { .. } | Self::Timeout => Verdict::Fail,
            Self::ExecFail { .. } => Verdict::InfrastructureError,
        }
    }

    /// Returns true if the process was terminated because of a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("passed"),
            Self::Fail { status } => write!(f, "failed with {status}"),
            Self::Timeout => f.write_str("timed out"),
            Self::ExecFail { reason } => write!(f, "infrastructure error: {reason}"),
        }
    }
}

/// The result of running one shard.
#[derive(Clone, Debug)]
pub struct InvocationResult {
    pub(crate) slot: ShardSlot,
    pub(crate) result: ExecutionResult,
    pub(crate) output: ChildSplitOutput,
    pub(crate) start_time: DateTime<FixedOffset>,
    pub(crate) duration: Duration,
    pub(crate) fd_errors: Vec<ChildFdError>,
    pub(crate) report_errors: Vec<ReportWriteError>,
    pub(crate) scratch_dir: Option<Utf8PathBuf>,
}

impl InvocationResult {
    /// Creates a result for a shard that could not be started.
    pub(crate) fn start_failed(
        slot: ShardSlot,
        error: ChildStartError,
        start_time: DateTime<FixedOffset>,
        duration: Duration,
    ) -> Self {
        Self {
            slot,
            result: ExecutionResult::ExecFail {
                reason: ExecFailReason::Start(error),
            },
            output: ChildSplitOutput::default(),
            start_time,
            duration,
            fd_errors: Vec::new(),
            report_errors: Vec::new(),
            scratch_dir: None,
        }
    }

    /// Returns the shard this result is for.
    pub fn slot(&self) -> ShardSlot {
        self.slot
    }

    /// Returns how the process finished.
    pub fn result(&self) -> &ExecutionResult {
        &self.result
    }

    /// Returns the verdict of this shard.
    pub fn verdict(&self) -> Verdict {
        self.result.verdict()
    }

    /// Returns the exit code of the process, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match &self.result {
            ExecutionResult::Pass => Some(0),
            ExecutionResult::Fail {
                status: FailureStatus::ExitCode(code),
            } => Some(*code),
            ExecutionResult::Fail {
                status: FailureStatus::PrematureExit,
            } => Some(0),
            _ => None,
        }
    }

    /// Returns the captured output. Always present, whatever the verdict.
    pub fn output(&self) -> &ChildSplitOutput {
        &self.output
    }

    /// Returns the time at which the shard started.
    pub fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    /// Returns how long the shard took.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns errors encountered while reading output.
    pub fn fd_errors(&self) -> &[ChildFdError] {
        &self.fd_errors
    }

    /// Returns errors encountered while writing reports. These never affect the verdict.
    pub fn report_errors(&self) -> &[ReportWriteError] {
        &self.report_errors
    }

    /// Returns the scratch directory, if it was kept.
    pub fn scratch_dir(&self) -> Option<&Utf8Path> {
        self.scratch_dir.as_deref()
    }

    /// Converts this result to its machine-readable form.
    pub fn to_summary(&self) -> ShardSummary {
        ShardSummary {
            index: self.slot.index(),
            total: self.slot.total().get(),
            verdict: self.verdict().to_summary(),
            result: self.result.to_string(),
            exit_code: self.exit_code(),
            duration_secs: self.duration.as_secs_f64(),
            stdout: self.output.stdout_lossy().into_owned(),
            stderr: self.output.stderr_lossy().into_owned(),
            scratch_dir: self.scratch_dir.clone(),
        }
    }
}

/// The outcome of running a target: every shard's result and the aggregated verdict.
#[derive(Debug)]
pub struct TestOutcome {
    pub(crate) label: Option<String>,
    pub(crate) results: Vec<InvocationResult>,
    pub(crate) setup_error: Option<SetupError>,
    pub(crate) start_time: DateTime<FixedOffset>,
    pub(crate) duration: Duration,
    pub(crate) runfiles_dir: Option<Utf8PathBuf>,
}

impl TestOutcome {
    /// Returns the label of the target, if known.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the aggregated verdict.
    pub fn verdict(&self) -> Verdict {
        if self.setup_error.is_some() {
            Verdict::InfrastructureError
        } else {
            aggregate(&self.results)
        }
    }

    /// Returns the process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        self.verdict().exit_code()
    }

    /// Returns per-shard results, ordered by shard index.
    pub fn results(&self) -> &[InvocationResult] {
        &self.results
    }

    /// Returns the error that stopped the target before any shard was launched, if any.
    pub fn setup_error(&self) -> Option<&SetupError> {
        self.setup_error.as_ref()
    }

    /// Returns the time at which the run started.
    pub fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    /// Returns the total duration of the run.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the runfiles directory, if it was kept.
    pub fn runfiles_dir(&self) -> Option<&Utf8Path> {
        self.runfiles_dir.as_deref()
    }

    /// Converts this outcome to its machine-readable form.
    pub fn to_summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            target: self.label.clone(),
            verdict: self.verdict().to_summary(),
            exit_code: self.exit_code(),
            start_time: self.start_time.to_rfc3339(),
            duration_secs: self.duration.as_secs_f64(),
            setup_error: self
                .setup_error
                .as_ref()
                .map(|error| DisplayErrorChain::new(error).to_string()),
            shards: self.results.iter().map(InvocationResult::to_summary).collect(),
        }
    }
}
