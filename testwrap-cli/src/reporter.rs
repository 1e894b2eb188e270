// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints the outcome of a run: one status line per shard, captured output for the shards that
//! need it, and a summary. With `--message-format json`, a single [`OutcomeSummary`] object is
//! printed instead.
//!
//! [`OutcomeSummary`]: testwrap_metadata::OutcomeSummary

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, StdoutStyles},
};
use clap::ValueEnum;
use owo_colors::{OwoColorize, Style};
use std::{fmt::Write as _, io::Write, time::Duration};
use testwrap_runner::{
    errors::DisplayErrorChain,
    outcome::{ExecFailReason, ExecutionResult, InvocationResult, TestOutcome, Verdict},
};

/// Output format for `testwrap run`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum MessageFormat {
    /// Human-readable status lines and summary
    #[default]
    Human,
    /// A single JSON object on stdout
    Json,
}

/// Which shards' captured output is shown in human-readable output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum TestOutputDisplay {
    /// Only status lines and the summary
    Summary,
    /// Output of shards that did not pass
    #[default]
    Errors,
    /// Output of every shard
    All,
}

impl TestOutputDisplay {
    fn shows(self, verdict: Verdict) -> bool {
        match self {
            Self::Summary => false,
            Self::Errors => verdict != Verdict::Pass,
            Self::All => true,
        }
    }
}

#[derive(Debug)]
pub(crate) struct OutcomeReporter {
    format: MessageFormat,
    test_output: TestOutputDisplay,
    styles: StdoutStyles,
}

impl OutcomeReporter {
    pub(crate) fn new(
        output: OutputContext,
        format: MessageFormat,
        test_output: TestOutputDisplay,
    ) -> Self {
        Self {
            format,
            test_output,
            styles: output.stdout_styles(),
        }
    }

    pub(crate) fn is_human(&self) -> bool {
        self.format == MessageFormat::Human
    }

    pub(crate) fn write_marker(
        &self,
        marker: &str,
        writer: &mut impl Write,
    ) -> std::io::Result<()> {
        write!(writer, "{}", marker.style(self.styles.marker))?;
        writer.flush()
    }

    pub(crate) fn write_outcome(
        &self,
        outcome: &TestOutcome,
        writer: &mut impl Write,
    ) -> Result<()> {
        match self.format {
            MessageFormat::Human => self
                .write_human(outcome, writer)
                .map_err(|err| ExpectedError::WriteOutputError { err }),
            MessageFormat::Json => {
                serde_json::to_writer(&mut *writer, &outcome.to_summary())
                    .map_err(|err| ExpectedError::WriteJsonError { err })?;
                writeln!(writer).map_err(|err| ExpectedError::WriteOutputError { err })
            }
        }
    }

    fn write_human(&self, outcome: &TestOutcome, writer: &mut impl Write) -> std::io::Result<()> {
        let label = outcome.label().unwrap_or("test");

        if let Some(error) = outcome.setup_error() {
            self.write_status_line(
                writer,
                "INFRA",
                self.styles.infra,
                outcome.duration(),
                label,
                Some(&DisplayErrorChain::new(error).to_string()),
            )?;
        }

        for result in outcome.results() {
            let name = shard_name(label, result);
            let (status, style) = self.status(result);
            let detail = match result.result() {
                ExecutionResult::Pass => None,
                ExecutionResult::ExecFail {
                    reason: ExecFailReason::Start(error),
                } => Some(DisplayErrorChain::new(error).to_string()),
                other => Some(other.to_string()),
            };
            self.write_status_line(
                writer,
                status,
                style,
                result.duration(),
                &name,
                detail.as_deref(),
            )?;

            if self.test_output.shows(result.verdict()) {
                self.write_output(writer, &name, result)?;
            }
        }

        self.write_summary(writer, outcome)
    }

    fn status(&self, result: &InvocationResult) -> (&'static str, Style) {
        match result.verdict() {
            Verdict::Pass => ("PASS", self.styles.pass),
            Verdict::Fail if result.result().is_timeout() => ("TIMEOUT", self.styles.fail),
            Verdict::Fail => ("FAIL", self.styles.fail),
            Verdict::InfrastructureError => ("INFRA", self.styles.infra),
        }
    }

    fn write_status_line(
        &self,
        writer: &mut impl Write,
        status: &str,
        style: Style,
        duration: Duration,
        name: &str,
        detail: Option<&str>,
    ) -> std::io::Result<()> {
        write!(
            writer,
            "{:>12} {} {}",
            status.style(style),
            format_duration(duration),
            name.style(self.styles.label),
        )?;
        match detail {
            Some(detail) => writeln!(writer, ": {detail}"),
            None => writeln!(writer),
        }
    }

    fn write_output(
        &self,
        writer: &mut impl Write,
        name: &str,
        result: &InvocationResult,
    ) -> std::io::Result<()> {
        let output = result.output();
        for (stream, bytes) in [("STDOUT", &output.stdout), ("STDERR", &output.stderr)] {
            let Some(bytes) = bytes else { continue };
            if bytes.is_empty() {
                continue;
            }
            let header = format!("--- {stream}: {name} ---");
            writeln!(writer, "\n{}", header.style(self.styles.marker))?;
            writer.write_all(bytes)?;
            if !bytes.ends_with(b"\n") {
                writeln!(writer)?;
            }
        }
        Ok(())
    }

    fn write_summary(&self, writer: &mut impl Write, outcome: &TestOutcome) -> std::io::Result<()> {
        let counts = VerdictCounts::new(outcome.results().iter().map(InvocationResult::verdict));
        writeln!(writer, "{}", "-".repeat(12))?;
        write!(
            writer,
            "{:>12} {} ",
            "Summary".style(self.styles.count),
            format_duration(outcome.duration()),
        )?;
        if outcome.setup_error().is_some() {
            writeln!(writer, "setup failed, no shards run")
        } else {
            writeln!(writer, "{}", counts.display(&self.styles))
        }
    }
}

fn shard_name(label: &str, result: &InvocationResult) -> String {
    let slot = result.slot();
    if slot.is_sharded() {
        format!("{label} ({slot})")
    } else {
        label.to_owned()
    }
}

fn format_duration(duration: Duration) -> String {
    format!("[{:>8.3}s]", duration.as_secs_f64())
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct VerdictCounts {
    passed: usize,
    failed: usize,
    infra: usize,
}

impl VerdictCounts {
    fn new(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        let mut counts = Self::default();
        for verdict in verdicts {
            match verdict {
                Verdict::Pass => counts.passed += 1,
                Verdict::Fail => counts.failed += 1,
                Verdict::InfrastructureError => counts.infra += 1,
            }
        }
        counts
    }

    fn total(&self) -> usize {
        self.passed + self.failed + self.infra
    }

    fn display(&self, styles: &StdoutStyles) -> String {
        let total = self.total();
        let mut out = format!(
            "{} {} run: {} passed",
            total.style(styles.count),
            testwrap_runner::helpers::plural::shards_str(total),
            self.passed.style(styles.pass),
        );
        if self.failed > 0 {
            let _ = write!(out, ", {} failed", self.failed.style(styles.fail));
        }
        if self.infra > 0 {
            let noun = if self.infra == 1 {
                "infrastructure error"
            } else {
                "infrastructure errors"
            };
            let _ = write!(out, ", {} {noun}", self.infra.style(styles.infra));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_display() {
        let styles = StdoutStyles::default();
        let counts = VerdictCounts::new([Verdict::Pass]);
        assert_eq!(counts.display(&styles), "1 shard run: 1 passed");

        let counts = VerdictCounts::new([
            Verdict::Pass,
            Verdict::Fail,
            Verdict::InfrastructureError,
            Verdict::Fail,
        ]);
        assert_eq!(
            counts,
            VerdictCounts {
                passed: 1,
                failed: 2,
                infra: 1
            }
        );
        assert_eq!(
            counts.display(&styles),
            "4 shards run: 1 passed, 2 failed, 1 infrastructure error"
        );
    }

    #[test]
    fn output_display() {
        assert!(!TestOutputDisplay::Summary.shows(Verdict::Fail));
        assert!(!TestOutputDisplay::Errors.shows(Verdict::Pass));
        assert!(TestOutputDisplay::Errors.shows(Verdict::InfrastructureError));
        assert!(TestOutputDisplay::All.shows(Verdict::Pass));
    }

    #[test]
    fn duration_format() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "[   1.500s]");
    }
}
