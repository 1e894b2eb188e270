// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// The machine-readable summary of one `testwrap run`, printed with `--message-format json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutcomeSummary {
    /// The label of the target, if one was given.
    pub target: Option<String>,

    /// The aggregated verdict.
    pub verdict: VerdictSummary,

    /// The process exit code `testwrap` exits with.
    pub exit_code: i32,

    /// The time at which the run started, in RFC 3339 format.
    pub start_time: String,

    /// The total wall-clock duration of the run, in seconds.
    pub duration_secs: f64,

    /// An error that happened before any shard was launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,

    /// Per-shard results, ordered by shard index.
    pub shards: Vec<ShardSummary>,
}

/// The machine-readable summary of one shard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ShardSummary {
    /// The 0-based shard index.
    pub index: u32,

    /// The total number of shards.
    pub total: u32,

    /// The verdict of this shard.
    pub verdict: VerdictSummary,

    /// A short description of how the process finished, e.g. `exit code 1` or `timed out`.
    pub result: String,

    /// The exit code of the process, if it exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// The duration of this shard, in seconds.
    pub duration_secs: f64,

    /// Captured standard output, lossily converted to UTF-8.
    pub stdout: String,

    /// Captured standard error, lossily converted to UTF-8.
    pub stderr: String,

    /// The scratch directory for this shard, if it was kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<Utf8PathBuf>,
}

/// A verdict, as serialized in [`OutcomeSummary`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictSummary {
    /// The test passed.
    Pass,

    /// The test failed or timed out.
    Fail,

    /// The wrapper could not run the test correctly.
    InfrastructureError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(VerdictSummary::Pass, "\"pass\""; "pass")]
    #[test_case(VerdictSummary::Fail, "\"fail\""; "fail")]
    #[test_case(VerdictSummary::InfrastructureError, "\"infrastructure-error\""; "infra")]
    fn verdict_serializes_kebab_case(verdict: VerdictSummary, expected: &str) {
        assert_eq!(serde_json::to_string(&verdict).unwrap(), expected);
    }

    #[test]
    fn skips_empty_optional_fields() {
        let summary = OutcomeSummary {
            target: None,
            verdict: VerdictSummary::Pass,
            exit_code: 0,
            start_time: "2024-01-01T00:00:00+00:00".to_owned(),
            duration_secs: 0.5,
            setup_error: None,
            shards: vec![],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("setup-error").is_none());
        assert_eq!(json["exit-code"], 0);
    }
}
