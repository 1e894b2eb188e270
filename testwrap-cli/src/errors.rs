// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use testwrap_metadata::TestWrapExitCode;
use testwrap_runner::errors::*;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that testwrap knows how to report, with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed { err: std::io::Error },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("argument file read error")]
    ArgumentFileReadError {
        arg_name: &'static str,
        file_name: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("argument file parse error")]
    ArgumentFileParseError {
        arg_name: &'static str,
        file_name: Utf8PathBuf,
        line_number: usize,
        #[source]
        err: RuntimeDependencyParseError,
    },
    #[error("test runner build error")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("manifest parse error")]
    ManifestParseError {
        #[from]
        err: ManifestParseError,
    },
    #[error("logical path not found")]
    RlocationNotFound {
        manifest: Utf8PathBuf,
        logical_path: String,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing JSON output")]
    WriteJsonError {
        #[source]
        err: serde_json::Error,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::ArgumentFileReadError { .. }
            | Self::ArgumentFileParseError { .. }
            | Self::TestRunnerBuildError { .. }
            | Self::ManifestParseError { .. } => TestWrapExitCode::SETUP_ERROR,
            Self::RlocationNotFound { .. } => TestWrapExitCode::RLOCATION_NOT_FOUND,
            Self::WriteOutputError { .. } | Self::WriteJsonError { .. } => {
                TestWrapExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse testwrap config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::ArgumentFileReadError {
                arg_name,
                file_name,
                err,
            } => {
                error!(
                    "failed to read `{}` file `{}`",
                    arg_name.style(styles.bold),
                    file_name.style(styles.bold),
                );
                Some(err as &dyn Error)
            }
            Self::ArgumentFileParseError {
                arg_name,
                file_name,
                line_number,
                err,
            } => {
                error!(
                    "failed to parse `{}` file `{}` at line {line_number}",
                    arg_name.style(styles.bold),
                    file_name.style(styles.bold),
                );
                Some(err as &dyn Error)
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::ManifestParseError { err } => {
                error!("failed to parse runfiles manifest");
                Some(err as &dyn Error)
            }
            Self::RlocationNotFound {
                manifest,
                logical_path,
            } => {
                error!(
                    "logical path `{}` not found in manifest `{}`",
                    logical_path.style(styles.bold),
                    manifest.style(styles.bold),
                );
                None
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::WriteJsonError { err } => {
                error!("failed to write JSON output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "  caused by: {}", err);
            next_error = err.source();
        }
    }
}
