// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testwrap.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{borrow::Cow, fmt, sync::Arc};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse testwrap config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.err
    }
}

/// The kind of a [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building or deserializing the layered config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// The default profile named in the config does not exist.
    #[error("default profile `{0}` is not defined")]
    DefaultProfileNotFound(String),

    /// `max-concurrent-shards` was set to zero.
    #[error("profile `{profile}`: max-concurrent-shards must be at least 1")]
    ZeroConcurrency {
        /// The profile with the invalid value.
        profile: String,
    },
}

/// An error which indicates that a profile was requested but not known to testwrap.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurs while parsing a [`ShardTotal`](crate::shard::ShardTotal).
#[derive(Clone, Debug, Error)]
#[error("invalid shard count `{input}`: {message}")]
pub struct ShardTotalParseError {
    input: String,
    message: Cow<'static, str>,
}

impl ShardTotalParseError {
    pub(crate) fn new(input: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// An error that occurs while parsing a
/// [`RuntimeDependency`](crate::runfiles::RuntimeDependency) from a string.
#[derive(Clone, Debug, Error)]
#[error("invalid runtime dependency `{input}`: expected LOGICAL=SOURCE or SOURCE")]
pub struct RuntimeDependencyParseError {
    input: String,
}

impl RuntimeDependencyParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while parsing a [`TestEnvEntry`](crate::target::TestEnvEntry).
#[derive(Clone, Debug, Error)]
#[error("invalid test environment entry `{input}`: {message}")]
pub struct TestEnvParseError {
    input: String,
    message: &'static str,
}

impl TestEnvParseError {
    pub(crate) fn new(input: impl Into<String>, message: &'static str) -> Self {
        Self {
            input: input.into(),
            message,
        }
    }
}

/// An error that occurs while parsing a
/// [`ResolutionPolicy`](crate::runfiles::ResolutionPolicy) from a string.
#[derive(Clone, Debug, Error)]
#[error("unrecognized runfiles policy `{input}` (known values: manifest-only, tree)")]
pub struct ResolutionPolicyParseError {
    input: String,
}

impl ResolutionPolicyParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while resolving runfiles.
///
/// Every variant is fatal for the target: no test process is launched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunfilesError {
    /// A declared runtime dependency's source path does not exist.
    #[error("runtime dependency `{logical_path}` is missing: `{source_path}` does not exist")]
    MissingDependency {
        /// The logical path of the dependency.
        logical_path: String,

        /// The source path that was checked.
        source_path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A logical path is malformed.
    #[error("invalid logical path `{logical_path}`: {reason}")]
    InvalidLogicalPath {
        /// The logical path.
        logical_path: String,

        /// Why the logical path was rejected.
        reason: &'static str,
    },

    /// The same logical path was declared more than once.
    #[error("logical path `{logical_path}` was declared more than once")]
    DuplicateLogicalPath {
        /// The logical path.
        logical_path: String,
    },

    /// One logical path is a parent of another, so a tree can't be materialized.
    #[error("logical path `{parent}` is a parent of `{child}`, so a runfiles tree can't hold both")]
    ConflictingLogicalPaths {
        /// The parent path.
        parent: String,

        /// The child path.
        child: String,
    },

    /// A path was not valid UTF-8.
    #[error("path `{}` is not valid UTF-8", path.display())]
    NonUtf8Path {
        /// The path.
        path: std::path::PathBuf,
    },

    /// The runfiles root could not be created.
    #[error("failed to create runfiles root")]
    RunfilesRootCreate(#[source] std::io::Error),

    /// The manifest file could not be written.
    #[error("failed to write runfiles manifest to `{path}`")]
    ManifestWrite {
        /// The manifest path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// An entry of the runfiles tree could not be created.
    #[error("failed to materialize runfile `{logical_path}` at `{dest}`")]
    Materialize {
        /// The logical path being materialized.
        logical_path: String,

        /// The destination in the tree.
        dest: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while reading a runfiles manifest.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestParseError {
    /// The manifest could not be read.
    #[error("failed to read manifest `{path}`")]
    Read {
        /// The manifest path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A line does not contain the space separating the logical and real paths.
    #[error("line {line_number}: expected `<logical-path> <real-path>`, found `{line}`")]
    MissingSeparator {
        /// The 1-based line number.
        line_number: usize,

        /// The line contents.
        line: String,
    },

    /// A logical path appears twice.
    #[error("line {line_number}: logical path `{logical_path}` appears more than once")]
    Duplicate {
        /// The 1-based line number.
        line_number: usize,

        /// The logical path.
        logical_path: String,
    },
}

/// An error that occurred while setting up the environment of a test invocation.
///
/// Every variant is fatal for the invocation, and is reported as an infrastructure error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvironmentConstructionError {
    /// A scratch directory could not be created.
    #[error("failed to create scratch directory `{path}`")]
    ScratchCreate {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A report left in the logs directory by an earlier run could not be removed.
    #[error("failed to remove `{path}` left by an earlier run")]
    StaleReportRemove {
        /// The file or directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A path that must be absolute was relative.
    #[error("value of {name} (`{path}`) is not an absolute path")]
    NotAbsolute {
        /// The environment variable.
        name: &'static str,

        /// The path.
        path: Utf8PathBuf,
    },

    /// A directory that must exist does not.
    #[error("value of {name} (`{path}`) is not an existing directory")]
    MissingDirectory {
        /// The environment variable.
        name: &'static str,

        /// The path.
        path: Utf8PathBuf,
    },

    /// The identity of the invoking user could not be determined.
    #[error("failed to determine the invoking user's name")]
    UserName(#[source] whoami::Error),
}

/// An error that occurred while starting a child process.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ChildStartError {
    /// The environment could not be set up, so the process was not started.
    #[error("failed to set up the test environment")]
    Environment(#[source] Arc<EnvironmentConstructionError>),

    /// An error occurred while spawning the child process.
    #[error("failed to spawn test process")]
    Spawn(#[source] Arc<std::io::Error>),

    /// The task running this shard panicked.
    #[error("the task running this shard panicked")]
    TaskPanicked,
}

/// An error that occurred while reading from child file descriptors or waiting for the child.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ChildFdError {
    /// An error occurred while reading standard output.
    #[error("error reading standard output")]
    ReadStdout(#[source] Arc<std::io::Error>),

    /// An error occurred while reading standard error.
    #[error("error reading standard error")]
    ReadStderr(#[source] Arc<std::io::Error>),

    /// An error occurred while waiting for the child process to exit.
    #[error("error waiting for child process to exit")]
    Wait(#[source] Arc<std::io::Error>),
}

/// An error that occurred while writing a report after the test finished.
///
/// Report errors never change a verdict: they are attached to the result and logged.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ReportWriteError {
    /// An error occurred while operating on the file system.
    #[error("error operating on path `{file}`")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: Arc<std::io::Error>,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to `{file}`")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: Arc<quick_junit::SerializeError>,
    },
}

/// An error that occurred before any shard of a target was launched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetupError {
    /// Runfiles resolution failed.
    #[error("failed to resolve runfiles")]
    Runfiles(#[from] RunfilesError),
}

/// An error that occurred while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// The exec root could not be determined.
    #[error("failed to determine exec root")]
    ExecRoot(#[source] std::io::Error),

    /// The exec root is not valid UTF-8.
    #[error("exec root `{}` is not valid UTF-8", path.display())]
    ExecRootNonUtf8 {
        /// The path.
        path: std::path::PathBuf,
    },
}

/// Displays an error along with all of its sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        let mut source = self.error.source();
        while let Some(error) = source {
            write!(f, "\n  caused by: {error}")?;
            source = error.source();
        }
        Ok(())
    }
}
