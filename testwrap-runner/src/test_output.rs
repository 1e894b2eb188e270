// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Captured output of test processes.

use bytes::Bytes;
use std::borrow::Cow;

/// How a test process's standard output and standard error are handled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CaptureStrategy {
    /// Output is inherited from the wrapper and not captured.
    None,

    /// Standard output and standard error are captured separately. Order and line boundaries
    /// are preserved within each stream, but not across them.
    #[default]
    Split,
}

/// The captured output of a test process, split into standard output and standard error.
///
/// A stream that was not captured is `None`.
#[derive(Clone, Debug, Default)]
pub struct ChildSplitOutput {
    /// Standard output, if captured.
    pub stdout: Option<Bytes>,

    /// Standard error, if captured.
    pub stderr: Option<Bytes>,
}

impl ChildSplitOutput {
    /// Returns standard output as a lossy UTF-8 string.
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        lossy(self.stdout.as_ref())
    }

    /// Returns standard error as a lossy UTF-8 string.
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        lossy(self.stderr.as_ref())
    }

    /// Returns true if nothing was captured on either stream.
    pub fn is_empty(&self) -> bool {
        self.stdout.as_ref().is_none_or(|b| b.is_empty())
            && self.stderr.as_ref().is_none_or(|b| b.is_empty())
    }
}

fn lossy(bytes: Option<&Bytes>) -> Cow<'_, str> {
    match bytes {
        Some(bytes) => String::from_utf8_lossy(bytes),
        None => Cow::Borrowed(""),
    }
}
