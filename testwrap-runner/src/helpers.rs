// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for testwrap-runner.

use camino::{Utf8Path, Utf8PathBuf};
use std::{io, path::PathBuf};

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "shard" if `count` is 1, otherwise "shards".
    pub fn shards_str(count: usize) -> &'static str {
        if count == 1 { "shard" } else { "shards" }
    }

    /// Returns "runfile" if `count` is 1, otherwise "runfiles".
    pub fn runfiles_str(count: usize) -> &'static str {
        if count == 1 { "runfile" } else { "runfiles" }
    }
}

/// Joins `path` onto `base` if it is relative.
pub(crate) fn absolutize(base: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        base.join(path)
    }
}

/// Canonicalizes a path, returning a UTF-8 path.
///
/// On Windows this avoids `\\?\` verbatim prefixes where possible.
pub(crate) fn canonicalize(path: &Utf8Path) -> io::Result<Result<Utf8PathBuf, PathBuf>> {
    cfg_if::cfg_if! {
        if #[cfg(windows)] {
            let canonical = dunce::canonicalize(path)?;
        } else {
            let canonical = std::fs::canonicalize(path)?;
        }
    }
    Ok(Utf8PathBuf::from_path_buf(canonical))
}

/// Converts an absolute path to the form exported through the environment.
///
/// On Windows, paths are exported in mixed style, with forward slashes.
#[cfg(windows)]
pub(crate) fn env_path(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}

#[cfg(not(windows))]
pub(crate) fn env_path(path: &Utf8Path) -> String {
    path.as_str().to_owned()
}

/// On Windows, convert relative paths to always use forward slashes.
#[cfg(windows)]
pub(crate) fn convert_rel_path_to_forward_slash(rel_path: &Utf8Path) -> Utf8PathBuf {
    if !rel_path.is_relative() {
        panic!("path for conversion to forward slash '{rel_path}' is not relative");
    }
    rel_path.as_str().replace('\\', "/").into()
}

#[cfg(not(windows))]
pub(crate) fn convert_rel_path_to_forward_slash(rel_path: &Utf8Path) -> Utf8PathBuf {
    rel_path.to_path_buf()
}

#[cfg(unix)]
pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    // These signal numbers are the same on at least Linux, macOS, FreeBSD and illumos.
    match signal {
        1 => Some("HUP"),
        2 => Some("INT"),
        3 => Some("QUIT"),
        4 => Some("ILL"),
        5 => Some("TRAP"),
        6 => Some("ABRT"),
        8 => Some("FPE"),
        9 => Some("KILL"),
        11 => Some("SEGV"),
        13 => Some("PIPE"),
        14 => Some("ALRM"),
        15 => Some("TERM"),
        _ => None,
    }
}
