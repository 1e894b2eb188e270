// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::RunfilesManifest;
use crate::errors::RunfilesError;
use camino::Utf8Path;
use std::io;

/// Mirrors every manifest entry under `root`.
///
/// On Unix, entries are symlinks to their real paths, falling back to copies if symlinking
/// fails. On Windows, entries are always copied.
pub(super) fn materialize(
    root: &Utf8Path,
    manifest: &RunfilesManifest,
) -> Result<(), RunfilesError> {
    for (logical, real) in manifest.iter() {
        let dest = root.join(logical);
        let res = match dest.parent() {
            Some(parent) => std::fs::create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| link_or_copy(real, &dest));

        res.map_err(|error| RunfilesError::Materialize {
            logical_path: logical.to_owned(),
            dest,
            error,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn link_or_copy(real: &Utf8Path, dest: &Utf8Path) -> io::Result<()> {
    match std::os::unix::fs::symlink(real, dest) {
        Ok(()) => Ok(()),
        Err(error) => {
            tracing::debug!("symlinking {dest} -> {real} failed ({error}), copying instead");
            copy_recursive(real, dest)
        }
    }
}

#[cfg(windows)]
fn link_or_copy(real: &Utf8Path, dest: &Utf8Path) -> io::Result<()> {
    copy_recursive(real, dest)
}

fn copy_recursive(src: &Utf8Path, dest: &Utf8Path) -> io::Result<()> {
    if !src.is_dir() {
        std::fs::copy(src, dest)?;
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir entries are under the root");
        let target = dest.as_std_path().join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
