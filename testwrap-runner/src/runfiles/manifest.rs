// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{ManifestParseError, RunfilesError};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, map::Entry};
use std::io::Write;

/// A mapping from logical runfiles paths to real paths on disk.
///
/// The on-disk format is one entry per line, `<logical-path> <real-path>`, with no header.
/// Lines are written in insertion order, but lookups are by logical path only. Real paths may
/// contain spaces, so readers split each line on the first space.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunfilesManifest {
    entries: IndexMap<String, Utf8PathBuf>,
}

impl RunfilesManifest {
    /// The name of the manifest file inside a runfiles root.
    pub const FILE_NAME: &'static str = "MANIFEST";

    /// Creates a new, empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a manifest from its textual representation.
    ///
    /// Blank lines are ignored. A trailing `\r` is stripped from each line.
    pub fn parse(input: &str) -> Result<Self, ManifestParseError> {
        let mut entries = IndexMap::new();
        for (idx, line) in input.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let line_number = idx + 1;
            let Some((logical, real)) = line.split_once(' ') else {
                return Err(ManifestParseError::MissingSeparator {
                    line_number,
                    line: line.to_owned(),
                });
            };
            match entries.entry(logical.to_owned()) {
                Entry::Vacant(entry) => {
                    entry.insert(Utf8PathBuf::from(real));
                }
                Entry::Occupied(entry) => {
                    return Err(ManifestParseError::Duplicate {
                        line_number,
                        logical_path: entry.key().clone(),
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    /// Reads and parses the manifest at `path`.
    pub fn read(path: &Utf8Path) -> Result<Self, ManifestParseError> {
        let contents = std::fs::read_to_string(path).map_err(|error| ManifestParseError::Read {
            path: path.to_owned(),
            error,
        })?;
        Self::parse(&contents)
    }

    /// Returns the real path for a logical path, if present.
    ///
    /// A leading `./` on `logical_path` is ignored.
    pub fn rlocation(&self, logical_path: &str) -> Option<&Utf8Path> {
        let logical_path = logical_path.strip_prefix("./").unwrap_or(logical_path);
        self.entries.get(logical_path).map(|path| path.as_path())
    }

    /// Returns true if the manifest has an entry for this logical path.
    pub fn contains(&self, logical_path: &str) -> bool {
        self.entries.contains_key(logical_path)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(logical path, real path)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Utf8Path)> + '_ {
        self.entries
            .iter()
            .map(|(logical, real)| (logical.as_str(), real.as_path()))
    }

    /// Writes out this manifest in the on-disk format.
    pub fn write(&self, mut writer: impl Write) -> std::io::Result<()> {
        for (logical, real) in &self.entries {
            writeln!(writer, "{logical} {real}")?;
        }
        Ok(())
    }

    /// Writes this manifest to `path` atomically.
    pub(crate) fn write_to_file(&self, path: &Utf8Path) -> Result<(), RunfilesError> {
        let file = atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite);
        file.write(|f| self.write(std::io::BufWriter::new(f)))
            .map_err(|error| RunfilesError::ManifestWrite {
                path: path.to_owned(),
                error: error.into(),
            })
    }

    pub(crate) fn insert(
        &mut self,
        logical_path: String,
        real_path: Utf8PathBuf,
    ) -> Result<(), RunfilesError> {
        match self.entries.entry(logical_path) {
            Entry::Vacant(entry) => {
                entry.insert(real_path);
                Ok(())
            }
            Entry::Occupied(entry) => Err(RunfilesError::DuplicateLogicalPath {
                logical_path: entry.key().clone(),
            }),
        }
    }
}
