// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolution of runtime data dependencies ("runfiles").
//!
//! A test declares the files it needs at runtime as a list of [`RuntimeDependency`] values,
//! each mapping a *logical path* (the path the test uses to look the file up) to a *source
//! path* on disk. [`RunfilesResolver::resolve`] turns that list into a [`ResolvedRunfiles`]:
//! a fresh runfiles root that always holds a `MANIFEST` file, and, under
//! [`ResolutionPolicy::MaterializedTree`], a directory tree mirroring every logical path.

mod manifest;
mod tree;

pub use manifest::*;

use crate::{
    errors::{ResolutionPolicyParseError, RuntimeDependencyParseError, RunfilesError},
    helpers::{absolutize, canonicalize, plural},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, str::FromStr};
use tracing::debug;

/// A runtime data dependency of a test: a logical path and the file or directory it maps to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuntimeDependency {
    logical_path: String,
    source_path: Utf8PathBuf,
}

impl RuntimeDependency {
    /// Creates a new runtime dependency.
    ///
    /// Backslashes in `logical_path` are converted to forward slashes, and a leading `./` is
    /// removed. The logical path is validated at resolution time.
    pub fn new(logical_path: impl AsRef<str>, source_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            logical_path: normalize_logical_path(logical_path.as_ref()),
            source_path: source_path.into(),
        }
    }

    /// Returns the logical path.
    pub fn logical_path(&self) -> &str {
        &self.logical_path
    }

    /// Returns the source path, as declared.
    pub fn source_path(&self) -> &Utf8Path {
        &self.source_path
    }
}

/// Parses `LOGICAL=SOURCE`, or `SOURCE` on its own, in which case the logical path is the
/// source path.
impl FromStr for RuntimeDependency {
    type Err = RuntimeDependencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (logical, source) = match s.split_once('=') {
            Some((logical, source)) => (logical, source),
            None => (s, s),
        };
        if logical.is_empty() || source.is_empty() {
            return Err(RuntimeDependencyParseError::new(s));
        }
        Ok(Self::new(logical, source))
    }
}

/// How runfiles are made available to a test.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResolutionPolicy {
    /// Only a manifest is written. Tests look runfiles up through `RUNFILES_MANIFEST_FILE`.
    #[default]
    #[serde(rename = "manifest-only")]
    ManifestOnly,

    /// A tree mirroring each logical path is created next to the manifest.
    #[serde(rename = "tree")]
    MaterializedTree,
}

impl ResolutionPolicy {
    /// Returns the string used for this policy in config files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManifestOnly => "manifest-only",
            Self::MaterializedTree => "tree",
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = ResolutionPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manifest-only" => Ok(Self::ManifestOnly),
            "tree" => Ok(Self::MaterializedTree),
            other => Err(ResolutionPolicyParseError::new(other)),
        }
    }
}

/// Resolves runtime dependencies into a runfiles root.
#[derive(Clone, Debug)]
pub struct RunfilesResolver {
    base_dir: Utf8PathBuf,
    temp_parent: Option<Utf8PathBuf>,
}

impl RunfilesResolver {
    /// Creates a new resolver. Relative source paths are resolved against `base_dir`.
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            temp_parent: None,
        }
    }

    /// Creates runfiles roots inside `dir` rather than the system temporary directory.
    pub fn with_temp_parent(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.temp_parent = Some(dir.into());
        self
    }

    /// Returns the directory relative source paths are resolved against.
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Resolves `dependencies` into a fresh runfiles root.
    ///
    /// Manifest lines are written in input order. Nothing is launched if this fails.
    pub fn resolve(
        &self,
        dependencies: &[RuntimeDependency],
        policy: ResolutionPolicy,
    ) -> Result<ResolvedRunfiles, RunfilesError> {
        let mut manifest = RunfilesManifest::new();
        for dep in dependencies {
            validate_logical_path(dep.logical_path()).map_err(|reason| {
                RunfilesError::InvalidLogicalPath {
                    logical_path: dep.logical_path().to_owned(),
                    reason,
                }
            })?;

            let source_path = absolutize(&self.base_dir, dep.source_path());
            let real_path = match canonicalize(&source_path) {
                Ok(Ok(path)) => path,
                Ok(Err(path)) => return Err(RunfilesError::NonUtf8Path { path }),
                Err(error) => {
                    return Err(RunfilesError::MissingDependency {
                        logical_path: dep.logical_path().to_owned(),
                        source_path,
                        error,
                    });
                }
            };
            manifest.insert(dep.logical_path().to_owned(), real_path)?;
        }

        if policy == ResolutionPolicy::MaterializedTree {
            check_conflicts(&manifest)?;
        }

        let mut builder = camino_tempfile::Builder::new();
        builder.prefix("testwrap-runfiles-");
        let root = match &self.temp_parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(RunfilesError::RunfilesRootCreate)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(RunfilesError::RunfilesRootCreate)?;

        let tree_root = match policy {
            ResolutionPolicy::ManifestOnly => None,
            ResolutionPolicy::MaterializedTree => {
                tree::materialize(root.path(), &manifest)?;
                Some(root.path().to_owned())
            }
        };

        let manifest_path = root.path().join(RunfilesManifest::FILE_NAME);
        manifest.write_to_file(&manifest_path)?;

        debug!(
            root = %root.path(),
            %policy,
            "resolved {} {}",
            manifest.len(),
            plural::runfiles_str(manifest.len()),
        );

        Ok(ResolvedRunfiles {
            root,
            manifest,
            manifest_path,
            tree_root,
        })
    }
}

/// The result of resolving runfiles for a target.
///
/// Owns the runfiles root: dropping this value removes the directory. The manifest and tree
/// are read-only once created, and shared by every shard of the target.
#[derive(Debug)]
pub struct ResolvedRunfiles {
    root: Utf8TempDir,
    manifest: RunfilesManifest,
    manifest_path: Utf8PathBuf,
    tree_root: Option<Utf8PathBuf>,
}

impl ResolvedRunfiles {
    /// Returns the runfiles root, which always contains the manifest.
    pub fn root(&self) -> &Utf8Path {
        self.root.path()
    }

    /// Returns the manifest.
    pub fn manifest(&self) -> &RunfilesManifest {
        &self.manifest
    }

    /// Returns the path of the manifest file.
    pub fn manifest_path(&self) -> &Utf8Path {
        &self.manifest_path
    }

    /// Returns the root of the materialized tree, if one was created.
    pub fn tree_root(&self) -> Option<&Utf8Path> {
        self.tree_root.as_deref()
    }

    /// Returns the policy these runfiles were resolved with.
    pub fn policy(&self) -> ResolutionPolicy {
        if self.tree_root.is_some() {
            ResolutionPolicy::MaterializedTree
        } else {
            ResolutionPolicy::ManifestOnly
        }
    }

    /// Looks up the real path of a logical path.
    pub fn rlocation(&self, logical_path: &str) -> Option<&Utf8Path> {
        self.manifest.rlocation(logical_path)
    }

    /// Persists the runfiles root past the lifetime of this value, returning its path.
    pub fn keep(self) -> Utf8PathBuf {
        self.root.keep()
    }
}

pub(crate) fn normalize_logical_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.strip_prefix("./") {
        Some(rest) => rest.to_owned(),
        None => path,
    }
}

fn validate_logical_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("logical path is empty");
    }
    if path.starts_with('/') || path.as_bytes().get(1) == Some(&b':') {
        return Err("logical path must be relative");
    }
    if path.chars().any(char::is_whitespace) {
        return Err("logical path contains whitespace");
    }
    for component in path.split('/') {
        match component {
            "" => return Err("logical path contains an empty component"),
            "." | ".." => return Err("logical path contains a `.` or `..` component"),
            _ => {}
        }
    }
    // The manifest lives at the runfiles root, next to the tree.
    if path.split('/').next() == Some(RunfilesManifest::FILE_NAME) {
        return Err("logical path is reserved for the manifest");
    }
    Ok(())
}

/// A tree can't hold both `a` and `a/b`, since `a` would have to be a file and a directory.
fn check_conflicts(manifest: &RunfilesManifest) -> Result<(), RunfilesError> {
    let all: HashSet<&str> = manifest.iter().map(|(logical, _)| logical).collect();
    for (logical, _) in manifest.iter() {
        for (idx, _) in logical.match_indices('/') {
            let parent = &logical[..idx];
            if all.contains(parent) {
                return Err(RunfilesError::ConflictingLogicalPaths {
                    parent: parent.to_owned(),
                    child: logical.to_owned(),
                });
            }
        }
    }
    Ok(())
}
