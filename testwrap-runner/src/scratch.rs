// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-invocation scratch directories and output paths.
//!
//! Each shard gets its own scratch directory:
//!
//! ```text
//! <scratch root>/testwrap-<random>/
//!   tmp/                     TEST_TMPDIR, the working directory of the test
//!   shard/status             TEST_SHARD_STATUS_FILE (only the parent is created)
//!   logs/                    reports, unless a logs directory was given
//!   annotations/             TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR, if requested
//!   infrastructure_failure   TEST_INFRASTRUCTURE_FAILURE_FILE (not created)
//!   premature_exit           TEST_PREMATURE_EXIT_FILE (not created)
//! ```
//!
//! Reports go to the scratch `logs/` directory, or to `<logs dir>/` for an unsharded target
//! and `<logs dir>/shard_<i+1>_of_<N>/` for a sharded one.

use crate::{
    errors::EnvironmentConstructionError,
    shard::{ShardSlot, ShardStatusChannel},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use tracing::debug;

/// Files and directories a run leaves in its logs directory.
const REPORT_NAMES: [&str; 4] = ["test.xml", "test.log", "test.outputs", "test.outputs_manifest"];

/// The scratch directory of one invocation. Removed on drop unless kept.
#[derive(Debug)]
pub struct ScratchDirs {
    dir: Utf8TempDir,
    tmp_dir: Utf8PathBuf,
    status: ShardStatusChannel,
    infrastructure_failure_file: Utf8PathBuf,
    premature_exit_file: Utf8PathBuf,
    outputs: ShardOutputPaths,
}

impl ScratchDirs {
    /// Creates the scratch layout for `slot`.
    ///
    /// If `scratch_root` is `None`, the system temporary directory is used.
    pub fn create(
        scratch_root: Option<&Utf8Path>,
        slot: ShardSlot,
        logs_dir: Option<&Utf8Path>,
        undeclared_outputs: bool,
    ) -> Result<Self, EnvironmentConstructionError> {
        let mut builder = camino_tempfile::Builder::new();
        builder.prefix("testwrap-");
        let dir = match scratch_root {
            Some(root) => {
                create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|error| EnvironmentConstructionError::ScratchCreate {
            path: scratch_root
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| std::env::temp_dir().to_string_lossy().into_owned().into()),
            error,
        })?;

        let root = dir.path();
        let tmp_dir = root.join("tmp");
        create_dir_all(&tmp_dir)?;

        let status_dir = root.join("shard");
        let status = ShardStatusChannel::prepare(status_dir.clone()).map_err(|error| {
            EnvironmentConstructionError::ScratchCreate {
                path: status_dir,
                error,
            }
        })?;

        let output_dir = match logs_dir {
            Some(logs_dir) if slot.is_sharded() => logs_dir.join(slot.logs_dir_name()),
            Some(logs_dir) => logs_dir.to_owned(),
            None => root.join("logs"),
        };
        create_dir_all(&output_dir)?;
        if logs_dir.is_some() {
            for name in REPORT_NAMES {
                remove_stale(&output_dir.join(name))?;
            }
        }

        let undeclared = if undeclared_outputs {
            let paths = UndeclaredOutputPaths {
                dir: output_dir.join("test.outputs"),
                annotations_dir: root.join("annotations"),
                manifest_file: output_dir.join("test.outputs_manifest").join("MANIFEST"),
                annotations_file: output_dir.join("test.outputs_manifest").join("ANNOTATIONS"),
            };
            create_dir_all(&paths.dir)?;
            create_dir_all(&paths.annotations_dir)?;
            Some(paths)
        } else {
            None
        };

        let outputs = ShardOutputPaths {
            xml_file: output_dir.join("test.xml"),
            log_file: output_dir.join("test.log"),
            dir: output_dir,
            undeclared,
        };

        Ok(Self {
            tmp_dir,
            status,
            infrastructure_failure_file: root.join("infrastructure_failure"),
            premature_exit_file: root.join("premature_exit"),
            outputs,
            dir,
        })
    }

    /// Returns the scratch directory itself.
    pub fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// Returns the per-invocation temporary directory, also the test's working directory.
    pub fn tmp_dir(&self) -> &Utf8Path {
        &self.tmp_dir
    }

    /// Returns the shard status channel.
    pub fn status(&self) -> &ShardStatusChannel {
        &self.status
    }

    /// Returns the path a test writes an infrastructure failure reason to.
    pub fn infrastructure_failure_file(&self) -> &Utf8Path {
        &self.infrastructure_failure_file
    }

    /// Returns the path a test framework creates at startup and removes on orderly exit.
    pub fn premature_exit_file(&self) -> &Utf8Path {
        &self.premature_exit_file
    }

    /// Returns the paths reports are written to.
    pub fn outputs(&self) -> &ShardOutputPaths {
        &self.outputs
    }

    /// Persists the scratch directory past the lifetime of this value, returning its path.
    pub fn keep(self) -> Utf8PathBuf {
        self.dir.keep()
    }
}

/// Where a shard's reports are written.
#[derive(Clone, Debug)]
pub struct ShardOutputPaths {
    dir: Utf8PathBuf,
    xml_file: Utf8PathBuf,
    log_file: Utf8PathBuf,
    undeclared: Option<UndeclaredOutputPaths>,
}

impl ShardOutputPaths {
    /// Returns the directory holding this shard's reports.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the path of the JUnit XML report, exported as `XML_OUTPUT_FILE`.
    pub fn xml_file(&self) -> &Utf8Path {
        &self.xml_file
    }

    /// Returns the path of the test log.
    pub fn log_file(&self) -> &Utf8Path {
        &self.log_file
    }

    /// Returns undeclared output paths, if undeclared outputs were requested.
    pub fn undeclared(&self) -> Option<&UndeclaredOutputPaths> {
        self.undeclared.as_ref()
    }
}

/// Paths used for undeclared outputs.
#[derive(Clone, Debug)]
pub struct UndeclaredOutputPaths {
    dir: Utf8PathBuf,
    annotations_dir: Utf8PathBuf,
    manifest_file: Utf8PathBuf,
    annotations_file: Utf8PathBuf,
}

impl UndeclaredOutputPaths {
    /// The directory the test writes undeclared outputs to.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// The directory the test writes `*.part` annotation files to.
    pub fn annotations_dir(&self) -> &Utf8Path {
        &self.annotations_dir
    }

    /// The outputs manifest written after the test exits.
    pub fn manifest_file(&self) -> &Utf8Path {
        &self.manifest_file
    }

    /// The concatenated annotations written after the test exits.
    pub fn annotations_file(&self) -> &Utf8Path {
        &self.annotations_file
    }
}

/// Removes a report left behind by an earlier run into the same logs directory.
fn remove_stale(path: &Utf8Path) -> Result<(), EnvironmentConstructionError> {
    let res = match path.symlink_metadata() {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(error) => Err(error),
    };
    match res {
        Ok(()) => {
            debug!(%path, "removed report from an earlier run");
            Ok(())
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(EnvironmentConstructionError::StaleReportRemove {
            path: path.to_owned(),
            error,
        }),
    }
}

fn create_dir_all(path: &Utf8Path) -> Result<(), EnvironmentConstructionError> {
    std::fs::create_dir_all(path).map_err(|error| EnvironmentConstructionError::ScratchCreate {
        path: path.to_owned(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::ShardTotal;

    #[test]
    fn unsharded_layout() {
        let root = camino_tempfile::tempdir().unwrap();
        let scratch = ScratchDirs::create(Some(root.path()), ShardSlot::UNSHARDED, None, false)
            .expect("scratch created");

        assert!(scratch.root().starts_with(root.path()));
        assert!(scratch.tmp_dir().is_dir());
        assert!(scratch.status().path().parent().unwrap().is_dir());
        assert!(!scratch.status().path().exists());
        assert!(!scratch.infrastructure_failure_file().exists());
        assert!(!scratch.premature_exit_file().exists());
        assert_eq!(scratch.outputs().dir(), scratch.root().join("logs"));
        assert!(scratch.outputs().dir().is_dir());
        assert!(scratch.outputs().undeclared().is_none());

        let path = scratch.root().to_owned();
        drop(scratch);
        assert!(!path.exists(), "scratch removed on drop");
    }

    #[test]
    fn sharded_logs_dir_layout() {
        let root = camino_tempfile::tempdir().unwrap();
        let logs = root.path().join("testlogs");
        let slot = ShardSlot::new(1, ShardTotal::new(2).unwrap());
        let scratch =
            ScratchDirs::create(Some(root.path()), slot, Some(&logs), true).expect("created");

        let outputs = scratch.outputs();
        assert_eq!(outputs.dir(), logs.join("shard_2_of_2"));
        assert_eq!(outputs.xml_file(), logs.join("shard_2_of_2/test.xml"));
        let undeclared = outputs.undeclared().expect("undeclared outputs requested");
        assert!(undeclared.dir().is_dir());
        assert!(undeclared.annotations_dir().is_dir());
        assert_eq!(
            undeclared.manifest_file(),
            logs.join("shard_2_of_2/test.outputs_manifest/MANIFEST")
        );

        let kept = scratch.keep();
        assert!(kept.is_dir(), "kept scratch survives");
    }

    #[test]
    fn earlier_reports_removed() {
        let root = camino_tempfile::tempdir().unwrap();
        let logs = root.path().join("testlogs");
        std::fs::create_dir_all(logs.join("test.outputs/nested")).unwrap();
        std::fs::create_dir_all(logs.join("test.outputs_manifest")).unwrap();
        std::fs::write(logs.join("test.xml"), "<testsuites/>").unwrap();
        std::fs::write(logs.join("test.log"), "old log").unwrap();
        std::fs::write(logs.join("test.outputs/nested/old.txt"), "old").unwrap();
        std::fs::write(logs.join("test.outputs_manifest/MANIFEST"), "old.txt\t3\n").unwrap();
        std::fs::write(logs.join("unrelated.txt"), "kept").unwrap();

        let scratch =
            ScratchDirs::create(Some(root.path()), ShardSlot::UNSHARDED, Some(&logs), false)
                .expect("created");

        assert!(!scratch.outputs().xml_file().exists());
        assert!(!scratch.outputs().log_file().exists());
        assert!(!logs.join("test.outputs").exists());
        assert!(!logs.join("test.outputs_manifest").exists());
        assert!(logs.join("unrelated.txt").is_file());
    }
}
