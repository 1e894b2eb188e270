// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, WrapErr};
use std::{os::unix::fs::PermissionsExt, sync::Once, time::Duration};
use testwrap_runner::{
    outcome::{InvocationResult, TestOutcome},
    runner::TestRunnerBuilder,
    target::TestTarget,
};

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().expect("color-eyre installed once");
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// A temporary exec root holding test scripts and data files.
pub(crate) struct ExecRoot {
    dir: Utf8TempDir,
}

impl ExecRoot {
    pub(crate) fn new() -> Result<Self> {
        let dir = camino_tempfile::Builder::new()
            .prefix("testwrap-exec-root-")
            .tempdir()
            .wrap_err("creating exec root")?;
        Ok(Self { dir })
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn scratch_root(&self) -> Utf8PathBuf {
        self.path().join("scratch")
    }

    pub(crate) fn logs_dir(&self) -> Utf8PathBuf {
        self.path().join("testlogs")
    }

    /// Writes a `/bin/sh` script at `rel_path` and makes it executable.
    pub(crate) fn write_script(&self, rel_path: &str, body: &str) -> Result<()> {
        let path = self.write_file(rel_path, &format!("#!/bin/sh\n{body}"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .wrap_err_with(|| format!("making {path} executable"))
    }

    pub(crate) fn write_file(&self, rel_path: &str, contents: &str) -> Result<Utf8PathBuf> {
        let path = self.path().join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| format!("creating {parent}"))?;
        }
        std::fs::write(&path, contents).wrap_err_with(|| format!("writing {path}"))?;
        Ok(path)
    }

    pub(crate) fn runner_builder(&self) -> TestRunnerBuilder {
        let mut builder = TestRunnerBuilder::default();
        builder
            .set_exec_root(self.path())
            .set_scratch_root(self.scratch_root())
            .set_user_name("tester")
            .set_passthrough_env(["PATH"])
            .set_grace_period(Duration::from_millis(200));
        builder
    }

    pub(crate) fn run(&self, target: &TestTarget) -> Result<TestOutcome> {
        let runner = self.runner_builder().build()?;
        Ok(runner.run(target))
    }
}

pub(crate) fn stdout_str(result: &InvocationResult) -> String {
    result
        .output()
        .stdout
        .as_ref()
        .map(|stdout| String::from_utf8_lossy(stdout).into_owned())
        .unwrap_or_default()
}

/// Parses `NAME=VALUE` lines printed by `env`.
pub(crate) fn parse_env(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect()
}

pub(crate) fn env_value<'a>(env: &'a [(String, String)], name: &str) -> Option<&'a str> {
    env.iter()
        .find(|(n, _)| n == name)
        .map(|(_, value)| value.as_str())
}
