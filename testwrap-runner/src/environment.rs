// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Construction of the environment a test process runs in.
//!
//! The child's environment is replaced, not merged: it consists of a configurable set of
//! passthrough variables from the wrapper's own environment, then the explicit test
//! environment, then the variables the wrapper owns. Passthrough and explicit values can never
//! override a wrapper-owned variable; they are dropped with a warning.

use crate::{
    errors::EnvironmentConstructionError,
    helpers::env_path,
    runfiles::ResolvedRunfiles,
    scratch::ScratchDirs,
    shard::TestInvocation,
};
use camino::Utf8Path;
use indexmap::IndexMap;
use testwrap_metadata::env_vars;
use tracing::{debug, warn};

/// Host variables passed through to tests by default.
pub const DEFAULT_PASSTHROUGH_ENV: &[&str] = &[
    "PATH",
    "SYSTEMROOT",
    "SYSTEMDRIVE",
    "COMSPEC",
    "PATHEXT",
    "TMP",
    "TEMP",
    "LANG",
    "LC_ALL",
    "TZ",
];

/// The complete environment of a test process, in insertion order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeEnvironment {
    vars: IndexMap<String, String>,
}

impl RuntimeEnvironment {
    /// Returns the value of a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Returns the value of a path-valued variable.
    pub fn get_path(&self, name: &str) -> Option<&Utf8Path> {
        self.get(name).map(Utf8Path::new)
    }

    /// Returns true if the variable is set.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if no variables are set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RuntimeEnvironment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Builds [`RuntimeEnvironment`]s for test invocations.
#[derive(Clone, Debug)]
pub struct EnvironmentBuilder {
    host_env: IndexMap<String, String>,
    user_name: Option<String>,
}

impl EnvironmentBuilder {
    /// Creates a builder that takes `passthrough` variables from the wrapper's environment.
    pub fn new(passthrough: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self::with_host_env(passthrough, |name| std::env::var(name).ok())
    }

    /// Creates a builder that looks host variables up with `lookup`.
    pub fn with_host_env(
        passthrough: impl IntoIterator<Item = impl AsRef<str>>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let host_env = passthrough
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                lookup(name).map(|value| (name.to_owned(), value))
            })
            .collect();
        Self {
            host_env,
            user_name: None,
        }
    }

    /// Uses `user_name` for `USER` instead of asking the operating system.
    pub fn set_user_name(&mut self, user_name: impl Into<String>) -> &mut Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// Builds the environment for `invocation`.
    ///
    /// This has no side effects: every directory referenced must already exist.
    pub fn build(
        &self,
        invocation: &TestInvocation,
        runfiles: &ResolvedRunfiles,
        scratch: &ScratchDirs,
    ) -> Result<RuntimeEnvironment, EnvironmentConstructionError> {
        let target = invocation.target();
        let mut vars = IndexMap::new();

        for (name, value) in &self.host_env {
            insert_external(&mut vars, name, value, "passthrough");
        }
        for (name, value) in &target.test_env {
            insert_external(&mut vars, name, value, "test environment");
        }

        let mut env = EnvWriter { vars };

        // An explicit non-empty USER wins; otherwise ask the OS.
        if env.vars.get(env_vars::USER).is_none_or(|user| user.is_empty()) {
            let user = match &self.user_name {
                Some(user) => user.clone(),
                None => whoami::username().map_err(EnvironmentConstructionError::UserName)?,
            };
            env.set(env_vars::USER, user);
        }

        let tmp_dir = scratch.tmp_dir();
        env.set_dir(env_vars::TEST_TMPDIR, tmp_dir)?;
        // An explicit absolute HOME wins, and is not required to exist. Otherwise use the
        // scratch temp dir.
        match env.vars.get(env_vars::HOME) {
            Some(home) if Utf8Path::new(home).is_absolute() => {
                debug!(home = %home, "using HOME from the test environment as is");
            }
            _ => {
                env.set_dir(env_vars::HOME, tmp_dir)?;
            }
        }

        env.set_dir(env_vars::TEST_SRCDIR, runfiles.root())?;
        env.set_file(env_vars::RUNFILES_MANIFEST_FILE, runfiles.manifest_path())?;
        match runfiles.tree_root() {
            Some(tree_root) => {
                env.set_dir(env_vars::RUNFILES_DIR, tree_root)?;
                env.set_dir(env_vars::JAVA_RUNFILES, tree_root)?;
                env.set_dir(env_vars::PYTHON_RUNFILES, tree_root)?;
            }
            None => env.set(env_vars::RUNFILES_MANIFEST_ONLY, "1"),
        }

        let slot = invocation.slot();
        if slot.is_sharded() {
            let status = scratch.status().path();
            env.set_file(env_vars::TEST_SHARD_STATUS_FILE, status)?;
            env.set(env_vars::TEST_SHARD_INDEX, slot.index().to_string());
            env.set(env_vars::TEST_TOTAL_SHARDS, slot.total().to_string());
            env.set(env_vars::GTEST_SHARD_INDEX, slot.index().to_string());
            env.set(env_vars::GTEST_TOTAL_SHARDS, slot.total().to_string());
        }

        env.set_dir(env_vars::GTEST_TMP_DIR, tmp_dir)?;
        if let Some(label) = &target.label {
            env.set(env_vars::TEST_TARGET, label.clone());
        }
        env.set(env_vars::TEST_WORKSPACE, target.workspace.clone());

        let outputs = scratch.outputs();
        let xml = env.set_file(env_vars::XML_OUTPUT_FILE, outputs.xml_file())?;
        env.set(env_vars::GUNIT_OUTPUT, format!("xml:{xml}"));
        env.set_file(
            env_vars::TEST_INFRASTRUCTURE_FAILURE_FILE,
            scratch.infrastructure_failure_file(),
        )?;
        env.set_file(
            env_vars::TEST_PREMATURE_EXIT_FILE,
            scratch.premature_exit_file(),
        )?;

        if let Some(undeclared) = outputs.undeclared() {
            env.set_dir(env_vars::TEST_UNDECLARED_OUTPUTS_DIR, undeclared.dir())?;
            env.set_dir(
                env_vars::TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR,
                undeclared.annotations_dir(),
            )?;
        }

        Ok(RuntimeEnvironment { vars: env.vars })
    }
}

fn insert_external(vars: &mut IndexMap<String, String>, name: &str, value: &str, source: &str) {
    let owned = env_vars::WRAPPER_OWNED.contains(&name)
        || env_vars::UNDECLARED_OUTPUTS_GATED.contains(&name)
        || env_vars::NEVER_EXPORTED.contains(&name);
    if owned {
        warn!("ignoring {source} value for {name}: this variable is set by testwrap");
    } else {
        vars.insert(name.to_owned(), value.to_owned());
    }
}

struct EnvWriter {
    vars: IndexMap<String, String>,
}

impl EnvWriter {
    fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_owned(), value.into());
    }

    /// Sets a path to a directory that must exist.
    fn set_dir(
        &mut self,
        name: &'static str,
        path: &Utf8Path,
    ) -> Result<String, EnvironmentConstructionError> {
        check_absolute(name, path)?;
        if !path.is_dir() {
            return Err(EnvironmentConstructionError::MissingDirectory {
                name,
                path: path.to_owned(),
            });
        }
        let value = env_path(path);
        self.set(name, value.clone());
        Ok(value)
    }

    /// Sets a path to a file whose parent directory must exist. The file itself may not.
    fn set_file(
        &mut self,
        name: &'static str,
        path: &Utf8Path,
    ) -> Result<String, EnvironmentConstructionError> {
        check_absolute(name, path)?;
        if let Some(parent) = path.parent() {
            if !parent.is_dir() {
                return Err(EnvironmentConstructionError::MissingDirectory {
                    name,
                    path: parent.to_owned(),
                });
            }
        }
        let value = env_path(path);
        self.set(name, value.clone());
        Ok(value)
    }
}

fn check_absolute(name: &'static str, path: &Utf8Path) -> Result<(), EnvironmentConstructionError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(EnvironmentConstructionError::NotAbsolute {
            name,
            path: path.to_owned(),
        })
    }
}
