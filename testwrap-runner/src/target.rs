// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata for one test target, as supplied by the orchestrator.

use crate::{
    errors::TestEnvParseError,
    runfiles::{ResolutionPolicy, RuntimeDependency},
    shard::ShardTotal,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::{str::FromStr, time::Duration};

/// The workspace name used when none is given.
pub const DEFAULT_WORKSPACE: &str = "_main";

/// Everything the wrapper needs to know to run one test target.
#[derive(Clone, Debug)]
pub struct TestTarget {
    label: Option<String>,
    workspace: String,
    program: Utf8PathBuf,
    args: Vec<String>,
    dependencies: Vec<RuntimeDependency>,
    shard_total: ShardTotal,
    policy: ResolutionPolicy,
    timeout: Option<Duration>,
    undeclared_outputs: bool,
    test_env: Vec<TestEnvEntry>,
    logs_dir: Option<Utf8PathBuf>,
    echo: bool,
}

impl TestTarget {
    /// Creates a target that runs `program` unsharded, with no runfiles.
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            label: None,
            workspace: DEFAULT_WORKSPACE.to_owned(),
            program: program.into(),
            args: Vec::new(),
            dependencies: Vec::new(),
            shard_total: ShardTotal::ONE,
            policy: ResolutionPolicy::default(),
            timeout: None,
            undeclared_outputs: false,
            test_env: Vec::new(),
            logs_dir: None,
            echo: true,
        }
    }

    /// Sets the target label, exported as `TEST_TARGET`.
    pub fn set_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the workspace name, exported as `TEST_WORKSPACE`.
    pub fn set_workspace(&mut self, workspace: impl Into<String>) -> &mut Self {
        self.workspace = workspace.into();
        self
    }

    /// Sets the arguments passed to the test executable.
    pub fn set_args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds runtime dependencies. Manifest lines keep this order.
    pub fn add_dependencies(
        &mut self,
        dependencies: impl IntoIterator<Item = RuntimeDependency>,
    ) -> &mut Self {
        self.dependencies.extend(dependencies);
        self
    }

    /// Sets the number of shards.
    pub fn set_shard_total(&mut self, total: ShardTotal) -> &mut Self {
        self.shard_total = total;
        self
    }

    /// Sets how runfiles are made available.
    pub fn set_policy(&mut self, policy: ResolutionPolicy) -> &mut Self {
        self.policy = policy;
        self
    }

    /// Sets the timeout. With no timeout, the wrapper waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Requests undeclared outputs.
    pub fn set_undeclared_outputs(&mut self, undeclared_outputs: bool) -> &mut Self {
        self.undeclared_outputs = undeclared_outputs;
        self
    }

    /// Adds explicit test environment entries.
    pub fn add_test_env(&mut self, entries: impl IntoIterator<Item = TestEnvEntry>) -> &mut Self {
        self.test_env.extend(entries);
        self
    }

    /// Sets the directory per-shard logs and reports are written to.
    pub fn set_logs_dir(&mut self, logs_dir: Option<Utf8PathBuf>) -> &mut Self {
        self.logs_dir = logs_dir;
        self
    }

    /// Sets whether the start marker is printed.
    pub fn set_echo(&mut self, echo: bool) -> &mut Self {
        self.echo = echo;
        self
    }

    /// Returns the label, if known.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the workspace name.
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Returns the executable path, as declared.
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Returns the arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the runtime dependencies, in declaration order.
    pub fn dependencies(&self) -> &[RuntimeDependency] {
        &self.dependencies
    }

    /// Returns the number of shards.
    pub fn shard_total(&self) -> ShardTotal {
        self.shard_total
    }

    /// Returns the runfiles policy.
    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Returns the timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns true if undeclared outputs were requested.
    pub fn undeclared_outputs(&self) -> bool {
        self.undeclared_outputs
    }

    /// Returns the explicit test environment entries.
    pub fn test_env(&self) -> &[TestEnvEntry] {
        &self.test_env
    }

    /// Returns the logs directory.
    pub fn logs_dir(&self) -> Option<&Utf8Path> {
        self.logs_dir.as_deref()
    }

    /// Returns true if the start marker is printed.
    pub fn echo(&self) -> bool {
        self.echo
    }
}

/// An explicit test environment entry: `NAME=VALUE`, or `NAME` to inherit the wrapper's value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestEnvEntry {
    name: String,
    value: Option<String>,
}

impl TestEnvEntry {
    /// Creates an entry with an explicit value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Creates an entry that inherits the wrapper's value.
    pub fn inherit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Returns the variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the explicit value, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl FromStr for TestEnvEntry {
    type Err = TestEnvParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(TestEnvParseError::new(s, "variable name is empty"));
        }
        if name.contains('\0') || value.is_some_and(|v| v.contains('\0')) {
            return Err(TestEnvParseError::new(s, "contains a NUL byte"));
        }
        Ok(Self {
            name: name.to_owned(),
            value: value.map(ToOwned::to_owned),
        })
    }
}

/// Resolves test environment entries to values, looking inherited entries up with `lookup`.
///
/// Inherited entries that aren't set in the wrapper's environment are skipped. Later entries
/// override earlier ones.
pub(crate) fn resolve_test_env(
    entries: &[TestEnvEntry],
    lookup: impl Fn(&str) -> Option<String>,
) -> IndexMap<String, String> {
    let mut resolved = IndexMap::new();
    for entry in entries {
        let value = match &entry.value {
            Some(value) => Some(value.clone()),
            None => lookup(&entry.name),
        };
        if let Some(value) = value {
            resolved.insert(entry.name.clone(), value);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_test_env() {
        assert_eq!(
            "FOO=bar=baz".parse::<TestEnvEntry>().unwrap(),
            TestEnvEntry::new("FOO", "bar=baz")
        );
        assert_eq!(
            "FOO=".parse::<TestEnvEntry>().unwrap(),
            TestEnvEntry::new("FOO", "")
        );
        assert_eq!(
            "FOO".parse::<TestEnvEntry>().unwrap(),
            TestEnvEntry::inherit("FOO")
        );
        "=bar".parse::<TestEnvEntry>().unwrap_err();
    }

    #[test]
    fn resolve_inherits_and_overrides() {
        let entries = vec![
            TestEnvEntry::new("A", "1"),
            TestEnvEntry::inherit("B"),
            TestEnvEntry::inherit("UNSET"),
            TestEnvEntry::new("A", "2"),
        ];
        let resolved = resolve_test_env(&entries, |name| match name {
            "B" => Some("from-host".to_owned()),
            _ => None,
        });
        let resolved: Vec<_> = resolved
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(resolved, [("A", "2"), ("B", "from-host")]);
    }
}
