// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for testwrap.
//!
//! Configuration is layered: the embedded `default-config.toml`, then
//! `.config/testwrap.toml` in the exec root (or an explicit file). Settings are grouped into
//! profiles; any setting a custom profile leaves out is taken from `profile.default`.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound},
    runfiles::ResolutionPolicy,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{num::NonZeroUsize, time::Duration};

/// Overall configuration for testwrap.
///
/// This is the root data structure for testwrap configuration. Most runner-specific
/// configuration is managed through [profiles](TestWrapProfile), obtained through the
/// [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct TestWrapConfig {
    config_file: Utf8PathBuf,
    inner: ConfigDeserialize,
}

impl TestWrapConfig {
    /// The default location of the config within the exec root.
    pub const CONFIG_PATH: &'static str = ".config/testwrap.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the base profile, which every other profile falls back to.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the testwrap config from the given file, or if not specified from
    /// `.config/testwrap.toml` in the exec root. A missing `.config/testwrap.toml` is not an
    /// error; a missing explicit file is.
    pub fn from_sources(
        exec_root: &Utf8Path,
        file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = exec_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        Ok(Self { config_file, inner })
    }

    /// Returns the default testwrap config.
    pub fn default_config() -> Self {
        let inner = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        Self {
            config_file: Utf8PathBuf::from("<default config>"),
            inner,
        }
    }

    /// Returns the path of the user config file, whether or not it exists.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the name of the profile used when none is specified.
    pub fn default_profile_name(&self) -> &str {
        &self.inner.default_profile
    }

    /// Returns the profile with the given name, or the default profile if `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<TestWrapProfile<'_>, ProfileNotFound> {
        let name = name.unwrap_or(&self.inner.default_profile);
        let custom = self.inner.profiles.get(name).ok_or_else(|| {
            ProfileNotFound::new(name, self.inner.profiles.keys().map(String::as_str))
        })?;
        let default = self
            .inner
            .profiles
            .get(Self::DEFAULT_PROFILE)
            .expect("default profile is always present");
        Ok(TestWrapProfile {
            name: name.to_owned(),
            default,
            custom,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<ConfigDeserialize, ConfigParseErrorKind> {
        let config: ConfigDeserialize = builder
            .build_cloned()
            .and_then(|config| config.try_deserialize())
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        if !config.profiles.contains_key(&config.default_profile) {
            return Err(ConfigParseErrorKind::DefaultProfileNotFound(
                config.default_profile,
            ));
        }
        for (name, profile) in &config.profiles {
            if profile.max_concurrent_shards == Some(0) {
                return Err(ConfigParseErrorKind::ZeroConcurrency {
                    profile: name.clone(),
                });
            }
        }

        Ok(config)
    }
}

/// A testwrap profile, with settings from `profile.default` filling in the gaps.
///
/// Returned by [`TestWrapConfig::profile`].
#[derive(Clone, Debug)]
pub struct TestWrapProfile<'cfg> {
    name: String,
    default: &'cfg ProfileDeserialize,
    custom: &'cfg ProfileDeserialize,
}

impl TestWrapProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the test timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.custom.timeout.or(self.default.timeout)
    }

    /// Returns the time between asking a timed-out test to stop and killing it.
    pub fn grace_period(&self) -> Duration {
        self.custom
            .grace_period
            .or(self.default.grace_period)
            .unwrap_or(crate::launcher::DEFAULT_GRACE_PERIOD)
    }

    /// Returns the runfiles resolution policy.
    pub fn runfiles(&self) -> ResolutionPolicy {
        self.custom
            .runfiles
            .or(self.default.runfiles)
            .unwrap_or_default()
    }

    /// Returns the number of shards run at once, defaulting to the available parallelism.
    pub fn max_concurrent_shards(&self) -> usize {
        self.custom
            .max_concurrent_shards
            .or(self.default.max_concurrent_shards)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
    }

    /// Returns the names of variables passed through from the wrapper's environment.
    pub fn passthrough_env(&self) -> &[String] {
        self.custom
            .passthrough_env
            .as_deref()
            .or(self.default.passthrough_env.as_deref())
            .unwrap_or_default()
    }

    /// Returns true if scratch directories should be kept after the run.
    pub fn keep_scratch(&self) -> bool {
        self.custom
            .keep_scratch
            .or(self.default.keep_scratch)
            .unwrap_or(false)
    }

    /// Returns the directory scratch directories are created in, if set.
    ///
    /// Relative paths are relative to the exec root.
    pub fn scratch_root(&self) -> Option<&Utf8Path> {
        self.custom
            .scratch_root
            .as_deref()
            .or(self.default.scratch_root.as_deref())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigDeserialize {
    default_profile: String,
    #[serde(rename = "profile")]
    profiles: IndexMap<String, ProfileDeserialize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProfileDeserialize {
    #[serde(default, with = "humantime_serde::option")]
    timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    grace_period: Option<Duration>,
    #[serde(default)]
    runfiles: Option<ResolutionPolicy>,
    #[serde(default)]
    max_concurrent_shards: Option<usize>,
    #[serde(default)]
    passthrough_env: Option<Vec<String>>,
    #[serde(default)]
    keep_scratch: Option<bool>,
    #[serde(default)]
    scratch_root: Option<Utf8PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn exec_root_with_config(contents: &str) -> Utf8TempDir {
        let dir = camino_tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".config")).unwrap();
        std::fs::write(dir.path().join(TestWrapConfig::CONFIG_PATH), contents).unwrap();
        dir
    }

    #[test]
    fn default_config_is_valid() {
        let config = TestWrapConfig::default_config();
        assert_eq!(config.default_profile_name(), "default");

        let profile = config.profile(None).expect("default profile exists");
        assert_eq!(profile.name(), "default");
        assert_eq!(profile.timeout(), None);
        assert_eq!(profile.grace_period(), Duration::from_secs(10));
        assert_eq!(profile.runfiles(), ResolutionPolicy::ManifestOnly);
        assert!(profile.max_concurrent_shards() >= 1);
        assert!(profile.passthrough_env().iter().any(|name| name == "PATH"));
        assert!(!profile.keep_scratch());
        assert_eq!(profile.scratch_root(), None);
    }

    #[test]
    fn missing_config_file_is_ok() {
        let dir = camino_tempfile::tempdir().unwrap();
        let config = TestWrapConfig::from_sources(dir.path(), None).expect("no config is fine");
        assert_eq!(
            config.config_file(),
            dir.path().join(TestWrapConfig::CONFIG_PATH)
        );
        config.profile(None).unwrap();

        let missing = dir.path().join("missing.toml");
        let error = TestWrapConfig::from_sources(dir.path(), Some(&missing)).unwrap_err();
        assert_eq!(error.config_file(), &missing);
    }

    #[test]
    fn custom_profile_falls_back_to_default() {
        let dir = exec_root_with_config(indoc! {r#"
            default-profile = "ci"

            [profile.default]
            timeout = "30s"
            passthrough-env = ["PATH", "HOME_DIR"]

            [profile.ci]
            grace-period = "2s"
            runfiles = "tree"
            max-concurrent-shards = 3
            keep-scratch = true
            scratch-root = "target/scratch"
        "#});
        let config = TestWrapConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.default_profile_name(), "ci");

        let ci = config.profile(None).unwrap();
        assert_eq!(ci.name(), "ci");
        assert_eq!(ci.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(ci.grace_period(), Duration::from_secs(2));
        assert_eq!(ci.runfiles(), ResolutionPolicy::MaterializedTree);
        assert_eq!(ci.max_concurrent_shards(), 3);
        assert_eq!(ci.passthrough_env(), ["PATH", "HOME_DIR"]);
        assert!(ci.keep_scratch());
        assert_eq!(ci.scratch_root(), Some(Utf8Path::new("target/scratch")));

        let default = config.profile(Some("default")).unwrap();
        assert_eq!(default.grace_period(), Duration::from_secs(10));
        assert_eq!(default.runfiles(), ResolutionPolicy::ManifestOnly);

        let error = config.profile(Some("nightly")).unwrap_err();
        assert_eq!(
            error.to_string(),
            "profile `nightly` not found (known profiles: ci, default)"
        );
    }

    #[test_case(
        indoc! {r#"
            default-profile = "missing"
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::DefaultProfileNotFound(name) if name == "missing")
        ; "default profile not found"
    )]
    #[test_case(
        indoc! {r#"
            [profile.ci]
            max-concurrent-shards = 0
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::ZeroConcurrency { profile } if profile == "ci")
        ; "zero concurrency"
    )]
    #[test_case(
        indoc! {r#"
            [profile.default]
            timeout = "forever"
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::BuildError(_))
        ; "invalid duration"
    )]
    #[test_case(
        indoc! {r#"
            [profile.default]
            runfiles = "zip"
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::BuildError(_))
        ; "invalid runfiles policy"
    )]
    fn invalid_config(contents: &str, check: fn(&ConfigParseErrorKind) -> bool) {
        let dir = exec_root_with_config(contents);
        let error = TestWrapConfig::from_sources(dir.path(), None).unwrap_err();
        assert_eq!(
            error.config_file(),
            &dir.path().join(TestWrapConfig::CONFIG_PATH)
        );
        assert!(check(error.kind()), "unexpected error kind: {:?}", error.kind());
    }
}
