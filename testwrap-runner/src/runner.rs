// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner: ties runfiles resolution, sharding, environment construction, process
//! launch and reporting together for one target.
//!
//! Created using [`TestRunnerBuilder`].

use crate::{
    environment::{DEFAULT_PASSTHROUGH_ENV, EnvironmentBuilder},
    errors::{ChildStartError, EnvironmentConstructionError, SetupError, TestRunnerBuildError},
    helpers::{absolutize, plural},
    launcher::{DEFAULT_GRACE_PERIOD, Launcher},
    outcome::{InvocationResult, TestOutcome},
    reports,
    runfiles::{ResolvedRunfiles, RunfilesResolver},
    scratch::ScratchDirs,
    shard::{ShardCoordinator, ShardPlan, ShardSlot, TestInvocation},
    stopwatch::{StopwatchStart, stopwatch},
    target::{TestTarget, resolve_test_env},
    test_output::CaptureStrategy,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    capture_strategy: CaptureStrategy,
    grace_period: Option<Duration>,
    max_concurrent_shards: Option<usize>,
    passthrough_env: Option<Vec<String>>,
    keep_scratch: bool,
    scratch_root: Option<Utf8PathBuf>,
    exec_root: Option<Utf8PathBuf>,
    user_name: Option<String>,
}

impl TestRunnerBuilder {
    /// Sets the capture strategy for the test runner.
    ///
    /// With [`CaptureStrategy::None`], shards always run one at a time.
    pub fn set_capture_strategy(&mut self, strategy: CaptureStrategy) -> &mut Self {
        self.capture_strategy = strategy;
        self
    }

    /// Sets the time between asking a timed-out test to stop and killing it.
    pub fn set_grace_period(&mut self, grace_period: Duration) -> &mut Self {
        self.grace_period = Some(grace_period);
        self
    }

    /// Sets the number of shards to run simultaneously.
    pub fn set_max_concurrent_shards(&mut self, max: usize) -> &mut Self {
        self.max_concurrent_shards = Some(max);
        self
    }

    /// Sets the names of variables passed through from the wrapper's environment.
    pub fn set_passthrough_env(
        &mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.passthrough_env = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Keeps scratch directories and the runfiles directory after the run.
    pub fn set_keep_scratch(&mut self, keep_scratch: bool) -> &mut Self {
        self.keep_scratch = keep_scratch;
        self
    }

    /// Sets the directory scratch and runfiles directories are created in. Relative paths are
    /// relative to the exec root.
    pub fn set_scratch_root(&mut self, scratch_root: impl Into<Utf8PathBuf>) -> &mut Self {
        self.scratch_root = Some(scratch_root.into());
        self
    }

    /// Sets the directory relative source paths and the test program are resolved against.
    ///
    /// Defaults to the current directory.
    pub fn set_exec_root(&mut self, exec_root: impl Into<Utf8PathBuf>) -> &mut Self {
        self.exec_root = Some(exec_root.into());
        self
    }

    /// Uses `user_name` for `USER` instead of asking the operating system.
    pub fn set_user_name(&mut self, user_name: impl Into<String>) -> &mut Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// Creates a new test runner.
    pub fn build(self) -> Result<TestRunner, TestRunnerBuildError> {
        let current_dir = std::env::current_dir().map_err(TestRunnerBuildError::ExecRoot)?;
        let current_dir = Utf8PathBuf::try_from(current_dir).map_err(|error| {
            TestRunnerBuildError::ExecRootNonUtf8 {
                path: error.into_path_buf(),
            }
        })?;
        let exec_root = match self.exec_root {
            Some(exec_root) => absolutize(&current_dir, &exec_root),
            None => current_dir,
        };
        let scratch_root = self
            .scratch_root
            .map(|scratch_root| absolutize(&exec_root, &scratch_root));

        let max_concurrent_shards = match self.capture_strategy {
            CaptureStrategy::None => 1,
            CaptureStrategy::Split => self.max_concurrent_shards.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            }),
        };

        let mut env_builder = match &self.passthrough_env {
            Some(names) => EnvironmentBuilder::new(names),
            None => EnvironmentBuilder::new(DEFAULT_PASSTHROUGH_ENV),
        };
        if let Some(user_name) = self.user_name {
            env_builder.set_user_name(user_name);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("testwrap-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                exec_root,
                scratch_root,
                keep_scratch: self.keep_scratch,
                coordinator: ShardCoordinator::new(max_concurrent_shards),
                shared: Arc::new(ShardShared {
                    env_builder,
                    launcher: Launcher::new(
                        self.capture_strategy,
                        self.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD),
                    ),
                }),
            },
            runtime,
        })
    }
}

/// Context for running a target.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    inner: TestRunnerInner,
    runtime: Runtime,
}

impl TestRunner {
    /// Returns the exec root.
    pub fn exec_root(&self) -> &Utf8Path {
        &self.inner.exec_root
    }

    /// Runs every shard of `target` and returns the aggregated outcome.
    ///
    /// This never fails: errors are reported through the outcome's verdict.
    pub fn run(self, target: &TestTarget) -> TestOutcome {
        let outcome = self.runtime.block_on(self.inner.run(target));

        // Leaked descendants may still hold pipes open; don't wait for them.
        self.runtime.shutdown_background();
        outcome
    }
}

#[derive(Debug)]
struct TestRunnerInner {
    exec_root: Utf8PathBuf,
    scratch_root: Option<Utf8PathBuf>,
    keep_scratch: bool,
    coordinator: ShardCoordinator,
    shared: Arc<ShardShared>,
}

/// State shared read-only by every shard task.
#[derive(Debug)]
struct ShardShared {
    env_builder: EnvironmentBuilder,
    launcher: Launcher,
}

impl TestRunnerInner {
    async fn run(&self, target: &TestTarget) -> TestOutcome {
        let stopwatch = stopwatch();
        let dependencies = target.dependencies();
        debug!(
            label = target.label(),
            "resolving {} {} ({})",
            dependencies.len(),
            plural::runfiles_str(dependencies.len()),
            target.policy(),
        );

        let mut resolver = RunfilesResolver::new(&self.exec_root);
        if let Some(scratch_root) = &self.scratch_root {
            resolver = resolver.with_temp_parent(scratch_root);
        }
        let runfiles = match resolver.resolve(dependencies, target.policy()) {
            Ok(runfiles) => runfiles,
            Err(error) => {
                return Self::setup_failed(target, SetupError::Runfiles(error), &stopwatch);
            }
        };

        let prepared = Arc::new(PreparedTarget::new(target, &runfiles, &self.exec_root));
        let runfiles = Arc::new(runfiles);
        let plan = ShardPlan::new(target.shard_total());
        debug!(
            program = %prepared.program,
            "running {} {}",
            plan.total(),
            plural::shards_str(plan.total().get() as usize),
        );

        let results = self
            .coordinator
            .run(plan, |slot| {
                let ctx = ShardContext {
                    invocation: TestInvocation::new(slot, prepared.clone()),
                    runfiles: runfiles.clone(),
                    shared: self.shared.clone(),
                    scratch_root: self.scratch_root.clone(),
                    keep_scratch: self.keep_scratch,
                };
                ctx.run()
            })
            .await;

        // Every shard task has finished, so this is the last reference.
        let runfiles_dir = match Arc::try_unwrap(runfiles) {
            Ok(runfiles) if self.keep_scratch => Some(runfiles.keep()),
            _ => None,
        };

        let snapshot = stopwatch.snapshot();
        TestOutcome {
            label: target.label().map(ToOwned::to_owned),
            results,
            setup_error: None,
            start_time: snapshot.start_time,
            duration: snapshot.duration,
            runfiles_dir,
        }
    }

    fn setup_failed(
        target: &TestTarget,
        error: SetupError,
        stopwatch: &StopwatchStart,
    ) -> TestOutcome {
        debug!(label = target.label(), "setup failed: {error}");
        let snapshot = stopwatch.snapshot();
        TestOutcome {
            label: target.label().map(ToOwned::to_owned),
            results: Vec::new(),
            setup_error: Some(error),
            start_time: snapshot.start_time,
            duration: snapshot.duration,
            runfiles_dir: None,
        }
    }
}

/// Everything one shard task owns.
struct ShardContext {
    invocation: TestInvocation,
    runfiles: Arc<ResolvedRunfiles>,
    shared: Arc<ShardShared>,
    scratch_root: Option<Utf8PathBuf>,
    keep_scratch: bool,
}

impl ShardContext {
    async fn run(self) -> InvocationResult {
        let stopwatch = stopwatch();
        let slot = self.invocation.slot();
        let target = self.invocation.target();

        let scratch = match ScratchDirs::create(
            self.scratch_root.as_deref(),
            slot,
            target.logs_dir.as_deref(),
            target.undeclared_outputs,
        ) {
            Ok(scratch) => scratch,
            Err(error) => return environment_failed(slot, error, &stopwatch),
        };
        let env = match self
            .shared
            .env_builder
            .build(&self.invocation, &self.runfiles, &scratch)
        {
            Ok(env) => env,
            Err(error) => return environment_failed(slot, error, &stopwatch),
        };

        let mut result = self.shared.launcher.launch(&self.invocation, &env).await;

        let label = target.label.as_deref();
        let outputs = scratch.outputs();
        if let Err(error) = reports::write_default_junit(outputs.xml_file(), label, &result) {
            result.report_errors.push(error);
        }
        if target.logs_dir.is_some() {
            let marker = target.echo.then(|| reports::start_marker(label));
            if let Err(error) =
                reports::write_test_log(outputs.log_file(), marker.as_deref(), &result)
            {
                result.report_errors.push(error);
            }
        }
        if let Some(undeclared) = outputs.undeclared() {
            if let Err(error) = reports::write_undeclared_outputs(undeclared) {
                result.report_errors.push(error);
            }
        }
        for error in &result.report_errors {
            warn!(%slot, "{error}");
        }

        if slot.is_sharded() && !scratch.status().was_touched() {
            debug!(%slot, "test did not touch the shard status file");
        }

        if self.keep_scratch {
            result.scratch_dir = Some(scratch.keep());
        }
        result
    }
}

fn environment_failed(
    slot: ShardSlot,
    error: EnvironmentConstructionError,
    stopwatch: &StopwatchStart,
) -> InvocationResult {
    debug!(%slot, "failed to construct environment: {error}");
    let snapshot = stopwatch.snapshot();
    InvocationResult::start_failed(
        slot,
        ChildStartError::Environment(Arc::new(error)),
        snapshot.start_time,
        snapshot.duration,
    )
}

/// A [`TestTarget`] with its program located and its test environment resolved, shared by all
/// of its shards.
#[derive(Clone, Debug)]
pub(crate) struct PreparedTarget {
    pub(crate) label: Option<String>,
    pub(crate) workspace: String,
    pub(crate) program: Utf8PathBuf,
    pub(crate) args: Vec<String>,
    pub(crate) test_env: IndexMap<String, String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) undeclared_outputs: bool,
    pub(crate) logs_dir: Option<Utf8PathBuf>,
    pub(crate) echo: bool,
}

impl PreparedTarget {
    fn new(target: &TestTarget, runfiles: &ResolvedRunfiles, exec_root: &Utf8Path) -> Self {
        Self {
            label: target.label().map(ToOwned::to_owned),
            workspace: target.workspace().to_owned(),
            program: locate_program(target.program(), target.workspace(), runfiles, exec_root),
            args: target.args().to_vec(),
            test_env: resolve_test_env(target.test_env(), |name| std::env::var(name).ok()),
            timeout: target.timeout(),
            undeclared_outputs: target.undeclared_outputs(),
            logs_dir: target
                .logs_dir()
                .map(|logs_dir| absolutize(exec_root, logs_dir)),
            echo: target.echo(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            label: None,
            workspace: crate::target::DEFAULT_WORKSPACE.to_owned(),
            program: program.into(),
            args: Vec::new(),
            test_env: IndexMap::new(),
            timeout: None,
            undeclared_outputs: false,
            logs_dir: None,
            echo: true,
        }
    }
}

/// Finds the test executable.
///
/// A relative path is tried against the exec root, then looked up in the manifest as
/// `<workspace>/<path>` and as `<path>`. A bare name that isn't found anywhere is left alone so
/// it is looked up on `PATH`.
fn locate_program(
    program: &Utf8Path,
    workspace: &str,
    runfiles: &ResolvedRunfiles,
    exec_root: &Utf8Path,
) -> Utf8PathBuf {
    if program.is_absolute() {
        return program.to_owned();
    }

    let in_exec_root = exec_root.join(program);
    if in_exec_root.exists() {
        return in_exec_root;
    }

    let relative = program.as_str();
    let relative = relative.strip_prefix("./").unwrap_or(relative);
    for logical_path in [format!("{workspace}/{relative}"), relative.to_owned()] {
        if let Some(path) = runfiles.rlocation(&logical_path) {
            debug!("found `{program}` in runfiles as `{logical_path}`");
            return path.to_owned();
        }
    }

    if program.components().count() == 1 {
        program.to_owned()
    } else {
        in_exec_root
    }
}
