// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts, clap_styles},
    reporter::{MessageFormat, OutcomeReporter, TestOutputDisplay},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use std::{io::Write, time::Duration};
use testwrap_runner::{
    config::TestWrapConfig,
    reports::start_marker,
    runfiles::{ResolutionPolicy, RunfilesManifest, RuntimeDependency},
    runner::TestRunnerBuilder,
    shard::ShardTotal,
    target::{DEFAULT_WORKSPACE, TestEnvEntry, TestTarget},
    test_output::CaptureStrategy,
};
use tracing::info;

/// Runs one test target hermetically on behalf of a build orchestrator.
///
/// Use `testwrap run -- <program> [args...]` to run a test, and `testwrap rlocation` to look up
/// runfiles from a manifest.
#[derive(Debug, Parser)]
#[command(version, name = "testwrap", styles = clap_styles::style())]
pub struct TestWrapApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

impl TestWrapApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(output),
            Command::Rlocation(opts) => opts.exec(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a test target
    ///
    /// Resolves the target's runfiles, runs every shard in a fresh, hermetic environment and
    /// exits with a code describing the aggregated verdict: 0 if every shard passed, 3 if any
    /// failed or timed out, and 36 if testwrap could not run the test correctly.
    Run(Box<RunOpts>),

    /// Look up a logical path in a runfiles manifest
    ///
    /// Prints the real path the logical path maps to.
    Rlocation(RlocationOpts),
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Label of the target, exported as TEST_TARGET
    #[arg(long, value_name = "LABEL")]
    target: Option<String>,

    /// Workspace name, exported as TEST_WORKSPACE
    #[arg(long, value_name = "NAME", default_value = DEFAULT_WORKSPACE)]
    workspace: String,

    #[command(flatten)]
    runfiles: RunfilesOpts,

    #[command(flatten)]
    execution: ExecutionOpts,

    #[command(flatten)]
    outputs: OutputsOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    /// The test program and its arguments
    #[arg(last = true, required = true, value_name = "PROGRAM")]
    command: Vec<String>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Runfiles options")]
struct RunfilesOpts {
    /// A runtime dependency, as LOGICAL=SOURCE or SOURCE
    #[arg(long = "data", value_name = "LOGICAL=SOURCE")]
    data: Vec<RuntimeDependency>,

    /// A file listing runtime dependencies, one per line
    ///
    /// Blank lines and lines starting with `#` are ignored.
    #[arg(long, value_name = "PATH")]
    data_file: Vec<Utf8PathBuf>,

    /// How runfiles are made available: manifest-only or tree [default: from profile]
    #[arg(long, value_name = "POLICY")]
    runfiles: Option<ResolutionPolicy>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Execution options")]
struct ExecutionOpts {
    /// Number of shards to split the test into
    #[arg(long, value_name = "N", default_value_t, env = "TESTWRAP_SHARD_COUNT")]
    shard_count: ShardTotal,

    /// Time a shard may run before it is stopped [default: from profile]
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// An explicit test environment entry, as NAME=VALUE or NAME to inherit
    #[arg(long, value_name = "NAME[=VALUE]")]
    test_env: Vec<TestEnvEntry>,

    /// Run shards one at a time without capturing their output
    #[arg(long)]
    no_capture: bool,

    /// Directory relative paths are resolved against [default: current directory]
    #[arg(long, value_name = "DIR")]
    exec_root: Option<Utf8PathBuf>,

    /// Directory scratch directories are created in [default: from profile]
    #[arg(long, value_name = "DIR")]
    scratch_root: Option<Utf8PathBuf>,

    /// Keep scratch directories after the run and print their paths
    #[arg(long)]
    keep_scratch: bool,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Output options")]
struct OutputsOpts {
    /// Directory per-shard logs and reports are written to
    #[arg(long, value_name = "DIR")]
    logs_dir: Option<Utf8PathBuf>,

    /// Expose TEST_UNDECLARED_OUTPUTS_DIR to the test
    #[arg(long)]
    undeclared_outputs: bool,

    /// Don't print the "Executing tests from" marker
    #[arg(long)]
    no_echo: bool,

    /// Which shards' captured output to show
    #[arg(long, value_enum, default_value_t, value_name = "WHEN")]
    test_output: TestOutputDisplay,

    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FMT")]
    message_format: MessageFormat,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: exec-root/.config/testwrap.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Config profile to use
    #[arg(long, short = 'P', value_name = "PROFILE", env = "TESTWRAP_PROFILE")]
    profile: Option<String>,
}

impl RunOpts {
    fn exec(self, output: OutputContext) -> Result<i32> {
        let exec_root = match self.execution.exec_root {
            Some(exec_root) => exec_root,
            None => current_dir()?,
        };

        let config = TestWrapConfig::from_sources(
            &exec_root,
            self.config_opts.config_file.as_deref(),
        )?;
        let profile = config.profile(self.config_opts.profile.as_deref())?;

        let mut dependencies = Vec::new();
        for data_file in &self.runfiles.data_file {
            dependencies.extend(read_data_file(data_file)?);
        }
        dependencies.extend(self.runfiles.data);

        let policy = self.runfiles.runfiles.unwrap_or_else(|| profile.runfiles());

        let (program, args) = self
            .command
            .split_first()
            .expect("clap requires at least one argument");
        let mut target = TestTarget::new(program.as_str());
        target
            .set_workspace(self.workspace)
            .set_args(args.iter().cloned())
            .add_dependencies(dependencies)
            .set_shard_total(self.execution.shard_count)
            .set_policy(policy)
            .set_timeout(self.execution.timeout.or(profile.timeout()))
            .set_undeclared_outputs(self.outputs.undeclared_outputs)
            .add_test_env(self.execution.test_env)
            .set_logs_dir(self.outputs.logs_dir)
            .set_echo(!self.outputs.no_echo);
        if let Some(label) = self.target {
            target.set_label(label);
        }

        let keep_scratch = self.execution.keep_scratch || profile.keep_scratch();
        let mut builder = TestRunnerBuilder::default();
        builder
            .set_exec_root(exec_root)
            .set_grace_period(profile.grace_period())
            .set_max_concurrent_shards(profile.max_concurrent_shards())
            .set_passthrough_env(profile.passthrough_env().iter().cloned())
            .set_keep_scratch(keep_scratch);
        if self.execution.no_capture {
            builder.set_capture_strategy(CaptureStrategy::None);
        }
        if let Some(scratch_root) = self
            .execution
            .scratch_root
            .or_else(|| profile.scratch_root().map(ToOwned::to_owned))
        {
            builder.set_scratch_root(scratch_root);
        }
        let runner = builder.build()?;

        let reporter = OutcomeReporter::new(
            output,
            self.outputs.message_format,
            self.outputs.test_output,
        );
        let mut stdout = std::io::stdout().lock();
        if target.echo() && reporter.is_human() {
            let marker = start_marker(target.label());
            reporter
                .write_marker(&marker, &mut stdout)
                .map_err(|err| ExpectedError::WriteOutputError { err })?;
        }

        let outcome = runner.run(&target);

        reporter.write_outcome(&outcome, &mut stdout)?;
        stdout
            .flush()
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        if keep_scratch {
            if let Some(dir) = outcome.runfiles_dir() {
                info!("runfiles kept at `{dir}`");
            }
            for result in outcome.results() {
                if let Some(dir) = result.scratch_dir() {
                    info!("{} scratch directory kept at `{dir}`", result.slot());
                }
            }
        }

        Ok(outcome.exit_code())
    }
}

#[derive(Debug, Args)]
struct RlocationOpts {
    /// The runfiles manifest to read
    #[arg(long, value_name = "PATH", env = "RUNFILES_MANIFEST_FILE")]
    manifest: Utf8PathBuf,

    /// The logical path to look up
    #[arg(value_name = "LOGICAL_PATH")]
    logical_path: String,
}

impl RlocationOpts {
    fn exec(self) -> Result<i32> {
        let manifest = RunfilesManifest::read(&self.manifest)?;
        let real_path = manifest.rlocation(&self.logical_path).ok_or_else(|| {
            ExpectedError::RlocationNotFound {
                manifest: self.manifest.clone(),
                logical_path: self.logical_path.clone(),
            }
        })?;

        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{real_path}").map_err(|err| ExpectedError::WriteOutputError { err })?;
        Ok(testwrap_metadata::TestWrapExitCode::OK)
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 {
        path: err.into_path_buf(),
    })
}

/// Reads a `--data-file`: one `LOGICAL=SOURCE` or `SOURCE` per line.
fn read_data_file(path: &Utf8Path) -> Result<Vec<RuntimeDependency>> {
    let contents =
        std::fs::read_to_string(path).map_err(|err| ExpectedError::ArgumentFileReadError {
            arg_name: "--data-file",
            file_name: path.to_owned(),
            err,
        })?;
    parse_data_file(&contents).map_err(|(line_number, err)| {
        ExpectedError::ArgumentFileParseError {
            arg_name: "--data-file",
            file_name: path.to_owned(),
            line_number,
            err,
        }
    })
}

fn parse_data_file(
    contents: &str,
) -> std::result::Result<
    Vec<RuntimeDependency>,
    (usize, testwrap_runner::errors::RuntimeDependencyParseError),
> {
    contents
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_number, line)| line.parse().map_err(|err| (line_number, err)))
        .collect()
}
