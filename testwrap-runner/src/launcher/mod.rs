// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Launching test processes.

use crate::{
    environment::RuntimeEnvironment,
    errors::{ChildFdError, ChildStartError},
    outcome::{ExecFailReason, ExecutionResult, FailureStatus, InvocationResult},
    shard::TestInvocation,
    stopwatch::stopwatch,
    test_command::{Child, ChildAccumulator, spawn},
    test_output::CaptureStrategy,
};
use camino::Utf8Path;
use std::{sync::Arc, time::Duration};
use testwrap_metadata::env_vars;
use tracing::{debug, instrument, warn};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as os;
    } else if #[cfg(windows)] {
        mod windows;
        use windows as os;
    } else {
        compile_error!("unsupported target platform");
    }
}

/// The default time between asking a timed-out test to stop and killing it.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How long to keep reading output after the test exits, in case a leaked descendant still
/// holds the pipes open.
const LEAK_TIMEOUT: Duration = Duration::from_millis(100);

/// Runs one test process and maps how it finished to an [`InvocationResult`].
#[derive(Clone, Debug)]
pub struct Launcher {
    capture: CaptureStrategy,
    grace_period: Duration,
}

impl Launcher {
    /// Creates a new launcher.
    pub fn new(capture: CaptureStrategy, grace_period: Duration) -> Self {
        Self {
            capture,
            grace_period,
        }
    }

    /// Launches `invocation` with exactly the variables in `env`, waits for it and collects its
    /// output.
    ///
    /// The working directory is `TEST_TMPDIR`. Spawn failures are reported as
    /// infrastructure errors, never as `Err`.
    #[instrument(level = "debug", skip_all, fields(shard = %invocation.slot()))]
    pub async fn launch(
        &self,
        invocation: &TestInvocation,
        env: &RuntimeEnvironment,
    ) -> InvocationResult {
        let stopwatch = stopwatch();
        let slot = invocation.slot();

        let mut cmd = std::process::Command::new(invocation.program());
        cmd.args(invocation.args())
            .env_clear()
            .envs(env.iter());
        if let Some(tmp_dir) = env.get_path(env_vars::TEST_TMPDIR) {
            cmd.current_dir(tmp_dir);
        }
        os::set_process_group(&mut cmd);

        debug!(
            "executing {}",
            shell_words::join(
                std::iter::once(invocation.program().as_str())
                    .chain(invocation.args().iter().map(String::as_str))
            )
        );

        // Job objects are best-effort: if creating one fails, carry on without it.
        let job = os::create_job().ok();

        let Child {
            mut child,
            child_fds,
        } = match spawn(cmd, self.capture) {
            Ok(child) => child,
            Err(error) => {
                let snapshot = stopwatch.snapshot();
                return InvocationResult::start_failed(
                    slot,
                    ChildStartError::Spawn(Arc::new(error)),
                    snapshot.start_time,
                    snapshot.duration,
                );
            }
        };

        // The child has never been polled, so it has a PID.
        let child_pid = child.id();
        // If assigning the child to the job fails, ignore this. This can happen if the process
        // has already exited.
        let _ = os::assign_process_to_job(&child, job.as_ref());

        let mut child_acc = ChildAccumulator::new(child_fds);
        let mut timed_out = false;

        let deadline = async {
            match invocation.timeout() {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        let mut deadline = std::pin::pin!(deadline);

        let res = loop {
            tokio::select! {
                () = child_acc.fill_buf(), if !child_acc.fds.is_done() => {}
                res = child.wait() => {
                    break res;
                }
                () = &mut deadline, if !timed_out => {
                    timed_out = true;
                    debug!("timeout exceeded, terminating");
                    os::terminate_child(
                        &mut child,
                        &mut child_acc,
                        child_pid,
                        job.as_ref(),
                        self.grace_period,
                    )
                    .await;
                    break child.wait().await;
                }
            }
        };

        // Pick up whatever is left in the pipes.
        if tokio::time::timeout(LEAK_TIMEOUT, child_acc.drain())
            .await
            .is_err()
        {
            debug!("output pipes still open {LEAK_TIMEOUT:?} after exit, leaked descendants?");
        }

        let result = match res {
            _ if timed_out => ExecutionResult::Timeout,
            Ok(exit_status) => ExecutionResult::from_exit_status(exit_status),
            Err(error) => ExecutionResult::ExecFail {
                reason: ExecFailReason::Wait(ChildFdError::Wait(Arc::new(error))),
            },
        };
        let result = check_status_files(result, env);

        let snapshot = stopwatch.snapshot();
        InvocationResult {
            slot,
            result,
            output: child_acc.output.freeze(),
            start_time: snapshot.start_time,
            duration: snapshot.duration,
            fd_errors: child_acc.errors,
            report_errors: Vec::new(),
            scratch_dir: None,
        }
    }
}

/// Applies the infrastructure failure and premature exit files a test may leave behind.
fn check_status_files(result: ExecutionResult, env: &RuntimeEnvironment) -> ExecutionResult {
    if let Some(path) = env.get_path(env_vars::TEST_INFRASTRUCTURE_FAILURE_FILE) {
        if let Some(message) = read_reason(path) {
            return ExecutionResult::ExecFail {
                reason: ExecFailReason::Reported { message },
            };
        }
    }

    if matches!(result, ExecutionResult::Pass) {
        if let Some(path) = env.get_path(env_vars::TEST_PREMATURE_EXIT_FILE) {
            if path.exists() {
                return ExecutionResult::Fail {
                    status: FailureStatus::PrematureExit,
                };
            }
        }
    }

    result
}

fn read_reason(path: &Utf8Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(contents) if !contents.is_empty() => {
            Some(String::from_utf8_lossy(&contents).into_owned())
        }
        Ok(_) => None,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
        Err(error) => {
            warn!("failed to read infrastructure failure file `{path}`: {error}");
            None
        }
    }
}
