// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::test_command::ChildAccumulator;
use libc::{SIGKILL, SIGTERM};
use std::{convert::Infallible, os::unix::process::CommandExt, time::Duration};
use tokio::process::Child;
use tracing::debug;

/// Runs the child in its own process group, so termination reaches its descendants too.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

#[derive(Debug)]
pub(super) struct Job(());

pub(super) fn create_job() -> Result<Job, Infallible> {
    Ok(Job(()))
}

pub(super) fn assign_process_to_job(
    _child: &Child,
    _job: Option<&Job>,
) -> Result<(), Infallible> {
    Ok(())
}

/// Sends SIGTERM to the child's process group, then SIGKILL if it's still around after
/// `grace_period`.
pub(super) async fn terminate_child(
    child: &mut Child,
    child_acc: &mut ChildAccumulator,
    child_pid: Option<u32>,
    _job: Option<&Job>,
    grace_period: Duration,
) {
    let Some(pid) = child_pid else {
        return;
    };
    if child.id().is_none() {
        // The child was already reaped.
        return;
    }
    // A negative PID addresses the whole process group.
    let pgid = -(pid as libc::pid_t);

    if grace_period.is_zero() {
        unsafe { libc::kill(pgid, SIGKILL) };
        return;
    }

    unsafe { libc::kill(pgid, SIGTERM) };

    let mut sleep = std::pin::pin!(tokio::time::sleep(grace_period));
    loop {
        tokio::select! {
            () = child_acc.fill_buf(), if !child_acc.fds.is_done() => {}
            _ = child.wait() => {
                debug!("child exited after SIGTERM");
                break;
            }
            () = &mut sleep => {
                debug!("grace period of {grace_period:?} elapsed, sending SIGKILL");
                unsafe { libc::kill(pgid, SIGKILL) };
                break;
            }
        }
    }
}
