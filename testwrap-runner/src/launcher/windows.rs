// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::test_command::ChildAccumulator;
use std::time::Duration;
use tokio::process::Child;
pub(super) use win32job::Job;
use win32job::JobError;
use windows_sys::Win32::System::JobObjects::TerminateJobObject;

pub(super) fn create_job() -> Result<Job, JobError> {
    Job::create_with_limit_info(win32job::ExtendedLimitInfo::new().limit_breakaway_ok())
}

pub(super) fn set_process_group(_cmd: &mut std::process::Command) {}

pub(super) fn assign_process_to_job(child: &Child, job: Option<&Job>) -> Result<(), JobError> {
    if let Some(job) = job {
        let Some(handle) = child.raw_handle() else {
            // If the handle is missing, the child has exited. Ignore this.
            return Ok(());
        };
        job.assign_process(handle as isize)?;
    }
    Ok(())
}

/// Windows has no graceful termination for arbitrary console processes, so the job (or the
/// child, if no job exists) is killed right away.
pub(super) async fn terminate_child(
    child: &mut Child,
    _child_acc: &mut ChildAccumulator,
    _child_pid: Option<u32>,
    job: Option<&Job>,
    _grace_period: Duration,
) {
    if let Some(job) = job {
        let handle = job.handle();
        unsafe {
            // Ignore the error here -- it's likely due to the process exiting.
            // Note: 1 is the exit code returned by Windows.
            _ = TerminateJobObject(handle as _, 1);
        }
    }
    // In any case, kill the process directly as well.
    _ = child.start_kill();
}
