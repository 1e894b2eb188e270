// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawning test processes and collecting their output.

use crate::{
    errors::ChildFdError,
    test_output::{CaptureStrategy, ChildSplitOutput},
};
use bytes::BytesMut;
use std::{io, process::Stdio, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child as TokioChild, ChildStderr, ChildStdout},
};

/// A spawned child process along with its file descriptors.
pub(crate) struct Child {
    pub child: TokioChild,
    pub child_fds: ChildFds,
}

/// Spawns `cmd` with stdin set to null and output handled according to `strategy`.
pub(crate) fn spawn(
    mut cmd: std::process::Command,
    strategy: CaptureStrategy,
) -> io::Result<Child> {
    cmd.stdin(Stdio::null());
    if strategy == CaptureStrategy::Split {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    let mut cmd: tokio::process::Command = cmd.into();
    // If the wrapper goes away mid-test, don't leave the child running.
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;

    let child_fds = match strategy {
        CaptureStrategy::None => ChildFds::new(None, None),
        CaptureStrategy::Split => ChildFds::new(child.stdout.take(), child.stderr.take()),
    };

    Ok(Child { child, child_fds })
}

/// The size of each buffered reader's buffer.
///
/// This size is not totally arbitrary, but rather the (normal) page size on most systems.
const CHUNK_SIZE: usize = 4 * 1024;

/// A `BufReader` over an `AsyncRead` that tracks whether it has reached EOF.
pub(crate) struct FusedBufReader<R> {
    reader: BufReader<R>,
    done: bool,
}

impl<R: AsyncRead + Unpin> FusedBufReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(CHUNK_SIZE, reader),
            done: false,
        }
    }

    pub(crate) async fn fill_buf(&mut self, acc: &mut BytesMut) -> Result<(), io::Error> {
        if self.done {
            return Ok(());
        }

        match self.reader.fill_buf().await {
            Ok(buf) => {
                acc.extend_from_slice(buf);
                if buf.is_empty() {
                    self.done = true;
                }
                let len = buf.len();
                self.reader.consume(len);
                Ok(())
            }
            Err(error) => {
                self.done = true;
                Err(error)
            }
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

async fn fill_buf_opt<R: AsyncRead + Unpin>(
    reader: Option<&mut FusedBufReader<R>>,
    acc: &mut BytesMut,
) -> Result<(), io::Error> {
    match reader {
        Some(reader) => reader.fill_buf(acc).await,
        None => Ok(()),
    }
}

fn is_done_opt<R: AsyncRead + Unpin>(reader: Option<&FusedBufReader<R>>) -> bool {
    reader.is_none_or(|r| r.is_done())
}

/// Separate stdout and stderr readers. A stream that isn't captured is `None`.
pub(crate) struct ChildFds {
    stdout: Option<FusedBufReader<ChildStdout>>,
    stderr: Option<FusedBufReader<ChildStderr>>,
}

impl ChildFds {
    pub(crate) fn new(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Self {
        Self {
            stdout: stdout.map(FusedBufReader::new),
            stderr: stderr.map(FusedBufReader::new),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        is_done_opt(self.stdout.as_ref()) && is_done_opt(self.stderr.as_ref())
    }

    /// Reads whatever is available from either stream into `acc`.
    ///
    /// This is cancel-safe, since [`AsyncBufReadExt::fill_buf`] is.
    async fn fill_buf(&mut self, acc: &mut ChildOutputMut) -> Result<(), ChildFdError> {
        tokio::select! {
            res = fill_buf_opt(self.stdout.as_mut(), &mut acc.stdout), if !is_done_opt(self.stdout.as_ref()) => {
                res.map_err(|error| ChildFdError::ReadStdout(Arc::new(error)))
            }
            res = fill_buf_opt(self.stderr.as_mut(), &mut acc.stderr), if !is_done_opt(self.stderr.as_ref()) => {
                res.map_err(|error| ChildFdError::ReadStderr(Arc::new(error)))
            }
            // If both are done, do nothing.
            else => Ok(()),
        }
    }
}

/// Output being collected from a child process.
pub(crate) struct ChildOutputMut {
    stdout: BytesMut,
    stderr: BytesMut,
    stdout_captured: bool,
    stderr_captured: bool,
}

impl ChildOutputMut {
    /// Marks the collection as done.
    pub(crate) fn freeze(self) -> ChildSplitOutput {
        ChildSplitOutput {
            stdout: self.stdout_captured.then(|| self.stdout.freeze()),
            stderr: self.stderr_captured.then(|| self.stderr.freeze()),
        }
    }
}

/// Output and read errors accumulated for a child process.
pub(crate) struct ChildAccumulator {
    pub(crate) fds: ChildFds,
    pub(crate) output: ChildOutputMut,
    pub(crate) errors: Vec<ChildFdError>,
}

impl ChildAccumulator {
    pub(crate) fn new(fds: ChildFds) -> Self {
        let output = ChildOutputMut {
            stdout: BytesMut::with_capacity(CHUNK_SIZE),
            stderr: BytesMut::with_capacity(CHUNK_SIZE),
            stdout_captured: fds.stdout.is_some(),
            stderr_captured: fds.stderr.is_some(),
        };
        Self {
            fds,
            output,
            errors: Vec::new(),
        }
    }

    pub(crate) async fn fill_buf(&mut self) {
        if let Err(error) = self.fds.fill_buf(&mut self.output).await {
            self.errors.push(error);
        }
    }

    /// Reads the remaining output until both streams reach EOF.
    pub(crate) async fn drain(&mut self) {
        while !self.fds.is_done() {
            self.fill_buf().await;
        }
    }
}
