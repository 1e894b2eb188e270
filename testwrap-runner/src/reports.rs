// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reports written after a shard finishes: the default JUnit XML report, the test log and the
//! undeclared outputs manifest.
//!
//! Errors here never change a shard's verdict.

use crate::{
    errors::ReportWriteError,
    helpers::convert_rel_path_to_forward_slash,
    outcome::{ExecutionResult, InvocationResult},
    scratch::UndeclaredOutputPaths,
};
use camino::{Utf8Path, Utf8PathBuf};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::{
    fs::File,
    io::{BufWriter, Write},
    sync::Arc,
};

static STDOUT_NOT_CAPTURED: &str = "(stdout not captured)";
static STDERR_NOT_CAPTURED: &str = "(stderr not captured)";
static PROCESS_FAILED_TO_START: &str = "(process failed to start)";

/// The MIME type recorded for every undeclared output.
const UNDECLARED_OUTPUT_MIME_TYPE: &str = "application/octet-stream";

/// Returns the marker printed at the start of every shard's log.
pub fn start_marker(label: Option<&str>) -> String {
    let target = match label {
        Some(label) if !label.is_empty() => label,
        _ => "unknown target",
    };
    format!("Executing tests from {target}\n{}\n", "-".repeat(77))
}

/// Writes a JUnit report for `result` to `path`, unless the test already wrote one.
///
/// Returns true if a report was written.
pub(crate) fn write_default_junit(
    path: &Utf8Path,
    label: Option<&str>,
    result: &InvocationResult,
) -> Result<bool, ReportWriteError> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.len() > 0 => return Ok(false),
        Ok(_) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => return Err(fs_error(path, error)),
    }

    let name = label.unwrap_or("test");
    let status = match result.result() {
        ExecutionResult::Pass => TestCaseStatus::success(),
        other => {
            let (kind, ty) = match other {
                ExecutionResult::ExecFail { .. } => (NonSuccessKind::Error, "execution failure"),
                ExecutionResult::Timeout => (NonSuccessKind::Failure, "timeout"),
                _ => (NonSuccessKind::Failure, "failure"),
            };
            let mut status = TestCaseStatus::non_success(kind);
            status.set_type(ty).set_message(other.to_string());
            status
        }
    };

    let mut testcase = TestCase::new(name, status);
    testcase
        .set_timestamp(result.start_time())
        .set_time(result.duration());
    if let ExecutionResult::ExecFail { .. } = result.result() {
        if result.output().is_empty() {
            testcase
                .set_system_out(PROCESS_FAILED_TO_START)
                .set_system_err(PROCESS_FAILED_TO_START);
        }
    } else {
        let output = result.output();
        match &output.stdout {
            Some(_) => testcase.set_system_out(output.stdout_lossy()),
            None => testcase.set_system_out(STDOUT_NOT_CAPTURED),
        };
        match &output.stderr {
            Some(_) => testcase.set_system_err(output.stderr_lossy()),
            None => testcase.set_system_err(STDERR_NOT_CAPTURED),
        };
    }

    let slot = result.slot();
    let mut suite = TestSuite::new(name);
    if slot.is_sharded() {
        suite.add_property(("shard".to_owned(), slot.logs_dir_name()));
    }
    suite.add_test_case(testcase);

    let mut report = Report::new(name);
    report
        .set_timestamp(result.start_time())
        .set_time(result.duration())
        .add_test_suite(suite);

    let f = File::create(path).map_err(|error| fs_error(path, error))?;
    report
        .serialize(BufWriter::new(f))
        .map_err(|error| ReportWriteError::Junit {
            file: path.to_owned(),
            error: Arc::new(error),
        })?;
    Ok(true)
}

/// Writes the start marker (if any) and the captured output to the test log.
pub(crate) fn write_test_log(
    path: &Utf8Path,
    marker: Option<&str>,
    result: &InvocationResult,
) -> Result<(), ReportWriteError> {
    let f = File::create(path).map_err(|error| fs_error(path, error))?;
    let mut writer = BufWriter::new(f);
    let output = result.output();
    let res = (|| {
        if let Some(marker) = marker {
            writer.write_all(marker.as_bytes())?;
        }
        if let Some(stdout) = &output.stdout {
            writer.write_all(stdout)?;
        }
        if let Some(stderr) = &output.stderr {
            writer.write_all(stderr)?;
        }
        writer.flush()
    })();
    res.map_err(|error| fs_error(path, error))
}

/// Writes the undeclared outputs manifest and the concatenated annotations.
///
/// The manifest has one `<relative path>\t<size>\t<mime type>` line per file, sorted by path.
/// Nothing is written if the test produced no outputs or annotations.
pub(crate) fn write_undeclared_outputs(
    paths: &UndeclaredOutputPaths,
) -> Result<(), ReportWriteError> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(paths.dir()).sort_by_file_name() {
        let entry = entry.map_err(|error| {
            let file = entry_path(&error).unwrap_or_else(|| paths.dir().to_owned());
            fs_error(&file, error.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
            fs_error(
                paths.dir(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, "path is not valid UTF-8"),
            )
        })?;
        let rel = path
            .strip_prefix(paths.dir())
            .expect("walkdir entries are under the root");
        let size = entry
            .metadata()
            .map_err(|error| fs_error(path, error.into()))?
            .len();
        entries.push((convert_rel_path_to_forward_slash(rel), size));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if !entries.is_empty() {
        let contents: String = entries
            .iter()
            .map(|(rel, size)| format!("{rel}\t{size}\t{UNDECLARED_OUTPUT_MIME_TYPE}\n"))
            .collect();
        write_creating_parent(paths.manifest_file(), contents.as_bytes())?;
    }

    let mut parts: Vec<Utf8PathBuf> = Vec::new();
    let read_dir = paths
        .annotations_dir()
        .read_dir_utf8()
        .map_err(|error| fs_error(paths.annotations_dir(), error))?;
    for entry in read_dir {
        let entry = entry.map_err(|error| fs_error(paths.annotations_dir(), error))?;
        if entry.path().extension() == Some("part") && entry.path().is_file() {
            parts.push(entry.into_path());
        }
    }
    parts.sort();

    if !parts.is_empty() {
        let mut annotations = Vec::new();
        for part in &parts {
            let contents = std::fs::read(part).map_err(|error| fs_error(part, error))?;
            annotations.extend_from_slice(&contents);
        }
        write_creating_parent(paths.annotations_file(), &annotations)?;
    }

    Ok(())
}

fn write_creating_parent(path: &Utf8Path, contents: &[u8]) -> Result<(), ReportWriteError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| fs_error(parent, error))?;
    }
    std::fs::write(path, contents).map_err(|error| fs_error(path, error))
}

fn entry_path(error: &walkdir::Error) -> Option<Utf8PathBuf> {
    error
        .path()
        .and_then(|path| Utf8Path::from_path(path))
        .map(ToOwned::to_owned)
}

fn fs_error(file: &Utf8Path, error: std::io::Error) -> ReportWriteError {
    ReportWriteError::Fs {
        file: file.to_owned(),
        error: Arc::new(error),
    }
}
