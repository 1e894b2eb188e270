// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `testwrap` runs.
///
/// Orchestrators rely on these to tell "the tests ran and some failed" apart from "the wrapper
/// itself could not run the tests".
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum TestWrapExitCode {}

impl TestWrapExitCode {
    /// Every shard of the test passed.
    pub const OK: i32 = 0;

    /// Command-line arguments or configuration were invalid.
    pub const SETUP_ERROR: i32 = 2;

    /// The test ran, and at least one shard failed or timed out.
    ///
    /// This is distinct from [`Self::OK`] and from [`Self::INFRASTRUCTURE_FAILED`].
    pub const TESTS_FAILED: i32 = 3;

    /// `testwrap rlocation` did not find the logical path in the manifest.
    pub const RLOCATION_NOT_FOUND: i32 = 4;

    /// Runfiles resolution, environment construction or process launch failed, or the test
    /// reported an infrastructure failure.
    pub const INFRASTRUCTURE_FAILED: i32 = 36;

    /// Writing data to stdout, stderr or a report file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
