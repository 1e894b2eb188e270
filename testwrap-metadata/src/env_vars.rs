// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Names of environment variables exported to test binaries.
//!
//! These names are the contract a test binary observes: test code is entitled to rely on
//! them. See the documentation of each constant for when it is set.

/// Absolute path to a per-invocation scratch directory. Always set. Also the child's working
/// directory.
pub const TEST_TMPDIR: &str = "TEST_TMPDIR";

/// Absolute path to the runfiles root, which always contains the `MANIFEST` file. Always set.
pub const TEST_SRCDIR: &str = "TEST_SRCDIR";

/// Absolute path to the runfiles manifest. Always set.
pub const RUNFILES_MANIFEST_FILE: &str = "RUNFILES_MANIFEST_FILE";

/// Set to `1` when runfiles must be looked up through the manifest only. Absent otherwise.
pub const RUNFILES_MANIFEST_ONLY: &str = "RUNFILES_MANIFEST_ONLY";

/// Absolute path to the materialized runfiles tree. Only set when a tree was materialized.
pub const RUNFILES_DIR: &str = "RUNFILES_DIR";

/// Legacy alias of [`RUNFILES_DIR`] for Java rules.
pub const JAVA_RUNFILES: &str = "JAVA_RUNFILES";

/// Legacy alias of [`RUNFILES_DIR`] for Python rules.
pub const PYTHON_RUNFILES: &str = "PYTHON_RUNFILES";

/// The identity of the invoking user. Always set and non-empty.
pub const USER: &str = "USER";

/// A writable directory usable as a home directory. Always set and absolute.
pub const HOME: &str = "HOME";

/// The shard status channel. Only set for sharded tests. Its parent directory exists; the file
/// itself does not have to.
pub const TEST_SHARD_STATUS_FILE: &str = "TEST_SHARD_STATUS_FILE";

/// The 0-based index of this shard. Only set for sharded tests.
pub const TEST_SHARD_INDEX: &str = "TEST_SHARD_INDEX";

/// The total number of shards. Only set for sharded tests.
pub const TEST_TOTAL_SHARDS: &str = "TEST_TOTAL_SHARDS";

/// Same as [`TEST_SHARD_INDEX`], for GoogleTest.
pub const GTEST_SHARD_INDEX: &str = "GTEST_SHARD_INDEX";

/// Same as [`TEST_TOTAL_SHARDS`], for GoogleTest.
pub const GTEST_TOTAL_SHARDS: &str = "GTEST_TOTAL_SHARDS";

/// Same as [`TEST_TMPDIR`], for GoogleTest.
pub const GTEST_TMP_DIR: &str = "GTEST_TMP_DIR";

/// The label of the target under test. Only set when the orchestrator supplied one.
pub const TEST_TARGET: &str = "TEST_TARGET";

/// The name of the workspace the runfiles belong to. Always set.
pub const TEST_WORKSPACE: &str = "TEST_WORKSPACE";

/// Where the test may write a JUnit XML report. Always set; the parent directory exists.
pub const XML_OUTPUT_FILE: &str = "XML_OUTPUT_FILE";

/// `xml:` followed by [`XML_OUTPUT_FILE`].
pub const GUNIT_OUTPUT: &str = "GUNIT_OUTPUT";

/// A test that writes a non-empty reason to this file reports an infrastructure failure.
pub const TEST_INFRASTRUCTURE_FAILURE_FILE: &str = "TEST_INFRASTRUCTURE_FAILURE_FILE";

/// Test frameworks create this file at startup and remove it on orderly exit.
pub const TEST_PREMATURE_EXIT_FILE: &str = "TEST_PREMATURE_EXIT_FILE";

/// Directory for undeclared outputs. Only set when undeclared outputs were requested.
pub const TEST_UNDECLARED_OUTPUTS_DIR: &str = "TEST_UNDECLARED_OUTPUTS_DIR";

/// Directory for undeclared output annotations. Only set when undeclared outputs were
/// requested.
pub const TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR: &str = "TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR";

/// Wrapper-internal. Never exported to the test.
pub const TEST_UNDECLARED_OUTPUTS_MANIFEST: &str = "TEST_UNDECLARED_OUTPUTS_MANIFEST";

/// Wrapper-internal. Never exported to the test.
pub const TEST_UNDECLARED_OUTPUTS_ZIP: &str = "TEST_UNDECLARED_OUTPUTS_ZIP";

/// Wrapper-internal. Never exported to the test.
pub const TEST_UNDECLARED_OUTPUTS_ANNOTATIONS: &str = "TEST_UNDECLARED_OUTPUTS_ANNOTATIONS";

/// Variables that are only exported when undeclared outputs were requested.
pub const UNDECLARED_OUTPUTS_GATED: &[&str] = &[
    TEST_UNDECLARED_OUTPUTS_DIR,
    TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR,
];

/// Variables that are never exported to a test, whatever the caller passes in.
pub const NEVER_EXPORTED: &[&str] = &[
    TEST_UNDECLARED_OUTPUTS_MANIFEST,
    TEST_UNDECLARED_OUTPUTS_ZIP,
    TEST_UNDECLARED_OUTPUTS_ANNOTATIONS,
];

/// Variables the wrapper owns. Passthrough and explicit test environment values for these
/// names are dropped.
pub const WRAPPER_OWNED: &[&str] = &[
    TEST_TMPDIR,
    TEST_SRCDIR,
    RUNFILES_MANIFEST_FILE,
    RUNFILES_MANIFEST_ONLY,
    RUNFILES_DIR,
    JAVA_RUNFILES,
    PYTHON_RUNFILES,
    TEST_SHARD_STATUS_FILE,
    TEST_SHARD_INDEX,
    TEST_TOTAL_SHARDS,
    GTEST_SHARD_INDEX,
    GTEST_TOTAL_SHARDS,
    GTEST_TMP_DIR,
    TEST_TARGET,
    TEST_WORKSPACE,
    XML_OUTPUT_FILE,
    GUNIT_OUTPUT,
    TEST_INFRASTRUCTURE_FAILURE_FILE,
    TEST_PREMATURE_EXIT_FILE,
];
