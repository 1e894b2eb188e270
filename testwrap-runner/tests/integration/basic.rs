// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};
use testwrap_metadata::{TestWrapExitCode, env_vars};
use testwrap_runner::{
    errors::SetupError,
    outcome::{ExecFailReason, ExecutionResult, FailureStatus, Verdict},
    runfiles::{ResolutionPolicy, RuntimeDependency},
    target::{TestEnvEntry, TestTarget},
};

#[test]
fn passing_test() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/passing_test", "echo hello from the test\n")?;

    let mut target = TestTarget::new("foo/passing_test");
    target.set_label("//foo:passing_test");
    let outcome = root.run(&target)?;

    assert_eq!(outcome.verdict(), Verdict::Pass);
    assert_eq!(outcome.exit_code(), TestWrapExitCode::OK);
    assert!(outcome.setup_error().is_none());
    assert_eq!(outcome.results().len(), 1);

    let result = &outcome.results()[0];
    assert_eq!(result.exit_code(), Some(0));
    assert_eq!(stdout_str(result), "hello from the test\n");
    Ok(())
}

#[test]
fn failing_test() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/failing_test", "echo oops >&2\nexit 3\n")?;

    let outcome = root.run(&TestTarget::new("foo/failing_test"))?;

    assert_eq!(outcome.verdict(), Verdict::Fail);
    assert_eq!(outcome.exit_code(), TestWrapExitCode::TESTS_FAILED);
    let result = &outcome.results()[0];
    assert!(
        matches!(
            result.result(),
            ExecutionResult::Fail {
                status: FailureStatus::ExitCode(3)
            }
        ),
        "unexpected result: {:?}",
        result.result()
    );
    assert_eq!(
        result.output().stderr.as_deref(),
        Some(&b"oops\n"[..]),
        "stderr is captured separately"
    );
    Ok(())
}

#[test]
fn test_arguments_are_passed_through() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/args_test", "printf '%s\\n' \"$@\"\n")?;

    let mut target = TestTarget::new("foo/args_test");
    target.set_args(["--gtest_filter=*", "with space"]);
    let outcome = root.run(&target)?;

    assert_eq!(outcome.verdict(), Verdict::Pass);
    assert_eq!(
        stdout_str(&outcome.results()[0]),
        "--gtest_filter=*\nwith space\n"
    );
    Ok(())
}

#[test]
fn environment_is_hermetic() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/env_test", "env\n")?;

    let mut target = TestTarget::new("foo/env_test");
    target
        .set_label("//foo:env_test")
        .add_test_env([
            TestEnvEntry::new("MY_FLAG", "on"),
            TestEnvEntry::new(env_vars::TEST_TMPDIR, "/ignored"),
        ]);
    let outcome = root.run(&target)?;
    assert_eq!(outcome.verdict(), Verdict::Pass);

    let env = parse_env(&stdout_str(&outcome.results()[0]));
    assert_eq!(env_value(&env, env_vars::TEST_TARGET), Some("//foo:env_test"));
    assert_eq!(env_value(&env, env_vars::TEST_WORKSPACE), Some("_main"));
    assert_eq!(env_value(&env, env_vars::USER), Some("tester"));
    assert_eq!(env_value(&env, "MY_FLAG"), Some("on"));
    assert_eq!(env_value(&env, env_vars::RUNFILES_MANIFEST_ONLY), Some("1"));
    assert_eq!(env_value(&env, env_vars::RUNFILES_DIR), None);
    assert_eq!(env_value(&env, env_vars::TEST_SHARD_INDEX), None);
    assert_eq!(env_value(&env, env_vars::TEST_UNDECLARED_OUTPUTS_DIR), None);

    let tmp_dir = env_value(&env, env_vars::TEST_TMPDIR).expect("TEST_TMPDIR is set");
    assert_ne!(tmp_dir, "/ignored", "wrapper-owned variables can't be overridden");
    assert!(tmp_dir.starts_with(root.scratch_root().as_str()));
    assert_eq!(env_value(&env, env_vars::HOME), Some(tmp_dir));
    assert_eq!(env_value(&env, env_vars::GTEST_TMP_DIR), Some(tmp_dir));

    let xml = env_value(&env, env_vars::XML_OUTPUT_FILE).expect("XML_OUTPUT_FILE is set");
    assert_eq!(
        env_value(&env, env_vars::GUNIT_OUTPUT),
        Some(format!("xml:{xml}").as_str())
    );

    // Only the passthrough list makes it from the wrapper's own environment.
    let names: Vec<_> = env.iter().map(|(name, _)| name.as_str()).collect();
    assert!(!names.contains(&"CARGO_PKG_NAME"), "env: {names:?}");
    Ok(())
}

#[test]
fn runfiles_manifest_only() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_file("foo/data.txt", "some data\n")?;
    root.write_script(
        "foo/data_test",
        "path=$(sed -n 's|^_main/foo/data.txt ||p' \"$RUNFILES_MANIFEST_FILE\")\ncat \"$path\"\n",
    )?;

    let mut target = TestTarget::new("foo/data_test");
    target.add_dependencies([RuntimeDependency::new("_main/foo/data.txt", "foo/data.txt")]);
    let outcome = root.run(&target)?;

    assert_eq!(outcome.verdict(), Verdict::Pass);
    assert_eq!(stdout_str(&outcome.results()[0]), "some data\n");
    Ok(())
}

#[test]
fn runfiles_tree() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_file("foo/data.txt", "tree data\n")?;
    root.write_script(
        "foo/tree_test",
        "cat \"$RUNFILES_DIR/_main/foo/data.txt\"\n[ \"$TEST_SRCDIR\" = \"$RUNFILES_DIR\" ]\n",
    )?;

    let mut target = TestTarget::new("foo/tree_test");
    target
        .add_dependencies([RuntimeDependency::new("_main/foo/data.txt", "foo/data.txt")])
        .set_policy(ResolutionPolicy::MaterializedTree);
    let outcome = root.run(&target)?;

    let result = &outcome.results()[0];
    assert_eq!(outcome.verdict(), Verdict::Pass, "result: {:?}", result.result());
    assert_eq!(stdout_str(result), "tree data\n");
    Ok(())
}

#[test]
fn missing_dependency_is_setup_error() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/passing_test", "exit 0\n")?;

    let mut target = TestTarget::new("foo/passing_test");
    target.add_dependencies([RuntimeDependency::new("_main/foo/missing.txt", "foo/missing.txt")]);
    let outcome = root.run(&target)?;

    assert_eq!(outcome.verdict(), Verdict::InfrastructureError);
    assert_eq!(outcome.exit_code(), TestWrapExitCode::INFRASTRUCTURE_FAILED);
    assert!(matches!(
        outcome.setup_error(),
        Some(SetupError::Runfiles(_))
    ));
    assert!(outcome.results().is_empty(), "no shard is launched");
    Ok(())
}

#[test]
fn missing_program_is_infrastructure_error() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;

    let outcome = root.run(&TestTarget::new("foo/does_not_exist"))?;

    assert_eq!(outcome.verdict(), Verdict::InfrastructureError);
    let result = &outcome.results()[0];
    assert!(
        matches!(
            result.result(),
            ExecutionResult::ExecFail {
                reason: ExecFailReason::Start(_)
            }
        ),
        "unexpected result: {:?}",
        result.result()
    );
    Ok(())
}

#[test]
fn timeout_terminates_test() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/slow_test", "exec sleep 30\n")?;

    let mut target = TestTarget::new("foo/slow_test");
    target.set_timeout(Some(Duration::from_millis(500)));
    let start = Instant::now();
    let outcome = root.run(&target)?;

    ensure!(
        start.elapsed() < Duration::from_secs(20),
        "test was not terminated promptly"
    );
    assert_eq!(outcome.verdict(), Verdict::Fail);
    assert!(outcome.results()[0].result().is_timeout());
    Ok(())
}

#[test]
fn infrastructure_failure_file() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script(
        "foo/infra_test",
        "echo 'no device available' > \"$TEST_INFRASTRUCTURE_FAILURE_FILE\"\nexit 0\n",
    )?;

    let outcome = root.run(&TestTarget::new("foo/infra_test"))?;

    assert_eq!(outcome.verdict(), Verdict::InfrastructureError);
    match outcome.results()[0].result() {
        ExecutionResult::ExecFail {
            reason: ExecFailReason::Reported { message },
        } => assert_eq!(message.trim_end(), "no device available"),
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn premature_exit_file() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script(
        "foo/early_exit_test",
        "touch \"$TEST_PREMATURE_EXIT_FILE\"\nexit 0\n",
    )?;
    root.write_script(
        "foo/clean_exit_test",
        "touch \"$TEST_PREMATURE_EXIT_FILE\"\nrm \"$TEST_PREMATURE_EXIT_FILE\"\nexit 0\n",
    )?;

    let outcome = root.run(&TestTarget::new("foo/early_exit_test"))?;
    assert_eq!(outcome.verdict(), Verdict::Fail);
    assert!(matches!(
        outcome.results()[0].result(),
        ExecutionResult::Fail {
            status: FailureStatus::PrematureExit
        }
    ));

    let outcome = root.run(&TestTarget::new("foo/clean_exit_test"))?;
    assert_eq!(outcome.verdict(), Verdict::Pass);
    Ok(())
}

#[test]
fn keep_scratch() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_file("foo/data.txt", "kept\n")?;
    root.write_script("foo/passing_test", "touch scratch_marker\n")?;

    let mut target = TestTarget::new("foo/passing_test");
    target.add_dependencies([RuntimeDependency::new("_main/foo/data.txt", "foo/data.txt")]);
    let mut builder = root.runner_builder();
    builder.set_keep_scratch(true);
    let outcome = builder.build()?.run(&target);

    assert_eq!(outcome.verdict(), Verdict::Pass);
    let runfiles_dir = outcome.runfiles_dir().expect("runfiles dir kept");
    assert!(runfiles_dir.is_dir());
    let scratch_dir = outcome.results()[0]
        .scratch_dir()
        .expect("scratch dir kept");
    assert!(
        scratch_dir.join("tmp/scratch_marker").is_file(),
        "the test runs in its scratch tmp dir"
    );
    Ok(())
}

#[test]
fn scratch_is_removed_by_default() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/passing_test", "exit 0\n")?;

    let outcome = root.run(&TestTarget::new("foo/passing_test"))?;

    assert_eq!(outcome.verdict(), Verdict::Pass);
    assert!(outcome.runfiles_dir().is_none());
    assert!(outcome.results()[0].scratch_dir().is_none());
    let leftovers: Vec<_> = root
        .scratch_root()
        .read_dir_utf8()?
        .collect::<Result<_, _>>()?;
    assert!(leftovers.is_empty(), "scratch root not empty: {leftovers:?}");
    Ok(())
}
