// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use std::{
    collections::HashSet,
    time::{Duration, Instant},
};
use testwrap_metadata::{TestWrapExitCode, env_vars};
use testwrap_runner::{outcome::Verdict, shard::ShardTotal, target::TestTarget};

fn sharded(program: &str, total: u32) -> TestTarget {
    let mut target = TestTarget::new(program);
    target
        .set_label("//foo:sharded_test")
        .set_shard_total(ShardTotal::new(total).expect("total is non-zero"));
    target
}

#[test]
fn every_shard_sees_its_index() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script(
        "foo/sharded_test",
        "touch \"$TEST_SHARD_STATUS_FILE\"\nenv\n",
    )?;

    let outcome = root.run(&sharded("foo/sharded_test", 3))?;

    assert_eq!(outcome.verdict(), Verdict::Pass);
    assert_eq!(outcome.results().len(), 3);

    let mut tmp_dirs = HashSet::new();
    for (index, result) in outcome.results().iter().enumerate() {
        assert_eq!(result.slot().index() as usize, index, "results are ordered by index");
        let env = parse_env(&stdout_str(result));
        let index = index.to_string();
        assert_eq!(env_value(&env, env_vars::TEST_SHARD_INDEX), Some(index.as_str()));
        assert_eq!(env_value(&env, env_vars::GTEST_SHARD_INDEX), Some(index.as_str()));
        assert_eq!(env_value(&env, env_vars::TEST_TOTAL_SHARDS), Some("3"));
        assert_eq!(env_value(&env, env_vars::GTEST_TOTAL_SHARDS), Some("3"));
        assert!(env_value(&env, env_vars::TEST_SHARD_STATUS_FILE).is_some());

        let tmp_dir = env_value(&env, env_vars::TEST_TMPDIR).expect("TEST_TMPDIR is set");
        ensure!(
            tmp_dirs.insert(tmp_dir.to_owned()),
            "shard {index} shares TEST_TMPDIR {tmp_dir} with another shard"
        );
    }
    Ok(())
}

#[test]
fn timed_out_shard_does_not_affect_siblings() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script(
        "foo/sharded_test",
        "if [ \"$TEST_SHARD_INDEX\" = 1 ]; then exec sleep 30; fi\necho done\n",
    )?;

    let mut target = sharded("foo/sharded_test", 3);
    target.set_timeout(Some(Duration::from_millis(500)));
    let start = Instant::now();
    let outcome = root.run(&target)?;

    ensure!(
        start.elapsed() < Duration::from_secs(20),
        "timed-out shard was not terminated promptly"
    );
    assert_eq!(outcome.verdict(), Verdict::Fail);
    assert_eq!(outcome.exit_code(), TestWrapExitCode::TESTS_FAILED);

    let verdicts: Vec<_> = outcome.results().iter().map(|r| r.verdict()).collect();
    assert_eq!(verdicts, [Verdict::Pass, Verdict::Fail, Verdict::Pass]);
    assert!(outcome.results()[1].result().is_timeout());
    assert_eq!(stdout_str(&outcome.results()[0]), "done\n");
    assert_eq!(stdout_str(&outcome.results()[2]), "done\n");
    Ok(())
}

#[test]
fn infrastructure_error_outranks_failure() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script(
        "foo/sharded_test",
        "case \"$TEST_SHARD_INDEX\" in\n\
         0) exit 1 ;;\n\
         1) echo flaky runner > \"$TEST_INFRASTRUCTURE_FAILURE_FILE\" ;;\n\
         esac\n",
    )?;

    let outcome = root.run(&sharded("foo/sharded_test", 3))?;

    let verdicts: Vec<_> = outcome.results().iter().map(|r| r.verdict()).collect();
    assert_eq!(
        verdicts,
        [Verdict::Fail, Verdict::InfrastructureError, Verdict::Pass]
    );
    assert_eq!(outcome.verdict(), Verdict::InfrastructureError);
    assert_eq!(outcome.exit_code(), TestWrapExitCode::INFRASTRUCTURE_FAILED);
    Ok(())
}

#[test]
fn serial_shards_with_concurrency_one() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    // Each shard fails if another shard's lock file is present.
    let lock = root.path().join("lock");
    root.write_script(
        "foo/sharded_test",
        &format!("[ -e {lock} ] && exit 1\ntouch {lock}\nsleep 0.2\nrm {lock}\n"),
    )?;

    let mut builder = root.runner_builder();
    builder.set_max_concurrent_shards(1);
    let outcome = builder.build()?.run(&sharded("foo/sharded_test", 3));

    assert_eq!(outcome.verdict(), Verdict::Pass);
    assert_eq!(outcome.results().len(), 3);
    Ok(())
}
