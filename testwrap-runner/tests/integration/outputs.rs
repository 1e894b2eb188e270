// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use testwrap_runner::{outcome::Verdict, shard::ShardTotal, target::TestTarget};

#[test]
fn reports_in_logs_dir() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/failing_test", "echo some output\nexit 1\n")?;

    let mut target = TestTarget::new("foo/failing_test");
    target
        .set_label("//foo:failing_test")
        .set_logs_dir(Some(root.logs_dir()));
    let outcome = root.run(&target)?;
    assert_eq!(outcome.verdict(), Verdict::Fail);

    let xml = std::fs::read_to_string(root.logs_dir().join("test.xml"))?;
    assert!(xml.contains("//foo:failing_test"), "xml: {xml}");
    assert!(xml.contains("<failure"), "xml: {xml}");

    let log = std::fs::read_to_string(root.logs_dir().join("test.log"))?;
    assert!(
        log.starts_with("Executing tests from //foo:failing_test\n"),
        "log: {log}"
    );
    assert!(log.contains("some output\n"), "log: {log}");
    assert!(outcome.results()[0].report_errors().is_empty());
    Ok(())
}

#[test]
fn test_written_xml_is_kept() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script(
        "foo/xml_test",
        "echo '<testsuites name=\"from-the-test\"/>' > \"$XML_OUTPUT_FILE\"\n",
    )?;

    let mut target = TestTarget::new("foo/xml_test");
    target.set_logs_dir(Some(root.logs_dir()));
    let outcome = root.run(&target)?;
    assert_eq!(outcome.verdict(), Verdict::Pass);

    let xml = std::fs::read_to_string(root.logs_dir().join("test.xml"))?;
    assert_eq!(xml, "<testsuites name=\"from-the-test\"/>\n");
    Ok(())
}

#[test]
fn sharded_logs_dirs() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script("foo/sharded_test", "echo shard $TEST_SHARD_INDEX\n")?;

    let mut target = TestTarget::new("foo/sharded_test");
    target
        .set_shard_total(ShardTotal::new(2).expect("non-zero"))
        .set_logs_dir(Some(root.logs_dir()))
        .set_echo(false);
    let outcome = root.run(&target)?;
    assert_eq!(outcome.verdict(), Verdict::Pass);

    for (dir, expected) in [("shard_1_of_2", "shard 0\n"), ("shard_2_of_2", "shard 1\n")] {
        let dir = root.logs_dir().join(dir);
        assert!(dir.join("test.xml").is_file(), "{dir}/test.xml missing");
        let log = std::fs::read_to_string(dir.join("test.log"))?;
        assert_eq!(log, expected, "no marker with echo disabled");
    }
    Ok(())
}

#[test]
fn undeclared_outputs() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    root.write_script(
        "foo/outputs_test",
        indoc! {r#"
            mkdir -p "$TEST_UNDECLARED_OUTPUTS_DIR/nested"
            printf 'hello' > "$TEST_UNDECLARED_OUTPUTS_DIR/nested/out.txt"
            printf '123' > "$TEST_UNDECLARED_OUTPUTS_DIR/a.bin"
            echo first > "$TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR/1.part"
            echo second > "$TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR/2.part"
            echo ignored > "$TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR/notes.txt"
        "#},
    )?;

    let mut target = TestTarget::new("foo/outputs_test");
    target
        .set_logs_dir(Some(root.logs_dir()))
        .set_undeclared_outputs(true);
    let outcome = root.run(&target)?;
    assert_eq!(outcome.verdict(), Verdict::Pass);

    let outputs_dir = root.logs_dir().join("test.outputs");
    assert_eq!(
        std::fs::read_to_string(outputs_dir.join("nested/out.txt"))?,
        "hello"
    );

    let manifest_dir = root.logs_dir().join("test.outputs_manifest");
    assert_eq!(
        std::fs::read_to_string(manifest_dir.join("MANIFEST"))?,
        indoc! {"
            a.bin\t3\tapplication/octet-stream
            nested/out.txt\t5\tapplication/octet-stream
        "}
    );
    assert_eq!(
        std::fs::read_to_string(manifest_dir.join("ANNOTATIONS"))?,
        "first\nsecond\n"
    );
    Ok(())
}

#[test]
fn rerun_into_same_logs_dir() -> Result<()> {
    test_init();
    let root = ExecRoot::new()?;
    let broken = root.path().join("broken");
    root.write_script(
        "foo/flaky_test",
        &format!(
            indoc! {r#"
                if [ -e {broken} ]; then
                    echo second run
                    exit 1
                fi
                echo first run
                printf 'ok' > "$TEST_UNDECLARED_OUTPUTS_DIR/old.txt"
                echo note > "$TEST_UNDECLARED_OUTPUTS_ANNOTATIONS_DIR/1.part"
            "#},
            broken = broken,
        ),
    )?;

    let mut target = TestTarget::new("foo/flaky_test");
    target
        .set_label("//foo:flaky_test")
        .set_logs_dir(Some(root.logs_dir()))
        .set_undeclared_outputs(true)
        .set_echo(false);

    let outcome = root.run(&target)?;
    assert_eq!(outcome.verdict(), Verdict::Pass);
    let manifest_dir = root.logs_dir().join("test.outputs_manifest");
    assert!(manifest_dir.join("MANIFEST").is_file());
    assert!(manifest_dir.join("ANNOTATIONS").is_file());

    std::fs::write(&broken, "")?;
    let outcome = root.run(&target)?;
    assert_eq!(outcome.verdict(), Verdict::Fail);

    let xml = std::fs::read_to_string(root.logs_dir().join("test.xml"))?;
    assert!(xml.contains("<failure"), "report describes the second run: {xml}");
    assert_eq!(
        std::fs::read_to_string(root.logs_dir().join("test.log"))?,
        "second run\n"
    );
    assert!(!root.logs_dir().join("test.outputs/old.txt").exists());
    assert!(!manifest_dir.join("MANIFEST").exists());
    assert!(!manifest_dir.join("ANNOTATIONS").exists());
    Ok(())
}
