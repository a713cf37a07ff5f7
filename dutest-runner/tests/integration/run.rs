// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end runs against runner processes written as shell scripts.

#![cfg(unix)]

use crate::fixtures::test_init;
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use dutest_protocol::{DutestExitCode, RunnerArgs, RunnerMode};
use dutest_runner::{
    errors::{ListTestsError, RunTestsError, RunnerSpawnError},
    ledger::TestStatus,
    record::{
        RESULTS_FILE_NAME, STREAMED_RESULTS_FILE_NAME, TIMING_FILE_NAME, read_results,
        read_streamed_results,
    },
    runner::{
        RUN_STAGE_NAME, RunStatus, TEST_LOG_FILE_NAME, TESTS_DIR_NAME, TestRunnerBuilder,
        UNFINISHED_TEST_REASON, list_tests,
    },
    target::LocalTarget,
    timing::TimingLog,
};
use indoc::formatdoc;
use pretty_assertions::assert_eq;
use std::time::Duration;

/// Writes a runner script that saves its arguments next to itself and then runs `body`.
fn runner_script(dir: &Utf8Path, body: &str) -> Result<(Utf8PathBuf, Utf8PathBuf)> {
    let script = dir.join("runner.sh");
    std::fs::write(&script, format!("cat > \"$0.args\"\n{body}"))?;
    Ok((script.clone(), dir.join("runner.sh.args")))
}

#[tokio::test]
async fn run_writes_results_and_timing() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let out_dir = dir.path().join("runner-out");
    let (script, args_file) = runner_script(
        dir.path(),
        &formatdoc! {r#"
            mkdir -p "{out_dir}/example.Pass"
            echo "screenshot" > "{out_dir}/example.Pass/screen.txt"
            cat <<'EOF'
            {{"type":"run-start","time":"2026-10-18T10:00:00Z","num-tests":2}}
            {{"type":"test-start","time":"2026-10-18T10:00:01Z","test":{{"name":"example.Pass"}}}}
            {{"type":"test-log","time":"2026-10-18T10:00:02Z","text":"all good"}}
            {{"type":"test-end","time":"2026-10-18T10:00:03Z","name":"example.Pass"}}
            {{"type":"test-start","time":"2026-10-18T10:00:04Z","test":{{"name":"example.Fail"}}}}
            {{"type":"test-error","time":"2026-10-18T10:00:05Z","error":{{"reason":"boom"}}}}
            {{"type":"test-end","time":"2026-10-18T10:00:06Z","name":"example.Fail"}}
            {{"type":"run-end","time":"2026-10-18T10:00:07Z","out-dir":"{out_dir}"}}
            EOF
        "#},
    )?;

    let results_dir = dir.path().join("results");
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_message_timeout(Duration::from_secs(30))
        .set_heartbeat_interval(Duration::from_secs(5));
    let runner = builder.build(LocalTarget::new("sh", [script.as_str()], &out_dir), &results_dir);

    let status = runner
        .execute(&["example.*".to_owned()], std::future::pending())
        .await;
    assert!(
        matches!(status, RunStatus::Success { .. }),
        "unexpected status: {status:?}"
    );
    assert_eq!(status.exit_code(), DutestExitCode::TEST_RUN_FAILED);

    let statuses: Vec<_> = status
        .results()
        .iter()
        .map(|result| (result.name(), result.status()))
        .collect();
    assert_eq!(
        statuses,
        [
            ("example.Pass", TestStatus::Passed),
            ("example.Fail", TestStatus::Failed)
        ]
    );

    let written = read_results(&results_dir.join(RESULTS_FILE_NAME))?;
    assert_eq!(written, status.results());

    let timing: TimingLog =
        serde_json::from_str(&std::fs::read_to_string(results_dir.join(TIMING_FILE_NAME))?)?;
    let run_stage = timing.stage(RUN_STAGE_NAME).expect("run stage recorded");
    let names: Vec<_> = run_stage.children.iter().map(|stage| stage.name.as_str()).collect();
    assert_eq!(names, ["example.Pass", "example.Fail"]);

    let pass_dir = results_dir.join(TESTS_DIR_NAME).join("example.Pass");
    assert!(std::fs::read_to_string(pass_dir.join(TEST_LOG_FILE_NAME))?.contains("all good"));
    assert_eq!(std::fs::read_to_string(pass_dir.join("screen.txt"))?, "screenshot\n");

    let args: RunnerArgs = serde_json::from_str(&std::fs::read_to_string(&args_file)?)?;
    assert_eq!(args.mode, RunnerMode::Run);
    assert_eq!(args.patterns, ["example.*"]);
    assert_eq!(args.out_dir, out_dir);
    assert_eq!(args.heartbeat_interval, Some(Duration::from_secs(5)));
    Ok(())
}

#[tokio::test]
async fn runner_crash_mid_test_keeps_partial_results() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let (script, _) = runner_script(
        dir.path(),
        indoc::indoc! {r#"
            cat <<'EOF'
            {"type":"run-start","time":"2026-10-18T10:00:00Z","num-tests":1}
            {"type":"test-start","time":"2026-10-18T10:00:01Z","test":{"name":"example.Crash"}}
            EOF
            exit 3
        "#},
    )?;

    let results_dir = dir.path().join("results");
    let runner = TestRunnerBuilder::default().build(
        LocalTarget::new("sh", [script.as_str()], dir.path().join("runner-out")),
        &results_dir,
    );
    let status = runner.execute(&[], std::future::pending()).await;

    assert!(
        matches!(
            status,
            RunStatus::FailedAfterTestsBegan {
                error: RunTestsError::Stream(_),
                ..
            }
        ),
        "unexpected status: {status:?}"
    );
    assert_eq!(status.exit_code(), DutestExitCode::RUN_ABORTED);
    assert_eq!(status.results()[0].status(), TestStatus::Failed);

    let written = read_results(&results_dir.join(RESULTS_FILE_NAME))?;
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].end, None, "unfinished test has no end time");
    assert_eq!(written[0].errors[0].error.reason, UNFINISHED_TEST_REASON);
    Ok(())
}

#[tokio::test]
async fn missing_program_fails_before_tests() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let results_dir = dir.path().join("results");
    let runner = TestRunnerBuilder::default().build(
        LocalTarget::new(
            dir.path().join("does-not-exist").as_str(),
            Vec::<String>::new(),
            dir.path().join("runner-out"),
        ),
        &results_dir,
    );

    let status = runner.execute(&[], std::future::pending()).await;
    assert!(
        matches!(
            status,
            RunStatus::FailedBeforeTestsBegan {
                error: RunTestsError::Spawn(RunnerSpawnError::Spawn { .. })
            }
        ),
        "unexpected status: {status:?}"
    );
    assert_eq!(status.exit_code(), DutestExitCode::SETUP_ERROR);
    assert!(!results_dir.exists(), "nothing is written for a runner that never started");
    Ok(())
}

#[tokio::test]
async fn rerun_replaces_previous_results() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let out_dir = dir.path().join("runner-out");
    let results_dir = dir.path().join("results");

    for (run, name) in [(1, "example.First"), (2, "example.Second"), (3, "example.Second")] {
        let (script, _) = runner_script(
            dir.path(),
            &formatdoc! {r#"
                mkdir -p "{out_dir}/{name}"
                echo "run {run}" > "{out_dir}/{name}/screen.txt"
                cat <<'EOF'
                {{"type":"run-start","time":"2026-10-18T10:00:00Z","num-tests":1}}
                {{"type":"test-start","time":"2026-10-18T10:00:01Z","test":{{"name":"{name}"}}}}
                {{"type":"test-end","time":"2026-10-18T10:00:02Z","name":"{name}"}}
                {{"type":"run-end","time":"2026-10-18T10:00:03Z","out-dir":"{out_dir}"}}
                EOF
            "#},
        )?;
        let runner = TestRunnerBuilder::default()
            .build(LocalTarget::new("sh", [script.as_str()], &out_dir), &results_dir);
        let status = runner.execute(&[], std::future::pending()).await;
        assert!(
            matches!(status, RunStatus::Success { .. }),
            "run {run}: unexpected status: {status:?}"
        );
    }

    let streamed = read_streamed_results(&results_dir.join(STREAMED_RESULTS_FILE_NAME))?;
    let names: Vec<_> = streamed.iter().map(|result| result.name()).collect();
    assert_eq!(names, ["example.Second"], "only the last run's records remain");
    assert_eq!(read_results(&results_dir.join(RESULTS_FILE_NAME))?, streamed);

    let tests_dir = results_dir.join(TESTS_DIR_NAME);
    assert!(!tests_dir.join("example.First").exists());
    let second_dir = tests_dir.join("example.Second");
    assert_eq!(std::fs::read_to_string(second_dir.join("screen.txt"))?, "run 3\n");
    assert!(!second_dir.join("screen.txt.from_test").exists());
    Ok(())
}

#[tokio::test]
async fn list_reports_runner_tests() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let (script, args_file) = runner_script(
        dir.path(),
        r#"echo '{"tests":[{"name":"example.A"},{"name":"example.B","timeout":"1m"}]}'"#,
    )?;
    let target = LocalTarget::new("sh", [script.as_str()], dir.path().join("runner-out"));

    let tests = list_tests(
        &target,
        &["example.*".to_owned()],
        Duration::from_secs(30),
        std::future::pending(),
    )
    .await?;
    let names: Vec<_> = tests.iter().map(|test| test.name.as_str()).collect();
    assert_eq!(names, ["example.A", "example.B"]);
    assert_eq!(tests[1].timeout, Duration::from_secs(60));

    let args: RunnerArgs = serde_json::from_str(&std::fs::read_to_string(&args_file)?)?;
    assert_eq!(args.mode, RunnerMode::List);
    Ok(())
}

#[tokio::test]
async fn list_failure_is_reported() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let (script, _) = runner_script(dir.path(), "echo 'not a list'")?;
    let target = LocalTarget::new("sh", [script.as_str()], dir.path().join("runner-out"));

    let error = list_tests(&target, &[], Duration::from_secs(30), std::future::pending())
        .await
        .expect_err("listing fails");
    assert!(matches!(error, ListTestsError::Decode(_)), "unexpected error: {error}");
    Ok(())
}
