// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use dutest_protocol::{ControlMessage, MessageKind, TestEnd, TestMetadata, TimingStage};
use dutest_runner::{
    errors::{ProcessStreamError, StreamReadError},
    ledger::TestStatus,
    record::read_streamed_results,
    runner::{TEST_LOG_FILE_NAME, UNFINISHED_TEST_REASON},
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_case::test_case;

fn names(outcome: &dutest_runner::runner::StreamOutcome) -> Vec<&str> {
    outcome.results.iter().map(|result| result.name()).collect()
}

#[tokio::test]
async fn tests_are_recorded_in_start_order() -> Result<()> {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process(&[
            run_start(2),
            run_log("bundle loaded"),
            test_start("a", 1),
            test_log("hello from a", 2),
            test_end("a", 3),
            test_start("b", 4),
            test_end("b", 5),
            run_end(None),
        ])
        .await;

    ensure!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    assert_eq!(names(&outcome), ["a", "b"]);
    assert_eq!(outcome.expected_tests, 2);
    for result in &outcome.results {
        assert!(result.end.is_some(), "{} has an end time", result.name());
        assert_eq!(result.status(), TestStatus::Passed);
        assert_eq!(
            result.out_dir,
            harness.results_dir.join("tests").join(result.name())
        );
    }
    assert_eq!(outcome.results[1].end, Some(ts(5)));

    let log = std::fs::read_to_string(outcome.results[0].out_dir.join(TEST_LOG_FILE_NAME))?;
    assert!(log.contains("hello from a"), "log contents: {log}");

    let streamed = read_streamed_results(&harness.streamed_results_path())?;
    assert_eq!(streamed, outcome.results);
    Ok(())
}

#[tokio::test]
async fn second_test_start_while_running() {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process(&[
            run_start(2),
            test_start("a", 1),
            test_start("b", 2),
            test_end("b", 3),
            run_end(None),
        ])
        .await;

    let error = outcome.error.as_ref().expect("stream failed");
    assert!(
        matches!(&error, ProcessStreamError::TestAlreadyRunning { running, new } if running == "a" && new == "b"),
        "unexpected error: {error}"
    );
    assert_eq!(names(&outcome), ["a"]);
}

#[tokio::test]
async fn duplicate_test_names_are_rejected() {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process(&[
            run_start(2),
            test_start("x", 1),
            test_end("x", 2),
            test_start("x", 3),
            test_end("x", 4),
            run_end(None),
        ])
        .await;

    let error = outcome.error.expect("stream failed");
    assert!(
        matches!(error, ProcessStreamError::TestAlreadySeen { .. }),
        "unexpected error: {error}"
    );
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].end, Some(ts(2)));
    assert!(outcome.results[0].errors.is_empty());
}

#[tokio::test]
async fn unfinished_test_is_finalized_on_stream_close() -> Result<()> {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process(&[run_start(1), test_start("a", 1), test_log("working", 2)])
        .await;

    let error = outcome.error.expect("stream failed");
    assert!(
        matches!(error, ProcessStreamError::NoRunEnd),
        "unexpected error: {error}"
    );

    let result = &outcome.results[0];
    assert_eq!(result.end, None);
    assert_eq!(result.status(), TestStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].error.reason, UNFINISHED_TEST_REASON);

    let streamed = read_streamed_results(&harness.streamed_results_path())?;
    assert_eq!(streamed.len(), 1);
    assert_eq!(streamed[0].errors[0].error.reason, UNFINISHED_TEST_REASON);

    let log = std::fs::read_to_string(result.out_dir.join(TEST_LOG_FILE_NAME))?;
    assert!(log.contains(UNFINISHED_TEST_REASON), "log contents: {log}");
    Ok(())
}

#[tokio::test]
async fn unfinished_test_is_finalized_on_decode_error() -> Result<()> {
    let mut harness = StreamHarness::new();
    let mut bytes = encode(&[run_start(1), test_start("a", 1)]);
    bytes.extend_from_slice(b"{\"type\": \"test-end\", \"time\": \n");
    let outcome = harness
        .process_stream(std::io::Cursor::new(bytes), None, std::future::pending())
        .await;

    let error = outcome.error.expect("stream failed");
    assert!(
        matches!(
            error,
            ProcessStreamError::Read(StreamReadError::Decode { line_number: 3, .. })
        ),
        "unexpected error: {error}"
    );
    let streamed = read_streamed_results(&harness.streamed_results_path())?;
    assert_eq!(streamed.len(), 1);
    assert_eq!(streamed[0].errors[0].error.reason, UNFINISHED_TEST_REASON);
    Ok(())
}

#[tokio::test]
async fn count_mismatch_keeps_results() {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process(&[run_start(2), test_start("a", 1), test_end("a", 2), run_end(None)])
        .await;

    let error = outcome.error.expect("stream failed");
    assert_eq!(error.to_string(), "got results for 1 test; expected 2");
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].errors.is_empty());
}

#[tokio::test]
async fn missing_dependencies_skip_the_test() {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process(&[
            run_start(1),
            test_start("a", 1),
            ControlMessage::TestEnd(TestEnd {
                time: ts(2),
                name: "a".to_owned(),
                missing_dependencies: vec!["camera".to_owned()],
                timing: None,
            }),
            run_end(None),
        ])
        .await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    let result = &outcome.results[0];
    assert!(result.errors.is_empty());
    assert_eq!(result.status(), TestStatus::Skipped);
    assert_eq!(
        result.skip_reason.as_deref(),
        Some("missing dependencies: camera")
    );
}

#[tokio::test]
async fn test_errors_do_not_abort_the_run() {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process(&[
            run_start(2),
            test_start("a", 1),
            test_error("first", 2),
            test_error("second", 3),
            test_end("a", 4),
            test_start("b", 5),
            test_end("b", 6),
            run_end(None),
        ])
        .await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    let reasons: Vec<_> = outcome.results[0]
        .errors
        .iter()
        .map(|error| error.error.reason.as_str())
        .collect();
    assert_eq!(reasons, ["first", "second"]);
    assert_eq!(outcome.results[1].status(), TestStatus::Passed);
}

#[tokio::test]
async fn runner_timing_is_grafted_under_the_test() {
    let mut harness = StreamHarness::new();
    let mut stage = TimingStage::new("example.Timing", ts(1));
    stage.end = Some(ts(2));
    let outcome = harness
        .process(&[
            run_start(1),
            test_start("a", 1),
            ControlMessage::TestEnd(TestEnd {
                time: ts(3),
                name: "a".to_owned(),
                missing_dependencies: Vec::new(),
                timing: Some(stage.clone()),
            }),
            run_end(None),
        ])
        .await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    let test_stage = harness.timing.stage("a").expect("stage recorded for test");
    assert_eq!(test_stage.start, ts(1));
    assert_eq!(test_stage.duration(), Some(Duration::from_secs(2)));
    assert_eq!(test_stage.children, [stage]);
}

enum Expected {
    NoRunStart(MessageKind),
    DuplicateRunStart,
    DuplicateRunEnd,
    MessageAfterRunEnd(MessageKind),
    NoTestRunning(MessageKind),
    TestNotStarted,
    WrongTestEnd,
    RunEndWhileTestRunning,
    RunError,
    InvalidTestName,
}

#[test_case(vec![test_start("a", 1)], Expected::NoRunStart(MessageKind::TestStart) ; "test before run start")]
#[test_case(vec![heartbeat()], Expected::NoRunStart(MessageKind::Heartbeat) ; "heartbeat before run start")]
#[test_case(vec![run_start(0), run_start(0)], Expected::DuplicateRunStart ; "two run starts")]
#[test_case(vec![run_start(0), run_end(None), run_end(None)], Expected::DuplicateRunEnd ; "two run ends")]
#[test_case(vec![run_start(0), run_end(None), run_log("late")], Expected::MessageAfterRunEnd(MessageKind::RunLog) ; "log after run end")]
#[test_case(vec![run_start(0), test_log("orphan", 1)], Expected::NoTestRunning(MessageKind::TestLog) ; "log without test")]
#[test_case(vec![run_start(0), test_error("orphan", 1)], Expected::NoTestRunning(MessageKind::TestError) ; "error without test")]
#[test_case(vec![run_start(1), test_end("a", 1)], Expected::TestNotStarted ; "end without start")]
#[test_case(vec![run_start(1), test_start("a", 1), test_end("b", 2)], Expected::WrongTestEnd ; "end for other test")]
#[test_case(vec![run_start(1), test_start("a", 1), run_end(None)], Expected::RunEndWhileTestRunning ; "run end while running")]
#[test_case(vec![run_start(1), test_start("a", 1), run_error("bundle crashed")], Expected::RunError ; "run error")]
#[test_case(vec![run_start(1), test_start("../escape", 1)], Expected::InvalidTestName ; "path traversal")]
#[test_case(vec![run_start(1), test_start_with(TestMetadata::new("a/b"), 1)], Expected::InvalidTestName ; "nested path")]
#[tokio::test]
async fn protocol_violations(messages: Vec<ControlMessage>, expected: Expected) {
    let mut harness = StreamHarness::new();
    let outcome = harness.process(&messages).await;
    let error = outcome.error.expect("stream failed");

    let matched = match expected {
        Expected::NoRunStart(kind) => {
            matches!(error, ProcessStreamError::NoRunStart { kind: actual } if actual == kind)
        }
        Expected::DuplicateRunStart => matches!(error, ProcessStreamError::DuplicateRunStart),
        Expected::DuplicateRunEnd => matches!(error, ProcessStreamError::DuplicateRunEnd),
        Expected::MessageAfterRunEnd(kind) => {
            matches!(error, ProcessStreamError::MessageAfterRunEnd { kind: actual } if actual == kind)
        }
        Expected::NoTestRunning(kind) => {
            matches!(error, ProcessStreamError::NoTestRunning { kind: actual } if actual == kind)
        }
        Expected::TestNotStarted => matches!(error, ProcessStreamError::TestNotStarted { .. }),
        Expected::WrongTestEnd => matches!(error, ProcessStreamError::WrongTestEnd { .. }),
        Expected::RunEndWhileTestRunning => {
            matches!(error, ProcessStreamError::RunEndWhileTestRunning { .. })
        }
        Expected::RunError => {
            matches!(&error, ProcessStreamError::RunError { error } if error.reason == "bundle crashed")
        }
        Expected::InvalidTestName => matches!(error, ProcessStreamError::InvalidTestName { .. }),
    };
    assert!(matched, "unexpected error: {error}");

    // Whatever was open has been finalized.
    for result in &outcome.results {
        assert!(
            result.end.is_some() || !result.errors.is_empty(),
            "{} left open",
            result.name()
        );
    }
}
