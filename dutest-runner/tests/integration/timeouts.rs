// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use dutest_protocol::{ControlMessage, TestMetadata};
use dutest_runner::{
    errors::ProcessStreamError,
    runner::{DiagnoseContext, UNFINISHED_TEST_REASON},
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    time::Instant,
};

/// Returns a stream that has already delivered `messages` and then stays open, along with the
/// writing half that keeps it open.
async fn open_stream(messages: &[ControlMessage]) -> (DuplexStream, DuplexStream) {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    tx.write_all(&encode(messages))
        .await
        .expect("wrote to duplex");
    (tx, rx)
}

/// Checks that `secs` seconds of (paused) time passed since `start`, give or take the timer
/// resolution.
fn assert_elapsed(start: Instant, secs: u64) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs) + Duration::from_millis(100),
        "elapsed {elapsed:?}, expected {secs}s"
    );
}

#[tokio::test]
async fn cancellation_is_prompt() {
    let mut harness = StreamHarness::new();
    harness.config.message_timeout = Duration::from_secs(60);
    let (_tx, rx) = open_stream(&[run_start(1), test_start("a", 1)]).await;

    let start = std::time::Instant::now();
    let outcome = harness
        .process_stream(rx, None, std::future::ready(()))
        .await;

    assert!(start.elapsed() < Duration::from_secs(5));
    let error = outcome.error.expect("stream failed");
    assert!(error.is_canceled(), "unexpected error: {error}");
    assert!(!error.is_timeout());
}

#[tokio::test]
async fn cancellation_finalizes_the_running_test() {
    let mut harness = StreamHarness::new();
    harness.config.message_timeout = Duration::from_secs(60);
    let (_tx, rx) = open_stream(&[run_start(1), test_start("a", 1)]).await;

    let outcome = harness
        .process_stream(rx, None, tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert!(outcome.error.expect("stream failed").is_canceled());
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(
        outcome.results[0].errors[0].error.reason,
        UNFINISHED_TEST_REASON
    );
}

#[tokio::test(start_paused = true)]
async fn silent_runner_times_out() {
    let mut harness = StreamHarness::new();
    harness.config.message_timeout = Duration::from_secs(10);
    let (_tx, rx) = open_stream(&[run_start(0)]).await;

    let outcome = harness
        .process_stream(rx, None, std::future::pending())
        .await;

    let error = outcome.error.expect("stream failed");
    assert!(
        matches!(error, ProcessStreamError::Timeout { timeout } if timeout == Duration::from_secs(10)),
        "unexpected error: {error}"
    );
    assert_eq!(
        error.to_string(),
        "timed out after 10s waiting for control message"
    );
}

#[tokio::test(start_paused = true)]
async fn running_test_extends_the_timeout() {
    let mut harness = StreamHarness::new();
    harness.config.message_timeout = Duration::from_secs(10);
    let mut test = TestMetadata::new("slow");
    test.timeout = Duration::from_secs(30);
    test.additional_time = Duration::from_secs(5);
    let (_tx, rx) = open_stream(&[run_start(1), test_start_with(test, 1)]).await;

    let start = Instant::now();
    let outcome = harness
        .process_stream(rx, None, std::future::pending())
        .await;

    let error = outcome.error.expect("stream failed");
    assert!(error.is_timeout(), "unexpected error: {error}");
    // The base timeout plus the whole budget of the test, as the test started right away.
    assert_elapsed(start, 45);
    assert_eq!(
        outcome.results[0].errors[0].error.reason,
        UNFINISHED_TEST_REASON
    );
}

#[tokio::test(start_paused = true)]
async fn heartbeats_disable_the_test_budget() {
    let mut harness = StreamHarness::new();
    harness.config.message_timeout = Duration::from_secs(10);
    let mut test = TestMetadata::new("slow");
    test.timeout = Duration::from_secs(300);
    let (_tx, rx) = open_stream(&[run_start(1), heartbeat(), test_start_with(test, 1)]).await;

    let start = Instant::now();
    let outcome = harness
        .process_stream(rx, None, std::future::pending())
        .await;

    assert!(outcome.error.expect("stream failed").is_timeout());
    assert_elapsed(start, 10);
}

#[tokio::test(start_paused = true)]
async fn deadline_caps_the_timeout() {
    let mut harness = StreamHarness::new();
    harness.config.message_timeout = Duration::from_secs(20);
    harness.config.deadline = Some(Instant::now() + Duration::from_secs(11));
    let (_tx, rx) = open_stream(&[run_start(0)]).await;

    let start = Instant::now();
    let outcome = harness
        .process_stream(rx, None, std::future::pending())
        .await;

    assert!(outcome.error.expect("stream failed").is_timeout());
    assert_elapsed(start, 11);
}

fn kernel_panic(cx: &DiagnoseContext<'_>) -> String {
    if cx.error.is_timeout() {
        format!(
            "DUT rebooted during {} (kernel panic)",
            cx.running_test.unwrap_or("setup")
        )
    } else {
        String::new()
    }
}

#[tokio::test(start_paused = true)]
async fn diagnosis_replaces_the_message() {
    let mut harness = StreamHarness::new();
    let (_tx, rx) = open_stream(&[run_start(1), test_start("a", 1)]).await;

    let outcome = harness
        .process_stream(rx, Some(&kernel_panic), std::future::pending())
        .await;

    let error = outcome.error.expect("stream failed");
    assert_eq!(error.to_string(), "DUT rebooted during a (kernel panic)");
    assert!(error.is_timeout(), "diagnosis keeps the underlying kind");
}

#[tokio::test]
async fn empty_diagnosis_keeps_the_message() {
    let mut harness = StreamHarness::new();
    let outcome = harness
        .process_stream(
            std::io::Cursor::new(encode(&[run_start(1)])),
            Some(&kernel_panic),
            std::future::pending(),
        )
        .await;

    let error = outcome.error.expect("stream failed");
    assert!(
        matches!(error, ProcessStreamError::NoRunEnd),
        "unexpected error: {error}"
    );
}
