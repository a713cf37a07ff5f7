// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use color_eyre::eyre::{Result, bail};
use dutest_runner::{ledger::TestResult, record::read_streamed_results};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Polls the streamed results file until `done` accepts its contents.
async fn wait_for_records(
    path: &Utf8Path,
    done: impl Fn(&[TestResult]) -> bool,
) -> Result<Vec<TestResult>> {
    for _ in 0..500 {
        let records = read_streamed_results(path)?;
        if done(&records) {
            return Ok(records);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("timed out waiting for streamed results in {path}")
}

#[tokio::test]
async fn partial_record_is_replaced_by_final() -> Result<()> {
    let mut harness = StreamHarness::new();
    let path = harness.streamed_results_path();
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);

    let feed = async move {
        tx.write_all(&encode(&[run_start(2), test_start("a", 1)]))
            .await?;
        let partial = wait_for_records(&path, |records| !records.is_empty()).await?;
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].name(), "a");
        assert_eq!(partial[0].end, None);

        tx.write_all(&encode(&[test_end("a", 2)])).await?;
        let finished = wait_for_records(&path, |records| {
            assert!(records.len() <= 1, "never two records for the same test");
            records.len() == 1 && records[0].end.is_some()
        })
        .await?;
        assert_eq!(finished[0].end, Some(ts(2)));

        tx.write_all(&encode(&[test_start("b", 3)])).await?;
        let second = wait_for_records(&path, |records| records.len() == 2).await?;
        assert_eq!(second[0].end, Some(ts(2)));
        assert_eq!(second[1].end, None);

        tx.write_all(&encode(&[test_end("b", 4), run_end(None)]))
            .await?;
        // Dropping the writer closes the stream.
        drop(tx);
        Ok::<_, color_eyre::Report>(())
    };

    let (outcome, fed) = tokio::join!(
        harness.process_stream(rx, None, std::future::pending()),
        feed
    );
    fed?;
    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);

    let records = read_streamed_results(&harness.streamed_results_path())?;
    assert_eq!(records, outcome.results);
    Ok(())
}
