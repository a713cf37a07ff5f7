// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::imp::wait_for_runner;
use crate::{
    errors::ListTestsError,
    target::{RunnerTarget, SpawnedRunner},
};
use dutest_protocol::{ListOutput, RunnerArgs, RunnerMode, TestMetadata};
use std::{collections::HashSet, future::Future, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Asks a runner on `target` which tests match `patterns`.
///
/// The runner must produce its whole list within `timeout`. Listing stops early if `cancel`
/// resolves.
pub async fn list_tests<T, F>(
    target: &T,
    patterns: &[String],
    timeout: Duration,
    cancel: F,
) -> Result<Vec<TestMetadata>, ListTestsError>
where
    T: RunnerTarget,
    F: Future<Output = ()>,
{
    let args = RunnerArgs {
        mode: RunnerMode::List,
        patterns: patterns.to_vec(),
        out_dir: target.runner_out_dir(),
        heartbeat_interval: None,
    };
    let SpawnedRunner { mut child, stdout } = target.spawn(&args).await?;

    let result = read_test_list(stdout, timeout, cancel).await;
    wait_for_runner(&mut child, result.is_err()).await;

    let tests = result?;
    debug!(count = tests.len(), "runner listed tests");
    Ok(tests)
}

/// Reads and validates a [`ListOutput`] document from `stream`.
pub(crate) async fn read_test_list<R, F>(
    mut stream: R,
    timeout: Duration,
    cancel: F,
) -> Result<Vec<TestMetadata>, ListTestsError>
where
    R: AsyncRead + Unpin,
    F: Future<Output = ()>,
{
    let mut buf = Vec::new();
    let read = tokio::time::timeout(timeout, stream.read_to_end(&mut buf));

    tokio::select! {
        biased;

        () = cancel => return Err(ListTestsError::Canceled),
        res = read => match res {
            Ok(res) => res.map_err(ListTestsError::Read)?,
            Err(_) => return Err(ListTestsError::Timeout { timeout }),
        },
    };

    let ListOutput { tests } = serde_json::from_slice(&buf).map_err(ListTestsError::Decode)?;

    let mut seen = HashSet::new();
    for test in &tests {
        if !seen.insert(test.name.as_str()) {
            return Err(ListTestsError::DuplicateTest {
                name: test.name.clone(),
            });
        }
    }
    Ok(tests)
}
