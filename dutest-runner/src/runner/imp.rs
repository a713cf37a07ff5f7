// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    RunStatus,
    diagnose::Diagnose,
    dispatcher::{
        STATUS_TARGET, StreamConfig, StreamContext, StreamOutcome, TESTS_DIR_NAME, process_stream,
    },
    timeout::DEFAULT_MESSAGE_TIMEOUT,
};
use crate::{
    config::DutestProfile,
    errors::{DisplayErrorChain, RunTestsError},
    helpers::{now, plural},
    ledger::{TestResult, TestStatus},
    record::{
        RESULTS_FILE_NAME, STREAMED_RESULTS_FILE_NAME, StreamedResultsWriter, TIMING_FILE_NAME,
        write_results, write_timing,
    },
    target::{RunnerTarget, SpawnedRunner},
    timing::TimingLog,
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use dutest_protocol::{RunnerArgs, RunnerMode, TimingStage};
use std::{future::Future, io, sync::Arc, time::Duration};
use tokio::{process::Child, time::Instant};
use tracing::{debug, error, info, warn};

/// The name of the top-level stage in `timing.json`.
pub const RUN_STAGE_NAME: &str = "run";

/// How long a runner gets to exit on its own after its output has been consumed.
const RUNNER_EXIT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    message_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    deadline: Option<Instant>,
    diagnose: Option<DebugIgnore<Arc<dyn Diagnose>>>,
}

impl TestRunnerBuilder {
    /// Sets how long to wait for each control message, on top of the budget of a running test.
    pub fn set_message_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.message_timeout = Some(timeout);
        self
    }

    /// Sets how often the runner should send heartbeats.
    pub fn set_heartbeat_interval(&mut self, interval: Duration) -> &mut Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets a point in time after which the run is abandoned.
    pub fn set_deadline(&mut self, deadline: Instant) -> &mut Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the callback used to explain abnormal stream terminations.
    pub fn set_diagnose(&mut self, diagnose: impl Diagnose + 'static) -> &mut Self {
        self.diagnose = Some(DebugIgnore(Arc::new(diagnose)));
        self
    }

    /// Applies the message timeout and heartbeat interval from `profile`.
    pub fn apply_profile(&mut self, profile: &DutestProfile<'_>) -> &mut Self {
        self.message_timeout = Some(profile.message_timeout());
        self.heartbeat_interval = profile.heartbeat_interval();
        self
    }

    /// Creates a new test runner that runs tests on `target` and writes results to `results_dir`.
    pub fn build<T: RunnerTarget>(
        self,
        target: T,
        results_dir: impl Into<Utf8PathBuf>,
    ) -> TestRunner<T> {
        TestRunner {
            target,
            results_dir: results_dir.into(),
            stream_config: StreamConfig {
                message_timeout: self.message_timeout.unwrap_or(DEFAULT_MESSAGE_TIMEOUT),
                deadline: self.deadline,
            },
            heartbeat_interval: self.heartbeat_interval,
            diagnose: self.diagnose,
        }
    }
}

/// Runs tests on a [`RunnerTarget`] and records their results.
#[derive(Debug)]
pub struct TestRunner<T> {
    target: T,
    results_dir: Utf8PathBuf,
    stream_config: StreamConfig,
    heartbeat_interval: Option<Duration>,
    diagnose: Option<DebugIgnore<Arc<dyn Diagnose>>>,
}

impl<T: RunnerTarget> TestRunner<T> {
    /// The directory results are written to.
    pub fn results_dir(&self) -> &Utf8Path {
        &self.results_dir
    }

    /// Runs the tests matching `patterns`.
    ///
    /// The run stops early if `cancel` resolves. Results from a previous run in the results
    /// directory are removed once the runner has started. Unless the run fails before any test
    /// starts, `results.json` and `timing.json` are written to the results directory.
    pub async fn execute<F>(&self, patterns: &[String], cancel: F) -> RunStatus
    where
        F: Future<Output = ()>,
    {
        let run_start = now();

        let args = RunnerArgs {
            mode: RunnerMode::Run,
            patterns: patterns.to_vec(),
            out_dir: self.target.runner_out_dir(),
            heartbeat_interval: self.heartbeat_interval,
        };
        let SpawnedRunner { mut child, stdout } = match self.target.spawn(&args).await {
            Ok(spawned) => spawned,
            Err(error) => return self.failed_before_tests(error.into()),
        };

        let mut writer = match self.prepare_results_dir() {
            Ok(writer) => writer,
            Err(error) => {
                wait_for_runner(&mut child, true).await;
                return self.failed_before_tests(error);
            }
        };

        let mut timing = TimingLog::new();
        let outcome = process_stream(
            StreamContext::new(&self.results_dir, &mut writer, &mut timing),
            &self.stream_config,
            stdout,
            &self.target,
            self.diagnose.as_ref().map(|diagnose| &***diagnose),
            cancel,
        )
        .await;
        wait_for_runner(&mut child, outcome.error.is_some()).await;

        let StreamOutcome { results, error, .. } = outcome;
        if results.is_empty() {
            if let Some(error) = error {
                return RunStatus::FailedBeforeTestsBegan {
                    error: error.into(),
                };
            }
        }

        let mut run_stage = TimingStage::new(RUN_STAGE_NAME, run_start);
        run_stage.end = Some(now());
        run_stage.children = std::mem::take(&mut timing.stages);
        timing.push(run_stage);

        let write_result = write_results(&self.results_dir, &results)
            .and_then(|()| write_timing(&self.results_dir, &timing));

        let error = match (error, write_result) {
            (Some(error), write_result) => {
                if let Err(write_error) = write_result {
                    error!("{}", DisplayErrorChain::new(&write_error));
                }
                Some(RunTestsError::from(error))
            }
            (None, Err(write_error)) => {
                error!("{}", DisplayErrorChain::new(&write_error));
                Some(write_error.into())
            }
            (None, Ok(())) => None,
        };

        log_summary(&results);
        match error {
            Some(error) => RunStatus::FailedAfterTestsBegan { results, error },
            None => RunStatus::Success { results },
        }
    }

    /// Creates the results directory, clearing out whatever a previous run left in it.
    fn prepare_results_dir(&self) -> Result<StreamedResultsWriter, RunTestsError> {
        std::fs::create_dir_all(&self.results_dir).map_err(dir_error(self.results_dir.clone()))?;

        for file_name in [RESULTS_FILE_NAME, TIMING_FILE_NAME] {
            let path = self.results_dir.join(file_name);
            ignore_not_found(std::fs::remove_file(&path)).map_err(dir_error(path))?;
        }
        let tests_dir = self.results_dir.join(TESTS_DIR_NAME);
        ignore_not_found(std::fs::remove_dir_all(&tests_dir)).map_err(dir_error(tests_dir))?;

        let writer =
            StreamedResultsWriter::create(self.results_dir.join(STREAMED_RESULTS_FILE_NAME))?;
        debug!(results_dir = %self.results_dir, "prepared results directory");
        Ok(writer)
    }

    fn failed_before_tests(&self, error: RunTestsError) -> RunStatus {
        error!("{}", DisplayErrorChain::new(&error));
        RunStatus::FailedBeforeTestsBegan { error }
    }
}

fn dir_error(path: Utf8PathBuf) -> impl FnOnce(io::Error) -> RunTestsError {
    move |error| RunTestsError::ResultsDir { path, error }
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn log_summary(results: &[TestResult]) {
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for result in results {
        match result.status() {
            TestStatus::Passed => passed += 1,
            TestStatus::Failed | TestStatus::Incomplete => failed += 1,
            TestStatus::Skipped => skipped += 1,
        }
    }
    info!(
        target: STATUS_TARGET,
        "Ran {} {}: {passed} passed, {failed} failed, {skipped} skipped",
        results.len(),
        plural::tests_str(results.len()),
    );
}

/// Reaps a runner process once its output has been consumed.
///
/// If `kill` is true, or the runner doesn't exit within a grace period, it is killed first. A
/// runner exiting unsuccessfully after a clean stream is only logged.
pub(super) async fn wait_for_runner(child: &mut Child, kill: bool) {
    if kill {
        if let Err(error) = child.start_kill() {
            debug!(%error, "failed to kill runner");
        }
    }

    let status = match tokio::time::timeout(RUNNER_EXIT_GRACE_PERIOD, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                "runner did not exit within {}, killing it",
                humantime::format_duration(RUNNER_EXIT_GRACE_PERIOD),
            );
            match child.kill().await {
                Ok(()) => child.wait().await,
                Err(error) => Err(error),
            }
        }
    };

    match status {
        Ok(status) if status.success() || kill => debug!(%status, "runner exited"),
        Ok(status) => warn!(%status, "runner exited unsuccessfully after a complete run"),
        Err(error) => warn!(%error, "failed to wait for runner"),
    }
}
