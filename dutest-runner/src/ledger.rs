// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory accumulation of test results for a single run.
//!
//! The [`RunLedger`] is mutated by exactly one consumer of the control stream, one message at a
//! time. It enforces the invariants that only depend on its own contents: test names are unique,
//! at most one test is open at a time, and a test can only be closed by naming it.

use crate::errors::ProcessStreamError;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use dutest_protocol::{ErrorInfo, TestError, TestMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The outcome of a single test, as recorded in results files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestResult {
    /// The metadata the runner reported when the test started.
    pub test: TestMetadata,

    /// Errors reported against the test, in arrival order.
    #[serde(default)]
    pub errors: Vec<TestError>,

    /// When the test started.
    pub start: DateTime<FixedOffset>,

    /// When the test finished, or `None` if it is still running or never finished.
    pub end: Option<DateTime<FixedOffset>>,

    /// The directory holding the test's log and output files.
    pub out_dir: Utf8PathBuf,

    /// Why the test was skipped, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl TestResult {
    /// The name of the test.
    pub fn name(&self) -> &str {
        &self.test.name
    }

    /// Returns true if the test has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    /// Returns the status of the test.
    pub fn status(&self) -> TestStatus {
        if !self.errors.is_empty() {
            TestStatus::Failed
        } else if self.skip_reason.is_some() {
            TestStatus::Skipped
        } else if !self.is_finished() {
            TestStatus::Incomplete
        } else {
            TestStatus::Passed
        }
    }
}

/// A summary of a [`TestResult`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TestStatus {
    /// The test finished without errors.
    Passed,

    /// The test reported at least one error.
    Failed,

    /// The test was skipped because of missing dependencies.
    Skipped,

    /// The test has not finished, and has no errors yet.
    Incomplete,
}

/// Where a run is in its lifecycle, derived from the ledger contents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// No RunStart has been seen yet.
    AwaitingRunStart,

    /// The run started and no test is open.
    RunningNoTest,

    /// The run started and exactly one test is open.
    RunningOneTest,

    /// RunEnd has been seen.
    Done,
}

/// An ordered, append-only collection of test results plus run-level metadata.
#[derive(Clone, Debug, Default)]
pub struct RunLedger {
    run_start: Option<DateTime<FixedOffset>>,
    run_end: Option<DateTime<FixedOffset>>,
    expected_tests: usize,
    results: Vec<TestResult>,
    seen: HashSet<String>,
    // Index into `results`. Only the last result can ever be open.
    open: Option<usize>,
}

impl RunLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current phase of the run.
    pub fn phase(&self) -> RunPhase {
        match (self.run_start, self.run_end, self.open) {
            (None, _, _) => RunPhase::AwaitingRunStart,
            (Some(_), Some(_), _) => RunPhase::Done,
            (Some(_), None, None) => RunPhase::RunningNoTest,
            (Some(_), None, Some(_)) => RunPhase::RunningOneTest,
        }
    }

    /// When the run started, if it has.
    pub fn run_start(&self) -> Option<DateTime<FixedOffset>> {
        self.run_start
    }

    /// When the run ended, if it has.
    pub fn run_end(&self) -> Option<DateTime<FixedOffset>> {
        self.run_end
    }

    /// The number of tests announced at the start of the run.
    pub fn expected_tests(&self) -> usize {
        self.expected_tests
    }

    /// The results so far, in start order.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Looks up a result by test name.
    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|result| result.name() == name)
    }

    /// The currently open test, if any.
    pub fn open_test(&self) -> Option<&TestResult> {
        self.open.map(|index| &self.results[index])
    }

    /// Consumes the ledger, returning the results in start order.
    pub fn into_results(self) -> Vec<TestResult> {
        self.results
    }

    pub(crate) fn start_run(
        &mut self,
        time: DateTime<FixedOffset>,
        expected_tests: usize,
    ) -> Result<(), ProcessStreamError> {
        if self.run_start.is_some() {
            return Err(ProcessStreamError::DuplicateRunStart);
        }
        self.run_start = Some(time);
        self.expected_tests = expected_tests;
        Ok(())
    }

    /// Opens a new result. The caller is responsible for having validated the name.
    pub(crate) fn open(
        &mut self,
        test: TestMetadata,
        time: DateTime<FixedOffset>,
        out_dir: &Utf8Path,
    ) -> Result<&TestResult, ProcessStreamError> {
        if let Some(running) = self.open_test() {
            return Err(ProcessStreamError::TestAlreadyRunning {
                running: running.name().to_owned(),
                new: test.name,
            });
        }
        if !self.seen.insert(test.name.clone()) {
            return Err(ProcessStreamError::TestAlreadySeen { name: test.name });
        }

        self.results.push(TestResult {
            test,
            errors: Vec::new(),
            start: time,
            end: None,
            out_dir: out_dir.to_owned(),
            skip_reason: None,
        });
        let index = self.results.len() - 1;
        self.open = Some(index);
        Ok(&self.results[index])
    }

    /// Appends an error to the open result.
    ///
    /// Returns `None` if no result is open.
    pub(crate) fn add_error(&mut self, error: TestError) -> Option<&TestResult> {
        let index = self.open?;
        let result = &mut self.results[index];
        result.errors.push(error);
        Some(result)
    }

    /// Closes the open result, which must be named `name`.
    pub(crate) fn close(
        &mut self,
        name: &str,
        time: DateTime<FixedOffset>,
        missing_dependencies: &[String],
    ) -> Result<&TestResult, ProcessStreamError> {
        let Some(index) = self.open else {
            return Err(ProcessStreamError::TestNotStarted {
                name: name.to_owned(),
            });
        };
        let result = &mut self.results[index];
        if result.name() != name {
            return Err(ProcessStreamError::WrongTestEnd {
                expected: result.name().to_owned(),
                actual: name.to_owned(),
            });
        }

        result.end = Some(time);
        if !missing_dependencies.is_empty() {
            result.skip_reason = Some(format!(
                "missing dependencies: {}",
                missing_dependencies.join(", ")
            ));
        }
        self.open = None;
        Ok(&self.results[index])
    }

    /// Closes the open result, if any, with a synthetic error describing why it never finished.
    ///
    /// The end time is left unset.
    pub(crate) fn abandon(
        &mut self,
        time: DateTime<FixedOffset>,
        reason: &str,
    ) -> Option<&TestResult> {
        let index = self.open.take()?;
        let result = &mut self.results[index];
        result.errors.push(TestError {
            time,
            error: ErrorInfo::new(reason),
        });
        Some(result)
    }

    pub(crate) fn end_run(&mut self, time: DateTime<FixedOffset>) -> Result<(), ProcessStreamError> {
        if self.run_end.is_some() {
            return Err(ProcessStreamError::DuplicateRunEnd);
        }
        if let Some(running) = self.open_test() {
            return Err(ProcessStreamError::RunEndWhileTestRunning {
                name: running.name().to_owned(),
            });
        }
        self.run_end = Some(time);
        Ok(())
    }
}
