// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::RunTestsError,
    ledger::{TestResult, TestStatus},
};
use dutest_protocol::DutestExitCode;

/// How a call to [`TestRunner::execute`](super::TestRunner::execute) ended.
#[derive(Debug)]
pub enum RunStatus {
    /// The run completed and its results were written. Individual tests may still have failed.
    Success {
        /// The results, in start order.
        results: Vec<TestResult>,
    },

    /// The run failed after at least one test started. Partial results were written.
    FailedAfterTestsBegan {
        /// The results accumulated before the failure, in start order.
        results: Vec<TestResult>,

        /// The error that ended the run.
        error: RunTestsError,
    },

    /// The run failed before any test started. No results files were written, so callers may
    /// skip producing a results directory at all.
    FailedBeforeTestsBegan {
        /// The error that ended the run.
        error: RunTestsError,
    },
}

impl RunStatus {
    /// The results recorded by the run, if any.
    pub fn results(&self) -> &[TestResult] {
        match self {
            Self::Success { results } | Self::FailedAfterTestsBegan { results, .. } => results,
            Self::FailedBeforeTestsBegan { .. } => &[],
        }
    }

    /// The error that ended the run, if it failed.
    pub fn error(&self) -> Option<&RunTestsError> {
        match self {
            Self::Success { .. } => None,
            Self::FailedAfterTestsBegan { error, .. } | Self::FailedBeforeTestsBegan { error } => {
                Some(error)
            }
        }
    }

    /// Returns true if any recorded test failed or never finished.
    pub fn has_failed_tests(&self) -> bool {
        self.results().iter().any(|result| {
            matches!(
                result.status(),
                TestStatus::Failed | TestStatus::Incomplete
            )
        })
    }

    /// The process exit code that corresponds to this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success { .. } if self.has_failed_tests() => DutestExitCode::TEST_RUN_FAILED,
            Self::Success { .. } => DutestExitCode::OK,
            Self::FailedAfterTestsBegan {
                error: RunTestsError::WriteResults(_),
                ..
            } => DutestExitCode::WRITE_OUTPUT_ERROR,
            Self::FailedAfterTestsBegan { .. } => DutestExitCode::RUN_ABORTED,
            Self::FailedBeforeTestsBegan { .. } => DutestExitCode::SETUP_ERROR,
        }
    }
}
