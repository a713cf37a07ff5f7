// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::ProcessStreamError, ledger::TestResult};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::warn;

/// What a [`Diagnose`] implementation gets to look at.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct DiagnoseContext<'a> {
    /// The error that terminated message processing.
    pub error: &'a ProcessStreamError,

    /// The results accumulated before the error, in start order.
    pub results: &'a [TestResult],

    /// The test that was running when the error occurred, if any.
    pub running_test: Option<&'a str>,
}

/// Explains why a control stream terminated abnormally.
///
/// Transports implement this to surface conditions the core can't see on its own, such as a lost
/// connection or a device that rebooted. Returning an empty string means nothing more is known.
///
/// Any closure of the right shape implements this trait.
pub trait Diagnose: Send + Sync {
    /// Returns a human-readable diagnosis, or an empty string.
    fn diagnose(&self, cx: &DiagnoseContext<'_>) -> String;
}

impl<F> Diagnose for F
where
    F: Fn(&DiagnoseContext<'_>) -> String + Send + Sync,
{
    fn diagnose(&self, cx: &DiagnoseContext<'_>) -> String {
        self(cx)
    }
}

/// Runs `diagnose`, treating a panic like an empty diagnosis.
pub(crate) fn run_diagnosis(diagnose: &dyn Diagnose, cx: &DiagnoseContext<'_>) -> Option<String> {
    match catch_unwind(AssertUnwindSafe(|| diagnose.diagnose(cx))) {
        Ok(diagnosis) if diagnosis.trim().is_empty() => None,
        Ok(diagnosis) => Some(diagnosis),
        Err(_) => {
            warn!("diagnosis callback panicked, ignoring");
            None
        }
    }
}

/// Wraps `error` with a diagnosis if `diagnose` provides one.
pub(crate) fn apply_diagnosis(
    diagnose: Option<&dyn Diagnose>,
    error: ProcessStreamError,
    results: &[TestResult],
    running_test: Option<&str>,
) -> ProcessStreamError {
    let Some(diagnose) = diagnose else {
        return error;
    };
    let cx = DiagnoseContext {
        error: &error,
        results,
        running_test,
    };
    match run_diagnosis(diagnose, &cx) {
        Some(diagnosis) => ProcessStreamError::Diagnosed {
            diagnosis,
            error: Box::new(error),
        },
        None => error,
    }
}
