// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs integration tests against a device under test.
//!
//! `dutest` starts a test runner, follows the control messages it streams back, and records a
//! results directory with per-test logs, output files, and a results file that survives crashes.
//! The logic lives in the `dutest-runner` crate; this crate is the command-line interface.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod show;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
