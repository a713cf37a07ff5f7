// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for dutest.
//!
//! A run starts a test runner on a [target](target::RunnerTarget), reads the control messages the
//! runner writes with [`process_stream`](runner::process_stream), and records the outcome of every
//! test in a results directory. Results are streamed to disk as tests start and finish, so that a
//! run interrupted at any point still accounts for every test that began.

pub mod config;
pub mod errors;
mod helpers;
pub mod ledger;
pub mod record;
pub mod runner;
pub mod target;
pub mod timing;
