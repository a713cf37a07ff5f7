// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisting run results to disk.
//!
//! Two files are written to a results directory:
//!
//! - `streamed_results.jsonl`, updated as each test starts and finishes, so that partial progress
//!   survives a crash of the orchestrator.
//! - `results.json`, written once when the run is over.

mod results_file;
mod streamed;

pub use results_file::*;
pub use streamed::*;
