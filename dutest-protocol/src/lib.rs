// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the control-message protocol spoken by dutest test runners.
//!
//! A runner is started with a [`RunnerArgs`] document on its standard input. In run mode it then
//! writes a sequence of [`ControlMessage`] values to standard output, one JSON object per line. In
//! list mode it writes a single [`ListOutput`] document instead.

mod errors;
mod exit_codes;
mod message;
mod runner_args;
mod wire;

pub use errors::*;
pub use exit_codes::*;
pub use message::*;
pub use runner_args::*;
pub use wire::*;
