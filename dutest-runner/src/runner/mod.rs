// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`]. The core of a run is [`process_stream`],
//! which turns a runner's control messages into test results.

mod diagnose;
mod dispatcher;
mod imp;
mod list;
mod reader;
mod relocate;
mod status;
mod timeout;

pub use diagnose::{Diagnose, DiagnoseContext};
pub use dispatcher::{
    STATUS_TARGET, StreamConfig, StreamContext, StreamOutcome, TEST_LOG_FILE_NAME, TESTS_DIR_NAME,
    UNFINISHED_TEST_REASON, process_stream,
};
pub use imp::*;
pub use list::list_tests;
pub use relocate::{COLLISION_SUFFIX, STAGING_DIR_NAME};
pub use status::*;
pub use timeout::DEFAULT_MESSAGE_TIMEOUT;
