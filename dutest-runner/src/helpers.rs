// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for dutest-runner.

use chrono::{DateTime, FixedOffset, Local};

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "error" if `count` is 1, otherwise "errors".
    pub fn errors_str(count: usize) -> &'static str {
        if count == 1 { "error" } else { "errors" }
    }
}

/// The current wall-clock time, with the local offset.
pub(crate) fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// Formats a timestamp for log lines, in local time.
pub(crate) fn log_timestamp(time: DateTime<FixedOffset>) -> impl std::fmt::Display {
    time.with_timezone(&Local).format("%H:%M:%S%.3f")
}

/// Checks that a test name can be used as a single path component.
pub(crate) fn check_test_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        Err("name is empty")
    } else if name.contains(['/', '\\']) {
        Err("name contains a path separator")
    } else if name.contains('\0') {
        Err("name contains a NUL byte")
    } else if name == "." || name == ".." {
        Err("name is a relative path component")
    } else {
        Ok(())
    }
}
