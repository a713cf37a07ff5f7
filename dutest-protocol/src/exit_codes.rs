// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `dutest` failures.
///
/// `dutest` runs may fail for a variety of reasons. This structure documents the exit codes that
/// may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum DutestExitCode {}

impl DutestExitCode {
    /// No errors occurred and dutest exited normally.
    pub const OK: i32 = 0;

    /// The run completed, but one or more tests reported errors.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The run was aborted after at least one test had started.
    ///
    /// A results directory was written, and it contains every test that started.
    pub const RUN_ABORTED: i32 = 101;

    /// Listing tests produced an error.
    pub const LIST_FAILED: i32 = 104;

    /// A problem happened before any test started.
    ///
    /// No results directory was written.
    pub const SETUP_ERROR: i32 = 96;

    /// Writing results files, or data to stdout or stderr, produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
