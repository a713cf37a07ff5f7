// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::TestMetadata;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Arguments passed to a test runner as a JSON document on its standard input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerArgs {
    /// What the runner should do.
    pub mode: RunnerMode,

    /// Patterns selecting the tests to list or run.
    pub patterns: Vec<String>,

    /// The directory the runner should write per-test output files to, on the machine it runs on.
    ///
    /// Each test writes into a subdirectory named after the test.
    pub out_dir: Utf8PathBuf,

    /// How often the runner should send heartbeats while running tests, or `None` to not send any.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<Duration>,
}

/// The operation a runner performs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerMode {
    /// Print the selected tests as a [`ListOutput`] document and exit.
    List,

    /// Run the selected tests, writing control messages.
    Run,
}

/// The document a runner writes in [`RunnerMode::List`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListOutput {
    /// The selected tests, in the order they would run.
    pub tests: Vec<TestMetadata>,
}
