// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// A single message in the control stream written by a test runner.
///
/// Messages are serialized as JSON objects tagged by a `type` field. Decoding goes through a
/// compatibility layer that upgrades the shapes older runners produce, so consumers only ever see
/// the canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", try_from = "crate::wire::WireMessage")]
pub enum ControlMessage {
    /// The run started. Always the first message in a stream.
    RunStart(RunStart),

    /// An informational message about the run as a whole.
    RunLog(RunLog),

    /// A fatal run-level error. No further messages are expected.
    RunError(RunError),

    /// The run finished. Always the last message in a well-formed stream.
    RunEnd(RunEnd),

    /// A test started.
    TestStart(TestStart),

    /// An informational message from the currently running test.
    TestLog(TestLog),

    /// An error reported by the currently running test.
    TestError(TestError),

    /// The currently running test finished.
    TestEnd(TestEnd),

    /// A liveness signal from the runner.
    Heartbeat(Heartbeat),
}

impl ControlMessage {
    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::RunStart(_) => MessageKind::RunStart,
            Self::RunLog(_) => MessageKind::RunLog,
            Self::RunError(_) => MessageKind::RunError,
            Self::RunEnd(_) => MessageKind::RunEnd,
            Self::TestStart(_) => MessageKind::TestStart,
            Self::TestLog(_) => MessageKind::TestLog,
            Self::TestError(_) => MessageKind::TestError,
            Self::TestEnd(_) => MessageKind::TestEnd,
            Self::Heartbeat(_) => MessageKind::Heartbeat,
        }
    }

    /// Returns the time at which the runner produced this message.
    pub fn time(&self) -> DateTime<FixedOffset> {
        match self {
            Self::RunStart(msg) => msg.time,
            Self::RunLog(msg) => msg.time,
            Self::RunError(msg) => msg.time,
            Self::RunEnd(msg) => msg.time,
            Self::TestStart(msg) => msg.time,
            Self::TestLog(msg) => msg.time,
            Self::TestError(msg) => msg.time,
            Self::TestEnd(msg) => msg.time,
            Self::Heartbeat(msg) => msg.time,
        }
    }
}

/// The kind of a [`ControlMessage`], without its payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`ControlMessage::RunStart`].
    RunStart,
    /// [`ControlMessage::RunLog`].
    RunLog,
    /// [`ControlMessage::RunError`].
    RunError,
    /// [`ControlMessage::RunEnd`].
    RunEnd,
    /// [`ControlMessage::TestStart`].
    TestStart,
    /// [`ControlMessage::TestLog`].
    TestLog,
    /// [`ControlMessage::TestError`].
    TestError,
    /// [`ControlMessage::TestEnd`].
    TestEnd,
    /// [`ControlMessage::Heartbeat`].
    Heartbeat,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RunStart => "RunStart",
            Self::RunLog => "RunLog",
            Self::RunError => "RunError",
            Self::RunEnd => "RunEnd",
            Self::TestStart => "TestStart",
            Self::TestLog => "TestLog",
            Self::TestError => "TestError",
            Self::TestEnd => "TestEnd",
            Self::Heartbeat => "Heartbeat",
        };
        f.write_str(s)
    }
}

/// Payload of [`ControlMessage::RunStart`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunStart {
    /// The time the run started.
    pub time: DateTime<FixedOffset>,

    /// The number of tests the runner is going to execute.
    pub num_tests: usize,

    /// The names of the tests, if the runner reports them up front.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_names: Vec<String>,
}

/// Payload of [`ControlMessage::RunLog`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunLog {
    /// The time the message was produced.
    pub time: DateTime<FixedOffset>,

    /// The message text.
    pub text: String,
}

/// Payload of [`ControlMessage::RunError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunError {
    /// The time the error occurred.
    pub time: DateTime<FixedOffset>,

    /// Details about the error.
    pub error: ErrorInfo,
}

/// Payload of [`ControlMessage::RunEnd`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunEnd {
    /// The time the run ended.
    pub time: DateTime<FixedOffset>,

    /// The directory, on the machine the runner executed on, containing one subdirectory of
    /// output files per test.
    ///
    /// `None` if the runner did not produce any output files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<Utf8PathBuf>,
}

/// Payload of [`ControlMessage::TestStart`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestStart {
    /// The time the test started.
    pub time: DateTime<FixedOffset>,

    /// Metadata describing the test.
    pub test: TestMetadata,
}

/// Payload of [`ControlMessage::TestLog`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestLog {
    /// The time the message was produced.
    pub time: DateTime<FixedOffset>,

    /// The message text.
    pub text: String,
}

/// Payload of [`ControlMessage::TestError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestError {
    /// The time the error occurred.
    pub time: DateTime<FixedOffset>,

    /// Details about the error.
    pub error: ErrorInfo,
}

/// Payload of [`ControlMessage::TestEnd`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestEnd {
    /// The time the test finished.
    pub time: DateTime<FixedOffset>,

    /// The name of the test that finished.
    pub name: String,

    /// Dependencies the test needed but that were not available. A non-empty list means that the
    /// test was skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_dependencies: Vec<String>,

    /// Timing information collected by the runner while executing the test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingStage>,
}

/// Payload of [`ControlMessage::Heartbeat`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Heartbeat {
    /// The time the heartbeat was sent.
    pub time: DateTime<FixedOffset>,
}

/// Static information about a test, as reported by the runner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestMetadata {
    /// The name of the test, unique within a run.
    pub name: String,

    /// A human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,

    /// Free-form attributes attached to the test.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,

    /// The time budget for the test body.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra time granted on top of [`Self::timeout`] for setup and teardown.
    #[serde(default, with = "humantime_serde")]
    pub additional_time: Duration,
}

impl TestMetadata {
    /// Creates metadata for a test with the given name and no time budget.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            attributes: Vec::new(),
            timeout: Duration::ZERO,
            additional_time: Duration::ZERO,
        }
    }

    /// Returns the total time budget for the test: its timeout plus the additional time.
    pub fn total_budget(&self) -> Duration {
        self.timeout.saturating_add(self.additional_time)
    }
}

/// Details about an error reported by a runner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ErrorInfo {
    /// A short description of what went wrong.
    pub reason: String,

    /// The source file the error was reported from, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,

    /// The line in [`Self::file`] the error was reported from, or 0 if unknown.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub line: u32,

    /// A stack trace captured when the error was reported.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stack: String,
}

impl ErrorInfo {
    /// Creates an error with only a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            file: String::new(),
            line: 0,
            stack: String::new(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}:{}: {}", self.file, self.line, self.reason)
        }
    }
}

fn is_zero(line: &u32) -> bool {
    *line == 0
}

/// A node in a timing tree.
///
/// Runners report one of these per test, and the orchestrator grafts them into its own timing log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimingStage {
    /// The name of the stage.
    pub name: String,

    /// When the stage started.
    pub start: DateTime<FixedOffset>,

    /// When the stage ended, or `None` if it never did.
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,

    /// Nested stages, in start order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TimingStage>,
}

impl TimingStage {
    /// Creates a new, open stage.
    pub fn new(name: impl Into<String>, start: DateTime<FixedOffset>) -> Self {
        Self {
            name: name.into(),
            start,
            end: None,
            children: Vec::new(),
        }
    }

    /// Returns the duration of this stage, if it has ended.
    pub fn duration(&self) -> Option<Duration> {
        let end = self.end?;
        (end - self.start).to_std().ok()
    }
}
