// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by dutest.

use crate::helpers::plural;
use camino::Utf8PathBuf;
use config::ConfigError;
use dutest_protocol::{ErrorInfo, MessageKind};
use std::{error::Error, fmt, io, time::Duration};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse dutest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error which indicates that a profile was requested but not known to dutest.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurred while reading the control-message stream from a runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamReadError {
    /// The underlying byte stream returned an error.
    #[error("error reading control stream")]
    Io(#[source] io::Error),

    /// A line could not be decoded as a control message.
    #[error("malformed control message on line {line_number}")]
    Decode {
        /// The 1-based line number of the malformed message.
        line_number: usize,

        /// The underlying decode error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that terminated processing of a control-message stream.
///
/// Processing always returns the results accumulated so far alongside this error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessStreamError {
    /// A message other than RunStart arrived first.
    #[error("no RunStart message before {kind}")]
    NoRunStart {
        /// The kind of the first message.
        kind: MessageKind,
    },

    /// A second RunStart arrived.
    #[error("multiple RunStart messages")]
    DuplicateRunStart,

    /// A second RunEnd arrived.
    #[error("multiple RunEnd messages")]
    DuplicateRunEnd,

    /// A message arrived after RunEnd.
    #[error("got {kind} message after RunEnd")]
    MessageAfterRunEnd {
        /// The kind of the late message.
        kind: MessageKind,
    },

    /// A TestStart arrived while another test was still running.
    #[error("got TestStart for {new} while {running} is still running")]
    TestAlreadyRunning {
        /// The test that is still running.
        running: String,

        /// The test that was started.
        new: String,
    },

    /// A TestStart arrived for a test that has already run.
    #[error("got TestStart for already-seen test {name}")]
    TestAlreadySeen {
        /// The name of the test.
        name: String,
    },

    /// A TestStart named a test that can't be used as a directory name.
    #[error("got TestStart for invalid test name {name:?}: {reason}")]
    InvalidTestName {
        /// The name of the test.
        name: String,

        /// Why the name was rejected.
        reason: &'static str,
    },

    /// A test-scoped message arrived while no test was running.
    #[error("got {kind} message while no test is running")]
    NoTestRunning {
        /// The kind of the message.
        kind: MessageKind,
    },

    /// A TestEnd arrived while no test was running.
    #[error("got TestEnd for not-started test {name}")]
    TestNotStarted {
        /// The name in the TestEnd message.
        name: String,
    },

    /// A TestEnd arrived for a test other than the running one.
    #[error("got wrong TestEnd for {actual} while {expected} is running")]
    WrongTestEnd {
        /// The test that is running.
        expected: String,

        /// The name in the TestEnd message.
        actual: String,
    },

    /// RunEnd arrived while a test was still running.
    #[error("got RunEnd while {name} is still running")]
    RunEndWhileTestRunning {
        /// The test that is still running.
        name: String,
    },

    /// The runner reported a fatal run-level error.
    #[error("runner reported error: {error}")]
    RunError {
        /// The error reported by the runner.
        error: ErrorInfo,
    },

    /// The control stream could not be read or decoded.
    #[error("failed to read control messages")]
    Read(#[from] StreamReadError),

    /// The control stream ended before RunEnd.
    #[error("no RunEnd message")]
    NoRunEnd,

    /// The number of tests that ran differs from the number announced in RunStart.
    #[error(
        "got results for {actual} {}; expected {expected}",
        plural::tests_str(*actual)
    )]
    CountMismatch {
        /// The number of tests announced.
        expected: usize,

        /// The number of tests that ran.
        actual: usize,
    },

    /// No message arrived within the computed timeout.
    #[error(
        "timed out after {} waiting for control message",
        humantime::format_duration(*timeout)
    )]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The run was canceled externally.
    #[error("run canceled")]
    Canceled,

    /// Preparing the output directory or log file of a test failed.
    #[error("failed to prepare output for test {name}")]
    TestOutput {
        /// The name of the test.
        name: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Writing the streamed results file failed.
    #[error("failed to record results")]
    StreamedResults(#[from] StreamedResultsError),

    /// A diagnosis callback explained the underlying error.
    #[error("{diagnosis}")]
    Diagnosed {
        /// The diagnosis.
        diagnosis: String,

        /// The error that was diagnosed.
        #[source]
        error: Box<ProcessStreamError>,
    },
}

impl ProcessStreamError {
    /// Returns the error this one was derived from, looking through any diagnosis.
    pub fn undiagnosed(&self) -> &ProcessStreamError {
        match self {
            Self::Diagnosed { error, .. } => error.undiagnosed(),
            other => other,
        }
    }

    /// Returns true if this error was caused by a message timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.undiagnosed(), Self::Timeout { .. })
    }

    /// Returns true if this error was caused by external cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self.undiagnosed(), Self::Canceled)
    }
}

/// An error that occurred while writing or reading the streamed results file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamedResultsError {
    /// The file could not be opened.
    #[error("failed to open streamed results file `{path}`")]
    Open {
        /// The path to the file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A record could not be written.
    #[error("failed to write to streamed results file `{path}`")]
    Write {
        /// The path to the file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// An update was requested before any record was written.
    #[error("no previous record to update in streamed results file `{path}`")]
    NothingToUpdate {
        /// The path to the file.
        path: Utf8PathBuf,
    },

    /// The file could not be read.
    #[error("failed to read streamed results file `{path}`")]
    Read {
        /// The path to the file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A complete record could not be parsed.
    #[error("malformed record on line {line_number} of `{path}`")]
    Parse {
        /// The path to the file.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while moving per-test output files into place.
///
/// These errors are logged and never fail a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelocateError {
    /// Copying the runner's output directory to local staging failed.
    #[error("failed to copy test outputs from `{src}` to `{dst}`")]
    Copy {
        /// The runner's output directory.
        src: Utf8PathBuf,

        /// The local staging directory.
        dst: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The staging directory could not be listed.
    #[error("failed to read staging directory `{path}`")]
    ReadDir {
        /// The directory being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A staged file has a name that isn't valid UTF-8.
    #[error("staged output `{}` has a non-UTF-8 name", .path.display())]
    NonUtf8Path {
        /// The offending path.
        path: std::path::PathBuf,
    },

    /// A single file could not be moved.
    #[error("failed to move `{src}` to `{dst}`")]
    Move {
        /// The staged file.
        src: Utf8PathBuf,

        /// The destination.
        dst: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while writing the final results files.
#[derive(Debug, Error)]
#[error("failed to write `{path}`")]
pub struct ResultsWriteError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl ResultsWriteError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while starting a runner process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerSpawnError {
    /// The process could not be spawned.
    #[error("failed to spawn runner `{program}`")]
    Spawn {
        /// The program that was run.
        program: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The runner arguments could not be written to the process.
    #[error("failed to send arguments to runner `{program}`")]
    WriteArgs {
        /// The program that was run.
        program: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while listing tests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ListTestsError {
    /// The runner could not be started.
    #[error(transparent)]
    Spawn(#[from] RunnerSpawnError),

    /// The runner's output could not be read.
    #[error("failed to read test list from runner")]
    Read(#[source] io::Error),

    /// The runner's output could not be decoded.
    #[error("failed to decode test list from runner")]
    Decode(#[source] serde_json::Error),

    /// The runner listed the same test more than once.
    #[error("runner listed test {name} more than once")]
    DuplicateTest {
        /// The name of the test.
        name: String,
    },

    /// The runner didn't finish writing its list in time.
    #[error(
        "timed out after {} waiting for test list",
        humantime::format_duration(*timeout)
    )]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Listing was canceled externally.
    #[error("listing canceled")]
    Canceled,
}

/// An error that caused a run to fail.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunTestsError {
    /// The results directory could not be prepared.
    #[error("failed to prepare results directory: error at `{path}`")]
    ResultsDir {
        /// The results directory, or the stale entry in it that could not be removed.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The streamed results file could not be opened.
    #[error(transparent)]
    StreamedResults(#[from] StreamedResultsError),

    /// The runner could not be started.
    #[error(transparent)]
    Spawn(#[from] RunnerSpawnError),

    /// Processing the control stream failed.
    #[error(transparent)]
    Stream(#[from] ProcessStreamError),

    /// The final results files could not be written.
    #[error(transparent)]
    WriteResults(#[from] ResultsWriteError),
}

/// Displays an error along with its chain of sources.
#[derive(Clone, Debug)]
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(error) = source {
            write!(f, "\n  - {error}")?;
            source = error.source();
        }

        Ok(())
    }
}
