// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use dutest_protocol::DutestExitCode;
use dutest_runner::errors::{
    ConfigParseError, ListTestsError, ProfileNotFound, StreamedResultsError,
};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with
// `display_to_stderr`, which styles them.

/// An error that dutest knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDir {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirNotUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("failed to create tokio runtime")]
    TokioRuntimeCreate {
        #[source]
        err: std::io::Error,
    },
    #[error("failed to list tests")]
    ListTests {
        #[from]
        err: ListTestsError,
    },
    #[error("no results found")]
    NoResults { path: Utf8PathBuf },
    #[error("failed to read results")]
    ReadResults {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to read streamed results")]
    ReadStreamedResults {
        #[from]
        err: StreamedResultsError,
    },
    #[error("failed to write output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn write_output(err: std::io::Error) -> Self {
        Self::WriteOutput { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDir { .. }
            | Self::CurrentDirNotUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::TokioRuntimeCreate { .. }
            | Self::NoResults { .. }
            | Self::ReadResults { .. }
            | Self::ReadStreamedResults { .. } => DutestExitCode::SETUP_ERROR,
            Self::ListTests { .. } => DutestExitCode::LIST_FAILED,
            Self::WriteOutput { .. } => DutestExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDir { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirNotUtf8 { err } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    err.as_path().display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse dutest config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                None
            }
            Self::TokioRuntimeCreate { err } => {
                error!("failed to create tokio runtime");
                Some(err as &dyn Error)
            }
            Self::ListTests { err } => {
                error!("failed to list tests");
                Some(err as &dyn Error)
            }
            Self::NoResults { path } => {
                error!(
                    "no results found at `{}`: run `dutest run` first",
                    path.style(styles.bold)
                );
                None
            }
            Self::ReadResults { path, err } => {
                error!("failed to read results from `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::ReadStreamedResults { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutput { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
