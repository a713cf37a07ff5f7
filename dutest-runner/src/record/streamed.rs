// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental, crash-tolerant persistence of test results.
//!
//! The streamed results file holds one JSON record per line. A record is written as soon as a test
//! starts, and replaced in place once the test finishes, so that a process dying at any point
//! leaves behind every test that started.

use crate::{errors::StreamedResultsError, ledger::TestResult};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
};
use tracing::warn;

/// The name of the streamed results file within a results directory.
pub const STREAMED_RESULTS_FILE_NAME: &str = "streamed_results.jsonl";

/// Writes test results to a single growing file, one record per line.
///
/// Not safe for concurrent writers: tests report serially, and the writer is owned by the single
/// consumer of the control stream.
#[derive(Debug)]
pub struct StreamedResultsWriter {
    path: Utf8PathBuf,
    file: File,
    // Offset and length of the most recently written record.
    last_record: Option<(u64, usize)>,
}

impl StreamedResultsWriter {
    /// Creates the file at `path`, discarding records left behind by a previous run.
    pub fn create(path: impl Into<Utf8PathBuf>) -> Result<Self, StreamedResultsError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|error| StreamedResultsError::Open {
                path: path.clone(),
                error,
            })?;

        Ok(Self {
            path,
            file,
            last_record: None,
        })
    }

    /// The path to the file being written.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes `result` as a record.
    ///
    /// If `update` is false, the record is appended. If `update` is true, it replaces the record
    /// written by the previous call.
    ///
    /// A replacement is written over the old record in place and never shrinks the file: a
    /// shorter record is padded with spaces before its newline. A crash part way through an
    /// update therefore never leaves the file without a record for the test.
    pub fn write(&mut self, result: &TestResult, update: bool) -> Result<(), StreamedResultsError> {
        let mut buf = serde_json::to_vec(result).map_err(|error| self.write_error(error.into()))?;

        let start = if update {
            let (start, old_len) = self.last_record.ok_or_else(|| {
                StreamedResultsError::NothingToUpdate {
                    path: self.path.clone(),
                }
            })?;
            // The old length includes its newline.
            if buf.len() + 1 < old_len {
                buf.resize(old_len - 1, b' ');
            }
            start
        } else {
            // An interrupted append is still the record the next update replaces.
            self.last_record = None;
            self.file
                .seek(SeekFrom::End(0))
                .map_err(|error| self.write_error(error))?
        };
        buf.push(b'\n');
        self.last_record = Some((start, buf.len()));

        self.file
            .seek(SeekFrom::Start(start))
            .and_then(|_| self.file.write_all(&buf))
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data())
            .map_err(|error| self.write_error(error))?;
        Ok(())
    }

    fn write_error(&self, error: io::Error) -> StreamedResultsError {
        StreamedResultsError::Write {
            path: self.path.clone(),
            error,
        }
    }
}

/// Reads back the records in a streamed results file.
///
/// A final line without a terminating newline is the remains of a write that was interrupted by
/// a crash: it is dropped with a warning rather than treated as an error.
pub fn read_streamed_results(path: &Utf8Path) -> Result<Vec<TestResult>, StreamedResultsError> {
    let read_error = |error| StreamedResultsError::Read {
        path: path.to_owned(),
        error,
    };
    let file = File::open(path).map_err(read_error)?;
    let mut reader = BufReader::new(file);

    let mut results = Vec::new();
    let mut line = String::new();
    let mut line_number = 0;
    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(read_error)?;
        if read == 0 {
            break;
        }
        line_number += 1;

        if !line.ends_with('\n') {
            warn!(
                path = %path,
                line_number,
                "ignoring incomplete trailing record in streamed results",
            );
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let result = serde_json::from_str(&line).map_err(|error| StreamedResultsError::Parse {
            path: path.to_owned(),
            line_number,
            error,
        })?;
        results.push(result);
    }

    Ok(results)
}
