// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Final, whole-run results files.

use crate::{errors::ResultsWriteError, ledger::TestResult, timing::TimingLog};
use camino::Utf8Path;
use serde::Serialize;
use std::io::{self, Write};

/// The name of the final results file within a results directory.
pub const RESULTS_FILE_NAME: &str = "results.json";

/// The name of the timing log within a results directory.
pub const TIMING_FILE_NAME: &str = "timing.json";

/// Writes `results` to `results.json` in `results_dir`, as a single JSON array.
///
/// The file is replaced atomically, so readers never observe a partially written array.
pub fn write_results(results_dir: &Utf8Path, results: &[TestResult]) -> Result<(), ResultsWriteError> {
    write_json(&results_dir.join(RESULTS_FILE_NAME), &results)
}

/// Writes `timing` to `timing.json` in `results_dir`.
pub fn write_timing(results_dir: &Utf8Path, timing: &TimingLog) -> Result<(), ResultsWriteError> {
    write_json(&results_dir.join(TIMING_FILE_NAME), timing)
}

/// Reads a `results.json` file written by [`write_results`].
pub fn read_results(path: &Utf8Path) -> io::Result<Vec<TestResult>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_json(path: &Utf8Path, value: &impl Serialize) -> Result<(), ResultsWriteError> {
    atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
        .write(|file| {
            let mut writer = io::BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
            writer.flush()
        })
        .map_err(|error| {
            let error = match error {
                atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error) => error,
            };
            ResultsWriteError::new(path, error)
        })
}
