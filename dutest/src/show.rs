// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Summaries of a results directory.

use crate::{
    errors::{ExpectedError, Result},
    output::StdoutStyles,
};
use camino::Utf8Path;
use dutest_runner::{
    ledger::{TestResult, TestStatus},
    record::{RESULTS_FILE_NAME, STREAMED_RESULTS_FILE_NAME, read_results, read_streamed_results},
};
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Results read back from disk.
#[derive(Debug)]
pub(crate) struct LoadedResults {
    pub(crate) results: Vec<TestResult>,
    /// True if the results were recovered from the streamed file of an interrupted run.
    pub(crate) recovered: bool,
}

/// Loads results from `path`.
///
/// `path` may be a results directory, a `results.json` file, or a streamed results file. A
/// directory without `results.json` falls back to its streamed results.
pub(crate) fn load_results(path: &Utf8Path) -> Result<LoadedResults> {
    if path.is_dir() {
        let results_file = path.join(RESULTS_FILE_NAME);
        if results_file.is_file() {
            return load_results_file(&results_file);
        }
        let streamed_file = path.join(STREAMED_RESULTS_FILE_NAME);
        if streamed_file.is_file() {
            return load_streamed_file(&streamed_file);
        }
        return Err(ExpectedError::NoResults {
            path: path.to_owned(),
        });
    }

    if path.extension() == Some("jsonl") {
        load_streamed_file(path)
    } else {
        load_results_file(path)
    }
}

fn load_results_file(path: &Utf8Path) -> Result<LoadedResults> {
    let results = read_results(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            ExpectedError::NoResults {
                path: path.to_owned(),
            }
        } else {
            ExpectedError::ReadResults {
                path: path.to_owned(),
                err,
            }
        }
    })?;
    Ok(LoadedResults {
        results,
        recovered: false,
    })
}

fn load_streamed_file(path: &Utf8Path) -> Result<LoadedResults> {
    Ok(LoadedResults {
        results: read_streamed_results(path)?,
        recovered: true,
    })
}

/// Writes one line per test, then a summary line.
pub(crate) fn write_summary(
    loaded: &LoadedResults,
    styles: &StdoutStyles,
    mut writer: impl Write,
) -> io::Result<()> {
    let (mut passed, mut failed, mut skipped, mut incomplete) = (0, 0, 0, 0);

    for result in &loaded.results {
        let status = result.status();
        let (label, style) = match status {
            TestStatus::Passed => {
                passed += 1;
                ("PASS", styles.pass)
            }
            TestStatus::Failed => {
                failed += 1;
                ("FAIL", styles.fail)
            }
            TestStatus::Skipped => {
                skipped += 1;
                ("SKIP", styles.skip)
            }
            TestStatus::Incomplete => {
                incomplete += 1;
                ("INCOMPLETE", styles.fail)
            }
        };

        let duration = match result.end {
            Some(end) => match (end - result.start).to_std() {
                Ok(elapsed) => format!("{:>8.3}s", elapsed.as_secs_f64()),
                // The clock went backwards.
                Err(_) => format!("{:>9}", "?"),
            },
            None => format!("{:>9}", ""),
        };
        writeln!(
            writer,
            "{} [{duration}] {}",
            format!("{label:>10}").style(style),
            result.name()
        )?;

        if let Some(reason) = &result.skip_reason {
            writeln!(writer, "{:>12} {reason}", "")?;
        }
        for error in &result.errors {
            writeln!(writer, "{:>12} {}", "", error.error)?;
        }
    }

    writeln!(writer, "------------")?;
    write!(
        writer,
        "{} {}: {} passed, {} failed, {} skipped",
        loaded.results.len().style(styles.count),
        if loaded.results.len() == 1 {
            "test"
        } else {
            "tests"
        },
        passed.style(styles.count),
        failed.style(styles.count),
        skipped.style(styles.count),
    )?;
    if incomplete > 0 {
        write!(writer, ", {} incomplete", incomplete.style(styles.count))?;
    }
    writeln!(writer)?;

    if loaded.recovered {
        writeln!(
            writer,
            "(recovered from {STREAMED_RESULTS_FILE_NAME}: the run did not finish)"
        )?;
    }

    Ok(())
}
