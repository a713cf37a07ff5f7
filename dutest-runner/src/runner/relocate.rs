// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Moving files written by tests into their per-test output directories.
//!
//! Runners write each test's files to `<out-dir>/<test name>/` on the machine they run on. Once
//! the run ends, that tree is brought over to a staging directory inside the results directory and
//! its contents are merged into the directories that already hold each test's log.

use crate::{
    errors::{DisplayErrorChain, RelocateError},
    ledger::TestResult,
    target::CopyAndRemove,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs, io};
use tracing::{debug, warn};

/// The name of the staging directory within a results directory.
pub const STAGING_DIR_NAME: &str = ".staging";

/// Appended to an incoming file name while it collides with an existing file.
pub const COLLISION_SUFFIX: &str = ".from_test";

/// Brings the runner's output directory `src` over and distributes it into per-test directories.
///
/// Failures are logged and never propagated. The staging directory is removed afterwards in all
/// cases.
pub(crate) async fn relocate_outputs<C>(
    copier: &C,
    src: &Utf8Path,
    results_dir: &Utf8Path,
    results: &[TestResult],
) where
    C: CopyAndRemove,
{
    let staging = results_dir.join(STAGING_DIR_NAME);
    debug!(%src, %staging, "copying test outputs");

    match copier.copy_and_remove(src, &staging).await {
        Ok(()) => {
            if let Err(error) = move_staged_outputs(&staging, results) {
                warn!("{}", DisplayErrorChain::new(error));
            }
        }
        Err(error) => {
            let error = RelocateError::Copy {
                src: src.to_owned(),
                dst: staging.clone(),
                error,
            };
            warn!("{}", DisplayErrorChain::new(error));
        }
    }

    match fs::remove_dir_all(&staging) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => warn!(%staging, %error, "failed to remove staging directory"),
    }
}

/// Moves the contents of each `staging/<name>` directory into the output directory of the test
/// called `name`.
///
/// Only failing to list `staging` itself is an error. Problems with individual directories or
/// files are logged and skipped.
fn move_staged_outputs(staging: &Utf8Path, results: &[TestResult]) -> Result<(), RelocateError> {
    let entries = match fs::read_dir(staging) {
        Ok(entries) => entries,
        // The runner produced no output files.
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(RelocateError::ReadDir {
                path: staging.to_owned(),
                error,
            });
        }
    };

    for entry in entries {
        let entry = entry.map_err(|error| RelocateError::ReadDir {
            path: staging.to_owned(),
            error,
        })?;
        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(path) => {
                warn!("{}", DisplayErrorChain::new(RelocateError::NonUtf8Path { path }));
                continue;
            }
        };
        if !path.is_dir() {
            warn!(%path, "ignoring stray file in test outputs");
            continue;
        }

        let name = path.file_name().unwrap_or_default();
        let Some(result) = results.iter().find(|result| result.name() == name) else {
            warn!(test = name, "found outputs for unknown test, skipping");
            continue;
        };
        move_dir_contents(&path, &result.out_dir);
    }

    Ok(())
}

fn move_dir_contents(src_dir: &Utf8Path, dst_dir: &Utf8Path) {
    let entries = match src_dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(error) => {
            let error = RelocateError::ReadDir {
                path: src_dir.to_owned(),
                error,
            };
            warn!("{}", DisplayErrorChain::new(error));
            return;
        }
    };
    if let Err(error) = fs::create_dir_all(dst_dir) {
        warn!(%dst_dir, %error, "failed to create test output directory");
        return;
    }

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%src_dir, %error, "failed to read staged output");
                continue;
            }
        };
        let src = entry.path();
        let dst = free_destination(dst_dir.join(entry.file_name()));
        if let Err(error) = fs::rename(src, &dst) {
            let error = RelocateError::Move {
                src: src.to_owned(),
                dst,
                error,
            };
            warn!("{}", DisplayErrorChain::new(error));
        }
    }
}

/// Appends [`COLLISION_SUFFIX`] to `path` until nothing exists there.
fn free_destination(mut path: Utf8PathBuf) -> Utf8PathBuf {
    while path.symlink_metadata().is_ok() {
        path = Utf8PathBuf::from(format!("{path}{COLLISION_SUFFIX}"));
    }
    path
}
