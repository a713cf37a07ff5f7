// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Where test runners execute.
//!
//! A [`RunnerTarget`] knows how to start a runner process and how to bring the files it writes
//! back to the local machine. [`LocalTarget`] runs the runner directly on this machine; transports
//! to remote devices implement the same traits.

mod local;

pub use local::*;

use crate::errors::RunnerSpawnError;
use camino::{Utf8Path, Utf8PathBuf};
use dutest_protocol::RunnerArgs;
use std::{future::Future, io};
use tokio::process::{Child, ChildStdout};

/// Moves a directory tree from the machine a runner executed on to local storage, deleting the
/// source.
pub trait CopyAndRemove {
    /// Moves `src` (on the runner's machine) to `dst` (local). `dst` must not exist yet.
    ///
    /// A missing `src` is not an error: it means the runner produced no output files.
    fn copy_and_remove(
        &self,
        src: &Utf8Path,
        dst: &Utf8Path,
    ) -> impl Future<Output = io::Result<()>> + Send;
}

/// A place test runners can be started.
pub trait RunnerTarget: CopyAndRemove + Sync {
    /// Starts a runner and hands it `args`.
    fn spawn(
        &self,
        args: &RunnerArgs,
    ) -> impl Future<Output = Result<SpawnedRunner, RunnerSpawnError>> + Send;

    /// The directory, on the runner's machine, that the runner should write per-test outputs to.
    fn runner_out_dir(&self) -> Utf8PathBuf;
}

/// A runner process that has been started.
#[derive(Debug)]
pub struct SpawnedRunner {
    /// The process handle, used to reap or kill it once its output has been consumed.
    pub child: Child,

    /// The control-message stream (run mode) or test list (list mode).
    pub stdout: ChildStdout,
}
