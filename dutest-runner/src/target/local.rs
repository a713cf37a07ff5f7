// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CopyAndRemove, RunnerTarget, SpawnedRunner};
use crate::errors::RunnerSpawnError;
use camino::{Utf8Path, Utf8PathBuf};
use cp_r::CopyOptions;
use dutest_protocol::RunnerArgs;
use std::{io, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

/// Runs a test runner executable on the local machine.
#[derive(Clone, Debug)]
pub struct LocalTarget {
    program: String,
    args: Vec<String>,
    out_dir: Utf8PathBuf,
}

impl LocalTarget {
    /// Creates a target that runs `program` with `args`, asking it to write outputs to `out_dir`.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        out_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            out_dir: out_dir.into(),
        }
    }

    /// The program this target runs.
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl RunnerTarget for LocalTarget {
    async fn spawn(&self, runner_args: &RunnerArgs) -> Result<SpawnedRunner, RunnerSpawnError> {
        let input = serde_json::to_vec(runner_args).expect("runner args are always serializable");

        debug!(program = %self.program, args = ?self.args, mode = ?runner_args.mode, "spawning runner");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| RunnerSpawnError::Spawn {
                program: self.program.clone(),
                error,
            })?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        let write_result = async {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        }
        .await;
        // Close stdin so the runner sees the end of its arguments.
        drop(stdin);
        if let Err(error) = write_result {
            // A runner that exits without reading its arguments shows up as a broken pipe here.
            // Its output is still worth decoding, since it may carry a RunError.
            if error.kind() != io::ErrorKind::BrokenPipe {
                return Err(RunnerSpawnError::WriteArgs {
                    program: self.program.clone(),
                    error,
                });
            }
            debug!(program = %self.program, "runner closed stdin before reading arguments");
        }

        let stdout = child.stdout.take().expect("stdout was piped");
        Ok(SpawnedRunner { child, stdout })
    }

    fn runner_out_dir(&self) -> Utf8PathBuf {
        self.out_dir.clone()
    }
}

impl CopyAndRemove for LocalTarget {
    async fn copy_and_remove(&self, src: &Utf8Path, dst: &Utf8Path) -> io::Result<()> {
        local_copy_and_remove(src, dst).await
    }
}

/// Moves a local directory tree, falling back to copy-then-delete across filesystems.
pub async fn local_copy_and_remove(src: &Utf8Path, dst: &Utf8Path) -> io::Result<()> {
    match tokio::fs::symlink_metadata(src).await {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    }

    if tokio::fs::rename(src, dst).await.is_ok() {
        return Ok(());
    }

    let (src, dst) = (src.to_owned(), dst.to_owned());
    tokio::task::spawn_blocking(move || {
        copy_dir_all(&src, &dst)?;
        std::fs::remove_dir_all(&src)
    })
    .await
    .map_err(io::Error::other)?
}

fn copy_dir_all(src: &Utf8Path, dst: &Utf8Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    CopyOptions::new()
        .copy_tree(src, dst)
        .map_err(io::Error::other)?;
    Ok(())
}
