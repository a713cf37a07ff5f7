// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line parsing and command routing.

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts},
    show::{load_results, write_summary},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dutest_protocol::{DutestExitCode, ListOutput};
use dutest_runner::{
    config::{DutestConfig, DutestProfile},
    runner::{TestRunnerBuilder, list_tests},
    target::LocalTarget,
};
use std::{
    io::{self, Write},
    time::Duration,
};
use tracing::{debug, info, warn};

/// Runs integration tests against a device under test.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles(),
    max_term_width = 100,
)]
pub struct DutestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl DutestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let workspace_root = match &self.config_opts.workspace_root {
            Some(root) => root.clone(),
            None => current_dir()?,
        };

        match self.command {
            Command::List(opts) => {
                let config = self.config_opts.make_config(&workspace_root)?;
                let profile = config.profile(self.config_opts.profile_name())?;
                opts.exec(&profile)?;
                Ok(DutestExitCode::OK)
            }
            Command::Run(opts) => {
                let config = self.config_opts.make_config(&workspace_root)?;
                let profile = config.profile(self.config_opts.profile_name())?;
                opts.exec(&profile)
            }
            Command::ShowResults(opts) => {
                let path = match opts.path {
                    Some(path) => path,
                    None => {
                        let config = self.config_opts.make_config(&workspace_root)?;
                        config.profile(self.config_opts.profile_name())?.results_dir()
                    }
                };
                let loaded = load_results(&path)?;
                write_summary(&loaded, &output.stdout_styles(), io::stdout().lock())
                    .map_err(ExpectedError::write_output)?;
                Ok(DutestExitCode::OK)
            }
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the tests a runner knows about
    List(ListOpts),

    /// Run tests and record their results
    Run(RunOpts),

    /// Summarize the results of a run
    ///
    /// Reads `results.json`, or the streamed results left behind by an interrupted run.
    ShowResults(ShowResultsOpts),
}

/// Configuration options.
#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Workspace root [default: current directory]
    #[arg(long, global = true, value_name = "DIR", env = "DUTEST_WORKSPACE_ROOT")]
    workspace_root: Option<Utf8PathBuf>,

    /// Config file [default: workspace-root/.config/dutest.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// The dutest profile to use
    #[arg(long, short = 'P', global = true, env = "DUTEST_PROFILE")]
    profile: Option<String>,
}

impl ConfigOpts {
    fn make_config(&self, workspace_root: &Utf8Path) -> Result<DutestConfig> {
        Ok(DutestConfig::from_sources(
            workspace_root,
            self.config_file.as_deref(),
        )?)
    }

    fn profile_name(&self) -> &str {
        self.profile
            .as_deref()
            .unwrap_or(DutestConfig::DEFAULT_PROFILE)
    }
}

/// How to start the test runner.
#[derive(Debug, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Test runner executable
    #[arg(long, value_name = "PROGRAM", env = "DUTEST_RUNNER")]
    runner: String,

    /// Argument to pass to the runner (may be repeated)
    #[arg(long = "runner-arg", value_name = "ARG", allow_hyphen_values = true)]
    runner_args: Vec<String>,

    /// Directory the runner writes test output files to [default: <results-dir>/.runner-out]
    #[arg(long, value_name = "DIR")]
    runner_out_dir: Option<Utf8PathBuf>,
}

impl RunnerOpts {
    fn make_target(&self, results_dir: &Utf8Path) -> LocalTarget {
        let out_dir = self
            .runner_out_dir
            .clone()
            .unwrap_or_else(|| results_dir.join(".runner-out"));
        LocalTarget::new(&self.runner, &self.runner_args, out_dir)
    }
}

#[derive(Debug, Args)]
struct ListOpts {
    #[clap(flatten)]
    runner: RunnerOpts,

    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormat,

    /// Test name patterns, passed through to the runner
    patterns: Vec<String>,
}

impl ListOpts {
    fn exec(self, profile: &DutestProfile<'_>) -> Result<()> {
        let target = self.runner.make_target(&profile.results_dir());
        let runtime = make_runtime()?;
        let tests = runtime.block_on(list_tests(
            &target,
            &self.patterns,
            profile.message_timeout(),
            ctrl_c(),
        ))?;

        let mut stdout = io::stdout().lock();
        let res = match self.message_format {
            MessageFormat::Human => tests
                .iter()
                .try_for_each(|test| writeln!(stdout, "{}", test.name)),
            MessageFormat::Json => {
                let output = ListOutput { tests };
                serde_json::to_writer_pretty(&mut stdout, &output)
                    .map_err(io::Error::from)
                    .and_then(|()| writeln!(stdout))
            }
        };
        res.map_err(ExpectedError::write_output)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    /// One test name per line
    #[default]
    Human,
    /// The runner's list document, pretty-printed
    Json,
}

#[derive(Debug, Args)]
struct RunOpts {
    #[clap(flatten)]
    runner: RunnerOpts,

    /// Results directory [default: results-dir from the profile, plus the profile name]
    #[arg(long, value_name = "DIR")]
    results_dir: Option<Utf8PathBuf>,

    /// Time to wait for each control message, overriding the profile
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    message_timeout: Option<Duration>,

    /// Abandon the run after this long
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    run_timeout: Option<Duration>,

    /// Test name patterns, passed through to the runner
    patterns: Vec<String>,
}

impl RunOpts {
    fn exec(self, profile: &DutestProfile<'_>) -> Result<i32> {
        let results_dir = self.results_dir.unwrap_or_else(|| profile.results_dir());
        let target = self.runner.make_target(&results_dir);

        let mut builder = TestRunnerBuilder::default();
        builder.apply_profile(profile);
        if let Some(timeout) = self.message_timeout {
            builder.set_message_timeout(timeout);
        }

        let runtime = make_runtime()?;
        let status = runtime.block_on(async {
            if let Some(run_timeout) = self.run_timeout {
                builder.set_deadline(tokio::time::Instant::now() + run_timeout);
            }
            let runner = builder.build(target, &results_dir);
            info!(
                target: dutest_runner::runner::STATUS_TARGET,
                "Writing results to {}",
                runner.results_dir(),
            );
            runner.execute(&self.patterns, ctrl_c()).await
        });

        let exit_code = status.exit_code();
        debug!(exit_code, "run finished");
        Ok(exit_code)
    }
}

#[derive(Debug, Args)]
struct ShowResultsOpts {
    /// Results directory or file [default: the profile's results directory]
    path: Option<Utf8PathBuf>,
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDir { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirNotUtf8 { err })
}

fn make_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("dutest-worker")
        .build()
        .map_err(|err| ExpectedError::TokioRuntimeCreate { err })
}

/// Resolves once the user presses Ctrl-C.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("received Ctrl-C, canceling"),
        Err(error) => {
            warn!(%error, "failed to listen for Ctrl-C, the run cannot be canceled");
            std::future::pending::<()>().await;
        }
    }
}
