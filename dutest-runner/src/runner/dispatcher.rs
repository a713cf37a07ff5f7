// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processing of a single run's control-message stream.
//!
//! [`process_stream`] consumes the messages a runner writes, validates them against the run
//! lifecycle (RunStart, then zero or more tests, then RunEnd) and applies them to a
//! [`RunLedger`]. Progress is persisted through a [`StreamedResultsWriter`] as each test starts
//! and finishes.
//!
//! Every exit path, successful or not, returns the results accumulated so far. A test that is still
//! running when processing stops gets a synthetic error, in memory and on disk.

use super::{
    diagnose::{Diagnose, apply_diagnosis},
    reader::{ReadItem, spawn_reader},
    relocate::relocate_outputs,
    timeout::{DEFAULT_MESSAGE_TIMEOUT, TimeoutGovernor},
};
use crate::{
    errors::{DisplayErrorChain, ProcessStreamError},
    helpers::{check_test_name, log_timestamp, now, plural},
    ledger::{RunLedger, RunPhase, TestResult, TestStatus},
    record::StreamedResultsWriter,
    target::CopyAndRemove,
    timing::TimingLog,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use dutest_protocol::{
    ControlMessage, ErrorInfo, MessageKind, RunEnd, RunStart, TestEnd, TestError, TestLog,
    TestStart,
};
use std::{
    fmt,
    fs::File,
    future::Future,
    io::{self, LineWriter, Write},
    pin::pin,
    time::Duration,
};
use tokio::{io::AsyncRead, sync::mpsc::UnboundedReceiver, time::Instant};
use tracing::{debug, error, info, trace, warn};

/// The tracing target for short-lived progress lines.
pub const STATUS_TARGET: &str = "dutest::status";

/// The directory, within a results directory, holding one subdirectory per test.
pub const TESTS_DIR_NAME: &str = "tests";

/// The name of the log file in each test's output directory.
pub const TEST_LOG_FILE_NAME: &str = "log.txt";

/// The reason recorded against a test that was still running when processing stopped.
pub const UNFINISHED_TEST_REASON: &str = "test did not finish";

/// Limits applied while waiting for control messages.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// How long to wait for each message, on top of the budget of a running test.
    pub message_timeout: Duration,

    /// A point in time after which no more messages are waited for.
    pub deadline: Option<Instant>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            deadline: None,
        }
    }
}

/// Where [`process_stream`] writes what it learns.
#[derive(Debug)]
pub struct StreamContext<'a> {
    results_dir: &'a Utf8Path,
    writer: &'a mut StreamedResultsWriter,
    timing: &'a mut TimingLog,
}

impl<'a> StreamContext<'a> {
    /// Creates a new context.
    ///
    /// Per-test directories are created under `results_dir`, results are streamed to `writer`,
    /// and runner-reported timing is grafted into `timing`.
    pub fn new(
        results_dir: &'a Utf8Path,
        writer: &'a mut StreamedResultsWriter,
        timing: &'a mut TimingLog,
    ) -> Self {
        Self {
            results_dir,
            writer,
            timing,
        }
    }
}

/// The result of [`process_stream`].
#[derive(Debug)]
pub struct StreamOutcome {
    /// The results accumulated before processing stopped, in start order.
    pub results: Vec<TestResult>,

    /// The number of tests the runner announced, or 0 if it never sent RunStart.
    pub expected_tests: usize,

    /// The error that stopped processing, if any.
    pub error: Option<ProcessStreamError>,
}

impl StreamOutcome {
    /// Returns true if at least one test started.
    pub fn tests_began(&self) -> bool {
        !self.results.is_empty()
    }
}

/// Reads control messages from `stream` until it closes, a fatal condition is hit, or `cancel`
/// resolves.
///
/// When the run ends, per-test output files are brought over from the runner with `copier` and
/// moved into place. If processing fails, `diagnose` (if provided) gets a chance to explain the
/// failure.
pub async fn process_stream<R, C, F>(
    cx: StreamContext<'_>,
    config: &StreamConfig,
    stream: R,
    copier: &C,
    diagnose: Option<&dyn Diagnose>,
    cancel: F,
) -> StreamOutcome
where
    R: AsyncRead + Unpin + Send + 'static,
    C: CopyAndRemove,
    F: Future<Output = ()>,
{
    let (mut rx, reader) = spawn_reader(stream);

    let mut processor = StreamProcessor {
        cx,
        copier,
        ledger: RunLedger::new(),
        governor: TimeoutGovernor::new(config.message_timeout, config.deadline),
        log: None,
    };
    let result = processor.run(&mut rx, cancel).await;
    reader.abort();

    processor.finish(result, diagnose)
}

struct StreamProcessor<'a, C> {
    cx: StreamContext<'a>,
    copier: &'a C,
    ledger: RunLedger,
    governor: TimeoutGovernor,
    // Open while a test is running.
    log: Option<TestLogFile>,
}

impl<C: CopyAndRemove> StreamProcessor<'_, C> {
    async fn run<F>(
        &mut self,
        rx: &mut UnboundedReceiver<ReadItem>,
        cancel: F,
    ) -> Result<(), ProcessStreamError>
    where
        F: Future<Output = ()>,
    {
        let mut cancel = pin!(cancel);

        loop {
            let timeout = self.governor.next_timeout(Instant::now());
            let item = tokio::select! {
                biased;

                () = &mut cancel => {
                    return Err(ProcessStreamError::Canceled);
                }
                item = rx.recv() => item,
                () = tokio::time::sleep(timeout) => {
                    if self.governor.deadline_passed(Instant::now()) {
                        debug!("run deadline reached");
                    }
                    return Err(ProcessStreamError::Timeout { timeout });
                }
            };

            match item {
                Some(Ok(message)) => self.handle_message(message).await?,
                Some(Err(error)) => return Err(error.into()),
                None => return self.check_complete(),
            }
        }
    }

    async fn handle_message(&mut self, message: ControlMessage) -> Result<(), ProcessStreamError> {
        let kind = message.kind();
        trace!(?kind, time = %message.time(), "received control message");
        match (self.ledger.phase(), kind) {
            (_, MessageKind::RunStart | MessageKind::RunError) => {}
            (RunPhase::AwaitingRunStart, _) => {
                return Err(ProcessStreamError::NoRunStart { kind });
            }
            // The ledger reports the duplicate.
            (RunPhase::Done, MessageKind::RunEnd) => {}
            (RunPhase::Done, _) => {
                return Err(ProcessStreamError::MessageAfterRunEnd { kind });
            }
            (RunPhase::RunningNoTest | RunPhase::RunningOneTest, _) => {}
        }

        match message {
            ControlMessage::RunStart(msg) => self.run_start(msg),
            ControlMessage::RunLog(msg) => {
                info!("{} {}", log_timestamp(msg.time), msg.text);
                Ok(())
            }
            ControlMessage::RunError(msg) => {
                log_stack(&msg.error);
                Err(ProcessStreamError::RunError { error: msg.error })
            }
            ControlMessage::RunEnd(msg) => self.run_end(msg).await,
            ControlMessage::TestStart(msg) => self.test_start(msg),
            ControlMessage::TestLog(msg) => self.test_log(msg),
            ControlMessage::TestError(msg) => self.test_error(msg),
            ControlMessage::TestEnd(msg) => self.test_end(msg),
            ControlMessage::Heartbeat(_) => {
                self.governor.heartbeat();
                Ok(())
            }
        }
    }

    fn run_start(&mut self, msg: RunStart) -> Result<(), ProcessStreamError> {
        self.ledger.start_run(msg.time, msg.num_tests)?;
        info!(
            target: STATUS_TARGET,
            "Running {} {}",
            msg.num_tests,
            plural::tests_str(msg.num_tests),
        );
        if !msg.test_names.is_empty() {
            debug!(tests = ?msg.test_names, "runner announced tests");
        }
        Ok(())
    }

    async fn run_end(&mut self, msg: RunEnd) -> Result<(), ProcessStreamError> {
        self.ledger.end_run(msg.time)?;
        if let Some(elapsed) = self
            .ledger
            .run_start()
            .and_then(|start| (msg.time - start).to_std().ok())
        {
            debug!(
                out_dir = ?msg.out_dir,
                "run ended after {}",
                humantime::format_duration(elapsed),
            );
        } else {
            debug!(out_dir = ?msg.out_dir, "run ended");
        }

        if let Some(out_dir) = &msg.out_dir {
            relocate_outputs(
                self.copier,
                out_dir,
                self.cx.results_dir,
                self.ledger.results(),
            )
            .await;
        }
        Ok(())
    }

    fn test_start(&mut self, msg: TestStart) -> Result<(), ProcessStreamError> {
        let name = msg.test.name.clone();
        check_test_name(&name).map_err(|reason| ProcessStreamError::InvalidTestName {
            name: name.clone(),
            reason,
        })?;

        let out_dir = self.cx.results_dir.join(TESTS_DIR_NAME).join(&name);
        let budget = msg.test.total_budget();
        let result = self.ledger.open(msg.test, msg.time, &out_dir)?;
        self.governor.test_started(Instant::now(), budget);
        self.cx.writer.write(result, false)?;

        info!(target: STATUS_TARGET, "Running {name}");
        let mut log = TestLogFile::create(&out_dir)
            .map_err(|error| ProcessStreamError::TestOutput { name, error })?;
        log.write_line(msg.time, "Started test");
        self.log = Some(log);
        Ok(())
    }

    fn test_log(&mut self, msg: TestLog) -> Result<(), ProcessStreamError> {
        if self.ledger.open_test().is_none() {
            return Err(ProcessStreamError::NoTestRunning {
                kind: MessageKind::TestLog,
            });
        }
        info!("{} {}", log_timestamp(msg.time), msg.text);
        if let Some(log) = &mut self.log {
            log.write_line(msg.time, &msg.text);
        }
        Ok(())
    }

    fn test_error(&mut self, msg: TestError) -> Result<(), ProcessStreamError> {
        let time = msg.time;
        let line = format!("Error at {}", msg.error);
        let stack = msg.error.stack.clone();

        if self.ledger.add_error(msg).is_none() {
            return Err(ProcessStreamError::NoTestRunning {
                kind: MessageKind::TestError,
            });
        }
        info!("{} {line}", log_timestamp(time));
        if !stack.is_empty() {
            debug!("Stack trace:\n{stack}");
        }
        if let Some(log) = &mut self.log {
            log.write_line(time, &line);
            if !stack.is_empty() {
                log.write_line(time, format_args!("Stack trace:\n{stack}"));
            }
        }
        Ok(())
    }

    fn test_end(&mut self, msg: TestEnd) -> Result<(), ProcessStreamError> {
        let result = self
            .ledger
            .close(&msg.name, msg.time, &msg.missing_dependencies)?;
        self.cx
            .timing
            .import_test(result.name(), result.start, msg.time, msg.timing);
        self.cx.writer.write(result, true)?;
        self.governor.test_finished();

        if let Some(mut log) = self.log.take() {
            log.write_line(msg.time, "Completed test");
        }

        let elapsed = (msg.time - result.start).to_std().unwrap_or_default();
        match result.status() {
            TestStatus::Passed => info!(
                target: STATUS_TARGET,
                "PASS {} ({:.3}s)",
                msg.name,
                elapsed.as_secs_f64(),
            ),
            TestStatus::Failed => info!(
                target: STATUS_TARGET,
                "FAIL {} ({:.3}s, {} {})",
                msg.name,
                elapsed.as_secs_f64(),
                result.errors.len(),
                plural::errors_str(result.errors.len()),
            ),
            TestStatus::Skipped => info!(
                target: STATUS_TARGET,
                "SKIP {}: {}",
                msg.name,
                result.skip_reason.as_deref().unwrap_or_default(),
            ),
            TestStatus::Incomplete => {}
        }
        Ok(())
    }

    fn check_complete(&self) -> Result<(), ProcessStreamError> {
        if self.ledger.phase() != RunPhase::Done {
            return Err(ProcessStreamError::NoRunEnd);
        }
        let expected = self.ledger.expected_tests();
        let actual = self.ledger.results().len();
        if expected != actual {
            return Err(ProcessStreamError::CountMismatch { expected, actual });
        }
        Ok(())
    }

    fn finish(
        self,
        result: Result<(), ProcessStreamError>,
        diagnose: Option<&dyn Diagnose>,
    ) -> StreamOutcome {
        let Self {
            mut cx,
            mut ledger,
            mut log,
            ..
        } = self;

        let error = result.err();
        if let Some(error) = &error {
            error!("{}", DisplayErrorChain::new(error));
        }

        let running_test = ledger.open_test().map(|result| result.name().to_owned());
        let time = now();
        if let Some(result) = ledger.abandon(time, UNFINISHED_TEST_REASON) {
            error!(test = result.name(), "{UNFINISHED_TEST_REASON}");
            if let Some(log) = &mut log {
                log.write_line(time, UNFINISHED_TEST_REASON);
            }
            if let Err(error) = cx.writer.write(result, true) {
                warn!("{}", DisplayErrorChain::new(error));
            }
        }
        drop(log);

        let error = error.map(|error| {
            let error = apply_diagnosis(
                diagnose,
                error,
                ledger.results(),
                running_test.as_deref(),
            );
            if let ProcessStreamError::Diagnosed { diagnosis, .. } = &error {
                error!("{diagnosis}");
            }
            error
        });

        StreamOutcome {
            expected_tests: ledger.expected_tests(),
            results: ledger.into_results(),
            error,
        }
    }
}

fn log_stack(error: &ErrorInfo) {
    if !error.stack.is_empty() {
        debug!("Stack trace:\n{}", error.stack);
    }
}

/// The log file of the running test.
struct TestLogFile {
    path: Utf8PathBuf,
    file: Option<LineWriter<File>>,
}

impl TestLogFile {
    fn create(out_dir: &Utf8Path) -> io::Result<Self> {
        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join(TEST_LOG_FILE_NAME);
        let file = File::create(&path)?;
        Ok(Self {
            path,
            file: Some(LineWriter::new(file)),
        })
    }

    /// Appends a timestamped line. After the first failure, the log is abandoned with a warning.
    fn write_line(&mut self, time: DateTime<FixedOffset>, text: impl fmt::Display) {
        let Some(file) = &mut self.file else {
            return;
        };
        if let Err(error) = writeln!(file, "{} {text}", log_timestamp(time)) {
            warn!(path = %self.path, %error, "failed to write test log, giving up on it");
            self.file = None;
        }
    }
}
