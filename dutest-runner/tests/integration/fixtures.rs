// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use chrono::{DateTime, FixedOffset};
use dutest_protocol::{
    ControlMessage, ErrorInfo, Heartbeat, MessageWriter, RunEnd, RunError, RunLog, RunStart,
    TestEnd, TestError, TestLog, TestMetadata, TestStart,
};
use dutest_runner::{
    record::{STREAMED_RESULTS_FILE_NAME, StreamedResultsWriter},
    runner::{Diagnose, StreamConfig, StreamContext, StreamOutcome, process_stream},
    target::LocalTarget,
    timing::TimingLog,
};
use std::{future::Future, sync::Once, time::Duration};
use tokio::io::AsyncRead;

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// A fixed point in time, `secs` seconds after the start of a fixture run.
pub(crate) fn ts(secs: i64) -> DateTime<FixedOffset> {
    DateTime::from_timestamp(1_790_000_000 + secs, 0)
        .expect("timestamp in range")
        .fixed_offset()
}

pub(crate) fn run_start(num_tests: usize) -> ControlMessage {
    ControlMessage::RunStart(RunStart {
        time: ts(0),
        num_tests,
        test_names: Vec::new(),
    })
}

pub(crate) fn run_log(text: &str) -> ControlMessage {
    ControlMessage::RunLog(RunLog {
        time: ts(0),
        text: text.to_owned(),
    })
}

pub(crate) fn run_error(reason: &str) -> ControlMessage {
    ControlMessage::RunError(RunError {
        time: ts(0),
        error: ErrorInfo::new(reason),
    })
}

pub(crate) fn run_end(out_dir: Option<&Utf8Path>) -> ControlMessage {
    ControlMessage::RunEnd(RunEnd {
        time: ts(100),
        out_dir: out_dir.map(ToOwned::to_owned),
    })
}

pub(crate) fn test_start(name: &str, at: i64) -> ControlMessage {
    test_start_with(TestMetadata::new(name), at)
}

pub(crate) fn test_start_with(test: TestMetadata, at: i64) -> ControlMessage {
    ControlMessage::TestStart(TestStart { time: ts(at), test })
}

pub(crate) fn test_log(text: &str, at: i64) -> ControlMessage {
    ControlMessage::TestLog(TestLog {
        time: ts(at),
        text: text.to_owned(),
    })
}

pub(crate) fn test_error(reason: &str, at: i64) -> ControlMessage {
    ControlMessage::TestError(TestError {
        time: ts(at),
        error: ErrorInfo {
            reason: reason.to_owned(),
            file: "example.go".to_owned(),
            line: 42,
            stack: "goroutine 1 [running]:\nexample.Fail()".to_owned(),
        },
    })
}

pub(crate) fn test_end(name: &str, at: i64) -> ControlMessage {
    ControlMessage::TestEnd(TestEnd {
        time: ts(at),
        name: name.to_owned(),
        missing_dependencies: Vec::new(),
        timing: None,
    })
}

pub(crate) fn heartbeat() -> ControlMessage {
    ControlMessage::Heartbeat(Heartbeat { time: ts(0) })
}

/// Encodes messages the way a runner writes them.
pub(crate) fn encode(messages: &[ControlMessage]) -> Vec<u8> {
    let mut writer = MessageWriter::new(Vec::new());
    for message in messages {
        writer.write(message).expect("writing to a Vec succeeds");
    }
    writer.into_inner()
}

/// A results directory plus the state [`process_stream`] writes into.
pub(crate) struct StreamHarness {
    // Held for its destructor.
    pub(crate) dir: Utf8TempDir,
    pub(crate) results_dir: Utf8PathBuf,
    pub(crate) writer: StreamedResultsWriter,
    pub(crate) timing: TimingLog,
    pub(crate) copier: LocalTarget,
    pub(crate) config: StreamConfig,
}

impl StreamHarness {
    pub(crate) fn new() -> Self {
        test_init();

        let dir = Utf8TempDir::new().expect("created temp dir");
        let results_dir = dir.path().join("results");
        std::fs::create_dir_all(&results_dir).expect("created results dir");
        let writer = StreamedResultsWriter::create(results_dir.join(STREAMED_RESULTS_FILE_NAME))
            .expect("opened streamed results");
        let copier = LocalTarget::new("runner", Vec::<String>::new(), dir.path().join("runner-out"));

        Self {
            dir,
            results_dir,
            writer,
            timing: TimingLog::new(),
            copier,
            config: StreamConfig {
                message_timeout: Duration::from_secs(10),
                deadline: None,
            },
        }
    }

    pub(crate) fn streamed_results_path(&self) -> Utf8PathBuf {
        self.results_dir.join(STREAMED_RESULTS_FILE_NAME)
    }

    pub(crate) async fn process(&mut self, messages: &[ControlMessage]) -> StreamOutcome {
        self.process_stream(
            std::io::Cursor::new(encode(messages)),
            None,
            std::future::pending(),
        )
        .await
    }

    pub(crate) async fn process_stream<R, F>(
        &mut self,
        stream: R,
        diagnose: Option<&dyn Diagnose>,
        cancel: F,
    ) -> StreamOutcome
    where
        R: AsyncRead + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        process_stream(
            StreamContext::new(&self.results_dir, &mut self.writer, &mut self.timing),
            &self.config,
            stream,
            &self.copier,
            diagnose,
            cancel,
        )
        .await
    }
}
