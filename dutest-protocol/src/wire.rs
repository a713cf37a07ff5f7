// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Framing and version-skew handling for control messages.

use crate::{
    ControlMessage, Heartbeat, RunEnd, RunError, RunLog, RunStart, TestEnd, TestError, TestLog,
    TestMetadata, TestStart, UpgradeError,
};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::{
    io::{self, Write},
    time::Duration,
};

impl ControlMessage {
    /// Decodes a single framed message.
    ///
    /// Leading and trailing whitespace is ignored.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    /// Encodes this message as a single line of JSON, without the trailing newline.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).expect("control messages are always serializable")
    }
}

/// Writes framed control messages to an underlying writer.
///
/// Each message is flushed as soon as it is written, so that a reader on the other side of a pipe
/// observes it immediately.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: Write> MessageWriter<W> {
    /// Creates a new writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single message followed by a newline.
    pub fn write(&mut self, message: &ControlMessage) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// The shapes accepted on the wire, including the ones emitted by older runners.
///
/// Only [`ControlMessage`] is public: conversion happens once, at decode time.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum WireMessage {
    RunStart(WireRunStart),
    RunLog(RunLog),
    RunError(RunError),
    RunEnd(RunEnd),
    TestStart(WireTestStart),
    TestLog(TestLog),
    TestError(TestError),
    TestEnd(TestEnd),
    Heartbeat(Heartbeat),
}

/// Older runners only sent the list of names, without a count.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct WireRunStart {
    time: DateTime<FixedOffset>,
    #[serde(default)]
    num_tests: Option<usize>,
    #[serde(default)]
    test_names: Vec<String>,
}

/// Older runners sent a flat `name` and `timeout` instead of nested metadata.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct WireTestStart {
    time: DateTime<FixedOffset>,
    #[serde(default)]
    test: Option<TestMetadata>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

impl TryFrom<WireMessage> for ControlMessage {
    type Error = UpgradeError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let message = match wire {
            WireMessage::RunStart(WireRunStart {
                time,
                num_tests,
                test_names,
            }) => {
                let num_tests = num_tests.unwrap_or(test_names.len());
                ControlMessage::RunStart(RunStart {
                    time,
                    num_tests,
                    test_names,
                })
            }
            WireMessage::TestStart(WireTestStart {
                time,
                test,
                name,
                timeout,
            }) => {
                let test = match (test, name) {
                    (Some(test), _) => test,
                    (None, Some(name)) => TestMetadata {
                        timeout: timeout.unwrap_or_default(),
                        ..TestMetadata::new(name)
                    },
                    (None, None) => return Err(UpgradeError::TestStartWithoutName),
                };
                if test.name.is_empty() {
                    return Err(UpgradeError::TestStartWithoutName);
                }
                ControlMessage::TestStart(TestStart { time, test })
            }
            WireMessage::RunLog(msg) => ControlMessage::RunLog(msg),
            WireMessage::RunError(msg) => ControlMessage::RunError(msg),
            WireMessage::RunEnd(msg) => ControlMessage::RunEnd(msg),
            WireMessage::TestLog(msg) => ControlMessage::TestLog(msg),
            WireMessage::TestError(msg) => ControlMessage::TestError(msg),
            WireMessage::TestEnd(msg) => ControlMessage::TestEnd(msg),
            WireMessage::Heartbeat(msg) => ControlMessage::Heartbeat(msg),
        };
        Ok(message)
    }
}
