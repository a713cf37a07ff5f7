// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding the control-message stream on a background task.

use crate::errors::StreamReadError;
use dutest_protocol::ControlMessage;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};
use tracing::debug;

/// An item produced by the reader task: a decoded message, or the single terminal error.
pub(crate) type ReadItem = Result<ControlMessage, StreamReadError>;

/// Spawns a task that decodes `stream` into control messages.
///
/// Messages are delivered in stream order. On a read or decode error, exactly one error is
/// delivered and the channel then closes. On a clean end of stream, the channel closes without an
/// error. Decoding happens off the consumer's timing path, so a slow or stuck stream never blocks
/// the consumer's own timeout logic.
pub(crate) fn spawn_reader<R>(stream: R) -> (UnboundedReceiver<ReadItem>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = unbounded_channel();
    let handle = tokio::spawn(read_messages(stream, tx));
    (rx, handle)
}

async fn read_messages<R>(stream: R, tx: UnboundedSender<ReadItem>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut line_number = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(line_number, "control stream closed");
                return;
            }
            Err(error) => {
                _ = tx.send(Err(StreamReadError::Io(error)));
                return;
            }
        };
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        let item = ControlMessage::from_json_line(&line)
            .map_err(|error| StreamReadError::Decode { line_number, error });
        let is_err = item.is_err();
        if tx.send(item).is_err() {
            // The consumer has gone away.
            return;
        }
        if is_err {
            return;
        }
    }
}
