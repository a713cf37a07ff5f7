// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while upgrading a message from an older wire shape to the canonical
/// [`ControlMessage`](crate::ControlMessage).
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpgradeError {
    /// A `test-start` message carried neither test metadata nor a legacy test name.
    TestStartWithoutName,
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TestStartWithoutName => {
                write!(f, "test-start message does not name a test")
            }
        }
    }
}

impl error::Error for UpgradeError {}
