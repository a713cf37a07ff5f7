// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical timing information for a run.

use chrono::{DateTime, FixedOffset};
use dutest_protocol::TimingStage;
use serde::{Deserialize, Serialize};

/// A log of top-level timing stages, each possibly containing nested stages.
///
/// The orchestrator records its own stages here and grafts in the stages runners report for each
/// test.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimingLog {
    /// Top-level stages, in start order.
    pub stages: Vec<TimingStage>,
}

impl TimingLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a closed top-level stage named `name`, with `imported` (if any) as its child.
    pub fn import_test(
        &mut self,
        name: &str,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        imported: Option<TimingStage>,
    ) {
        let mut stage = TimingStage::new(name, start);
        stage.end = Some(end);
        stage.children.extend(imported);
        self.stages.push(stage);
    }

    /// Appends a top-level stage.
    pub fn push(&mut self, stage: TimingStage) {
        self.stages.push(stage);
    }

    /// Looks up a top-level stage by name.
    pub fn stage(&self, name: &str) -> Option<&TimingStage> {
        self.stages.iter().find(|stage| stage.name == name)
    }
}
