// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! How long to wait for the next control message.

use std::time::Duration;
use tokio::time::Instant;

/// The default time to wait for a control message, on top of any per-test budget.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Computes, before each read, the longest time to wait for the next control message.
///
/// Runners that never send heartbeats can be silent for as long as a test runs, so while a test is
/// open the remaining budget of that test is added to the base timeout. Once a heartbeat has been
/// seen, the runner is known to report liveness on its own and the base timeout alone applies.
///
/// The heartbeat switch exists for runners predating heartbeats, and can be removed once every
/// supported runner sends them.
#[derive(Clone, Debug)]
pub(crate) struct TimeoutGovernor {
    base: Duration,
    deadline: Option<Instant>,
    heartbeat_seen: bool,
    open_test: Option<OpenTestBudget>,
}

#[derive(Clone, Debug)]
struct OpenTestBudget {
    received_at: Instant,
    budget: Duration,
}

impl TimeoutGovernor {
    pub(crate) fn new(base: Duration, deadline: Option<Instant>) -> Self {
        Self {
            base,
            deadline,
            heartbeat_seen: false,
            open_test: None,
        }
    }

    /// Records that a test started at `received_at` with `budget` (timeout plus additional time).
    pub(crate) fn test_started(&mut self, received_at: Instant, budget: Duration) {
        self.open_test = Some(OpenTestBudget {
            received_at,
            budget,
        });
    }

    pub(crate) fn test_finished(&mut self) {
        self.open_test = None;
    }

    pub(crate) fn heartbeat(&mut self) {
        self.heartbeat_seen = true;
    }

    /// Returns true if the deadline, if any, has passed at `now`.
    pub(crate) fn deadline_passed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// The time to wait for the next message, as of `now`.
    pub(crate) fn next_timeout(&self, now: Instant) -> Duration {
        let mut timeout = self.base;

        if !self.heartbeat_seen {
            if let Some(open) = &self.open_test {
                let elapsed = now.saturating_duration_since(open.received_at);
                if let Some(remaining) = open.budget.checked_sub(elapsed) {
                    timeout = timeout.saturating_add(remaining);
                }
            }
        }

        if let Some(deadline) = self.deadline {
            timeout = timeout.min(deadline.saturating_duration_since(now));
        }

        timeout
    }
}
