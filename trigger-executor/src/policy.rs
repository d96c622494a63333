//! Execution policy bound to a unit of work.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where an attempt runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Awaited directly on the caller's task.
    #[default]
    Inline,
    /// Handed to the worker pool so blocking work cannot stall the caller.
    Offloaded,
}

/// Priority, mode, timeout, and retry settings for a unit of work.
///
/// Policies are plain values: build one with the `with_*` methods and attach
/// it at registration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionPolicy {
    priority: u32,
    mode: ExecutionMode,
    timeout: Option<Duration>,
    retry_count: u32,
}

impl ExecutionPolicy {
    /// Creates the default policy: priority 0, inline, unbounded, no retries.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            priority: 0,
            mode: ExecutionMode::Inline,
            timeout: None,
            retry_count: 0,
        }
    }

    /// Sets the observational priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bounds every attempt by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of additional attempts after the first.
    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Returns the observational priority.
    #[must_use]
    pub const fn priority(&self) -> u32 {
        self.priority
    }

    /// Returns the execution mode.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns the per-attempt timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the number of additional attempts after the first.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the total number of attempts permitted.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }
}
