// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use doubao_config::model::VideoConfig;

/// Timing and budget of the retrieval loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    /// Delay before the first attempt of a fresh task.
    pub warmup: Duration,
    /// Delay between unsuccessful attempts.
    pub retry_interval: Duration,
    /// Attempt budget given to newly created tasks.
    pub max_retries: u32,
    /// Budget handed to the oracle itself.
    pub oracle_timeout: Duration,
    /// Hard ceiling on one attempt.
    pub attempt_timeout: Duration,
}

impl RetrySchedule {
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            warmup: config.warmup(),
            retry_interval: config.retry_interval(),
            max_retries: config.max_retries,
            oracle_timeout: config.oracle_timeout(),
            attempt_timeout: config.attempt_timeout(),
        }
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::from_config(&VideoConfig::default())
    }
}
