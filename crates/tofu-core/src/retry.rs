// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry policy for failed reconciliations.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;

/// Default base retry interval.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(15);

/// Default cap for exponential backoff.
pub const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How the delay grows with consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetryStrategy {
    /// Always wait the base interval.
    #[default]
    StaticInterval,
    /// Wait `base * 2^failures`, capped.
    ExponentialBackoff,
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "StaticInterval" => Ok(Self::StaticInterval),
            "ExponentialBackoff" => Ok(Self::ExponentialBackoff),
            other => Err(format!("unknown retry strategy '{}'", other)),
        }
    }
}

/// Delay before the next attempt.
///
/// Overflow saturates to `max`. The cap applies to exponential backoff only.
pub fn next_retry_delay(
    strategy: RetryStrategy,
    base: Duration,
    failure_count: u32,
    max: Duration,
) -> Duration {
    match strategy {
        RetryStrategy::StaticInterval => base,
        RetryStrategy::ExponentialBackoff => 1u32
            .checked_shl(failure_count)
            .and_then(|factor| base.checked_mul(factor))
            .map_or(max, |delay| delay.min(max)),
    }
}

/// What the control loop should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try again after the delay.
    Requeue(Duration),
    /// Stop and report to an operator; retrying will not help until state changes.
    Surface,
    /// Stop. Never retried automatically.
    Fatal,
}

/// Retry settings for one managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Growth strategy.
    pub strategy: RetryStrategy,
    /// Base interval.
    pub interval: Duration,
    /// Backoff cap.
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            interval: DEFAULT_RETRY_INTERVAL,
            max_interval: DEFAULT_MAX_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Delay after `failure_count` consecutive failures.
    pub fn delay(&self, failure_count: u32) -> Duration {
        next_retry_delay(self.strategy, self.interval, failure_count, self.max_interval)
    }

    /// Map an error class to the control-loop reaction.
    pub fn disposition(&self, class: ErrorClass, failure_count: u32) -> Disposition {
        match class {
            ErrorClass::Retryable | ErrorClass::Unclassified => {
                Disposition::Requeue(self.delay(failure_count))
            }
            ErrorClass::OperatorActionable => Disposition::Surface,
            ErrorClass::Fatal => Disposition::Fatal,
        }
    }
}
