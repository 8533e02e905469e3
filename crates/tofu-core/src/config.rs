// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_CHUNK_SIZE;
use crate::retry::{DEFAULT_MAX_RETRY_INTERVAL, DEFAULT_RETRY_INTERVAL, RetryPolicy, RetryStrategy};
use crate::store::MAX_OBJECT_SIZE;

/// Plan store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite object store file
    pub database_path: PathBuf,
    /// Upper bound for a single chunk payload in bytes
    pub max_chunk_size: usize,
    /// Verify chunk hashes when loading plans
    pub verify_chunk_hash: bool,
    /// Retry policy for failed reconciliations
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(".data/plans.db"),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            verify_chunk_hash: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `TOFU_DATABASE_PATH`: SQLite object store file (default: .data/plans.db)
    /// - `TOFU_MAX_CHUNK_SIZE`: chunk size bound in bytes, 1..=1048576 (default: 1048576)
    /// - `TOFU_VERIFY_CHUNK_HASH`: verify chunk hashes on load (default: false)
    /// - `TOFU_RETRY_STRATEGY`: StaticInterval or ExponentialBackoff (default: StaticInterval)
    /// - `TOFU_RETRY_INTERVAL_SECS`: base retry interval (default: 15)
    /// - `TOFU_MAX_RETRY_INTERVAL_SECS`: backoff cap (default: 86400)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = std::env::var("TOFU_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".data/plans.db"));

        let max_chunk_size: usize = std::env::var("TOFU_MAX_CHUNK_SIZE")
            .unwrap_or_else(|_| DEFAULT_MAX_CHUNK_SIZE.to_string())
            .parse()
            .ok()
            .filter(|size| (1..=MAX_OBJECT_SIZE).contains(size))
            .ok_or(ConfigError::Invalid(
                "TOFU_MAX_CHUNK_SIZE",
                "must be an integer between 1 and 1048576",
            ))?;

        let verify_chunk_hash: bool = std::env::var("TOFU_VERIFY_CHUNK_HASH")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("TOFU_VERIFY_CHUNK_HASH", "must be true or false"))?;

        let strategy: RetryStrategy = std::env::var("TOFU_RETRY_STRATEGY")
            .unwrap_or_else(|_| "StaticInterval".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TOFU_RETRY_STRATEGY",
                    "must be StaticInterval or ExponentialBackoff",
                )
            })?;

        let interval = secs_from_env("TOFU_RETRY_INTERVAL_SECS", DEFAULT_RETRY_INTERVAL)?;
        let max_interval =
            secs_from_env("TOFU_MAX_RETRY_INTERVAL_SECS", DEFAULT_MAX_RETRY_INTERVAL)?;

        Ok(Self {
            database_path,
            max_chunk_size,
            verify_chunk_hash,
            retry: RetryPolicy {
                strategy,
                interval,
                max_interval,
            },
        })
    }
}

fn secs_from_env(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    std::env::var(key)
        .unwrap_or_else(|_| default.as_secs().to_string())
        .parse()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::Invalid(key, "must be a non-negative number of seconds"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
