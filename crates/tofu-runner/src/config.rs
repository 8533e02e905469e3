// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::str::FromStr;

use tofu_core::{Config, ConfigError};
use tracing::debug;

/// Where plans are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// SQLite file at `TOFU_DATABASE_PATH`.
    #[default]
    Sqlite,
    /// In-process memory; plans are lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Tofu runner configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunnerConfig {
    /// Plan store and retry settings
    pub core: Config,
    /// Plan store backend
    pub store_backend: StoreBackend,
}

impl RunnerConfig {
    /// Load configuration, reading a `.env` file first if one exists.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file loaded: {}", e);
        }
        Self::from_env()
    }

    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `TOFU_STORE_BACKEND`: sqlite or memory (default: sqlite)
    /// - every variable read by [`Config::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let core = Config::from_env()?;

        let store_backend: StoreBackend = std::env::var("TOFU_STORE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("TOFU_STORE_BACKEND", "must be sqlite or memory"))?;

        Ok(Self {
            core,
            store_backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_runner_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.remove("TOFU_STORE_BACKEND");
        guard.remove("TOFU_MAX_CHUNK_SIZE");
        guard.remove("TOFU_RETRY_STRATEGY");

        let config = RunnerConfig::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_runner_config_memory_backend() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("TOFU_STORE_BACKEND", "memory");
        guard.set("TOFU_MAX_CHUNK_SIZE", "2048");

        let config = RunnerConfig::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.core.max_chunk_size, 2048);
    }

    #[test]
    fn test_runner_config_invalid_backend() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("TOFU_STORE_BACKEND", "etcd");

        assert!(matches!(
            RunnerConfig::from_env(),
            Err(ConfigError::Invalid("TOFU_STORE_BACKEND", _))
        ));
    }
}
