// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for tofu-runner.
//!
//! [`RunnerRuntime`] wires an executor, a plan store and the session guard
//! together so a controller process can call the handlers directly.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tofu_runner::config::RunnerConfig;
//! use tofu_runner::runtime::RunnerRuntime;
//!
//! let runtime = RunnerRuntime::builder()
//!     .config(RunnerConfig::load()?)
//!     .executor(Arc::new(my_executor))
//!     .build()
//!     .await?;
//!
//! let session = handle_new_session(runtime.state(), Default::default()).await?;
//! ```

use std::sync::Arc;

use tofu_core::{
    Disposition, MemoryObjectStore, ObjectStore, PlanManager, RetryPolicy, SessionGuard,
    SqliteObjectStore,
};
use tracing::info;

use crate::config::{RunnerConfig, StoreBackend};
use crate::error::{Result, RunnerError};
use crate::executor::Executor;
use crate::handlers::RunnerHandlerState;

/// Builder for creating a [`RunnerRuntime`].
#[derive(Default)]
pub struct RunnerRuntimeBuilder {
    config: RunnerConfig,
    store: Option<Arc<dyn ObjectStore>>,
    executor: Option<Arc<dyn Executor>>,
    session: Option<SessionGuard>,
}

impl RunnerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    ///
    /// Default: [`RunnerConfig::default`]
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing object store instead of the one named by the configuration.
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the executor (required).
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set a session guard with a custom identity matcher.
    pub fn session_guard(mut self, session: SessionGuard) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the runtime, opening the object store if none was given.
    pub async fn build(self) -> Result<RunnerRuntime> {
        let executor = self
            .executor
            .ok_or_else(|| RunnerError::InvalidRequest("executor is required".to_string()))?;

        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config).await?,
        };

        let plans = PlanManager::from_config(store, &self.config.core);
        let mut state = RunnerHandlerState::new(executor, plans);
        if let Some(session) = self.session {
            state = state.with_session_guard(session);
        }

        info!(
            executor = state.executor.executor_type(),
            store_backend = ?self.config.store_backend,
            max_chunk_size = self.config.core.max_chunk_size,
            verify_chunk_hash = self.config.core.verify_chunk_hash,
            "Runner runtime ready"
        );

        Ok(RunnerRuntime {
            state: Arc::new(state),
            retry: self.config.core.retry,
        })
    }
}

async fn open_store(config: &RunnerConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(match config.store_backend {
        StoreBackend::Sqlite => {
            info!(path = %config.core.database_path.display(), "Opening SQLite plan store");
            Arc::new(SqliteObjectStore::from_path(&config.core.database_path).await?)
        }
        StoreBackend::Memory => Arc::new(MemoryObjectStore::new()),
    })
}

/// A runner with its handler state and retry policy.
pub struct RunnerRuntime {
    state: Arc<RunnerHandlerState>,
    retry: RetryPolicy,
}

impl RunnerRuntime {
    /// Create a new builder.
    pub fn builder() -> RunnerRuntimeBuilder {
        RunnerRuntimeBuilder::new()
    }

    /// Handler state to pass to the `handle_*` functions.
    pub fn state(&self) -> &RunnerHandlerState {
        &self.state
    }

    /// Shared handle to the handler state.
    pub fn shared_state(&self) -> Arc<RunnerHandlerState> {
        self.state.clone()
    }

    /// Retry policy for failed reconciliations.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// What the control loop should do after `err`, given `failure_count`
    /// consecutive failures including this one.
    pub fn disposition(&self, err: &RunnerError, failure_count: u32) -> Disposition {
        self.retry.disposition(err.class(), failure_count)
    }
}
