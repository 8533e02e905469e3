// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tofu-runner integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tofu_core::{MemoryObjectStore, PlanManager};
use tofu_runner::MockExecutor;
use tofu_runner::handlers::{
    NewSessionRequest, RunnerHandlerState, SavePlanRequest, handle_new_session,
};

pub const NAME: &str = "web";
pub const NAMESPACE: &str = "flux-system";
pub const OWNER_UID: &str = "0b1c7c3a-6f0e-4d8e-9a51-2a2f1e3d4c5b";
pub const REVISION: &str = "main@sha1:b8e362c206e3d0cbb7ed22ced771a0056455a2fb";

/// Install a test subscriber once; honours RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Handler state over a mock executor and an in-memory store.
pub fn runner() -> (RunnerHandlerState, Arc<MockExecutor>, Arc<MemoryObjectStore>) {
    init_tracing();
    let executor = Arc::new(MockExecutor::new());
    let store = Arc::new(MemoryObjectStore::new());
    let state = RunnerHandlerState::new(executor.clone(), PlanManager::new(store.clone()));
    (state, executor, store)
}

/// Bind a new session and return its instance ID.
pub async fn new_session(state: &RunnerHandlerState, instance_id: &str) -> String {
    handle_new_session(
        state,
        NewSessionRequest {
            instance_id: Some(instance_id.to_string()),
        },
    )
    .await
    .expect("Failed to bind session")
    .instance_id
}

/// Save request for the default workspace.
pub fn save_request(instance_id: &str) -> SavePlanRequest {
    SavePlanRequest {
        instance_id: instance_id.to_string(),
        name: NAME.to_string(),
        namespace: NAMESPACE.to_string(),
        workspace: "default".to_string(),
        owner_uid: OWNER_UID.to_string(),
        revision: REVISION.to_string(),
        backend_completely_disable: false,
        readable: None,
    }
}
