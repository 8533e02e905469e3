// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tofu-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tofu_core::{ObjectStore, PlanArtifact, SqliteObjectStore, migrations};
use uuid::Uuid;

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

/// SQLite store on a fresh in-memory database.
pub async fn sqlite_store() -> Arc<dyn ObjectStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    migrations::run_sqlite(&pool)
        .await
        .expect("Failed to run migrations");

    Arc::new(SqliteObjectStore::new(pool))
}

/// Plan artifact for `name` with a random owner UID.
pub fn artifact(name: &str, plan_id: &str, bytes: Vec<u8>) -> PlanArtifact {
    PlanArtifact {
        name: name.to_string(),
        namespace: "flux-system".to_string(),
        workspace: "default".to_string(),
        owner_uid: Uuid::new_v4().to_string(),
        plan_id: plan_id.to_string(),
        bytes,
    }
}

/// Incompressible bytes (xorshift).
pub fn pseudo_random(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_F491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}
