// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for tofu-core.
//!
//! Embeds the schema of the SQLite object store. Products embedding tofu-core
//! with their own pool call [`run_sqlite`] before constructing a
//! [`SqliteObjectStore`](crate::store::SqliteObjectStore).
//!
//! # Example
//!
//! ```ignore
//! use sqlx::SqlitePool;
//! use tofu_core::migrations;
//!
//! let pool = SqlitePool::connect("sqlite:plans.db?mode=rwc").await?;
//! migrations::run_sqlite(&pool).await?;
//! ```

use sqlx::migrate::MigrateError;

/// SQLite migrator with all object store migrations embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Run SQLite migrations.
///
/// Applies all pending migrations to the database. Safe to call multiple times;
/// already-applied migrations are skipped.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
