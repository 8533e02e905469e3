// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tofu Core - Plan Artifact Lifecycle
//!
//! This crate provides the plan artifact lifecycle and execution-consistency
//! core of a Terraform/OpenTofu controller. The controller drives executions
//! out-of-process through a runner; this crate decides how a plan produced by
//! one execution is stored, found again, and checked before it is applied.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconcile loop / tofu-runner                        │
//! │         (validates session, runs executor, saves & loads plans)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!        │                 │                    │                    │
//!        ▼                 ▼                    ▼                    ▼
//! ┌──────────────┐ ┌───────────────┐ ┌────────────────────┐ ┌────────────────┐
//! │ SessionGuard │ │  PlanManager  │ │ lock::classify     │ │  RetryPolicy   │
//! │ (session)    │ │  (lifecycle)  │ │ (executor output)  │ │  (retry)       │
//! └──────────────┘ └───────────────┘ └────────────────────┘ └────────────────┘
//!                     │        │
//!           ┌─────────┘        └──────────┐
//!           ▼                             ▼
//! ┌───────────────────┐        ┌─────────────────────┐
//! │ codec + plan_id   │        │  artifact ↔ store   │
//! │ (gzip, chunking)  │        │  (labeled objects)  │
//! └───────────────────┘        └─────────────────────┘
//!                                         │
//!                              ┌──────────┴──────────┐
//!                              ▼                     ▼
//!                     ┌────────────────┐   ┌──────────────────┐
//!                     │ MemoryObject-  │   │ SqliteObject-    │
//!                     │ Store          │   │ Store (sqlx)     │
//!                     └────────────────┘   └──────────────────┘
//! ```
//!
//! # Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`] | gzip + split a plan into size-bounded, hashed chunks, and back |
//! | [`plan_id`] | Derive `plan-<branch>-<hash10>` from an upstream revision |
//! | [`store`] | Labeled key/value object store trait and backends |
//! | [`artifact`] | Map plan chunks onto stored objects (names, labels, annotations) |
//! | [`lifecycle`] | Save with eviction-before-write, load with the staleness gate |
//! | [`session`] | Reject requests from a stale execution generation |
//! | [`lock`] | Lift "state lock held" executor output into a typed error |
//! | [`retry`] | Static or exponential retry delay, error class to disposition |
//!
//! # Error Taxonomy
//!
//! | Class | Errors | Disposition |
//! |-------|--------|-------------|
//! | Fatal | `CorruptArtifact`, `SessionMismatch`, `MalformedObject` | Stop |
//! | Operator-actionable | `PlanMismatch`, `NoPlanFound` | Surface |
//! | Retryable | `StateLockError` | Requeue with backoff |
//! | Unclassified | anything else | Requeue with backoff |
//!
//! # Configuration
//!
//! See [`Config::from_env`] for the `TOFU_*` environment variables.

#![deny(missing_docs)]

pub mod artifact;
pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod migrations;
pub mod plan_id;
pub mod retry;
pub mod session;
pub mod store;

pub use artifact::{ArtifactLayout, PlanArtifact};
pub use codec::{Chunk, CodecError, Encoding};
pub use config::{Config, ConfigError};
pub use error::{Error, ErrorClass, Result};
pub use lifecycle::{LoadRequest, PlanManager, ReadableFormat};
pub use lock::{Classified, ForceUnlock, StateLockError, classify, lock_to_release};
pub use plan_id::{approve_message, derive_plan_id, is_replan_request};
pub use retry::{Disposition, RetryPolicy, RetryStrategy, next_retry_delay};
pub use session::{SessionError, SessionGuard, SessionPermit};
pub use store::{
    MemoryObjectStore, ObjectKind, ObjectStore, SqliteObjectStore, StoreError, StoredObject,
};
