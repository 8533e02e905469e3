// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tofu Runner - Session-Guarded Plan Execution
//!
//! The runner owns a working directory and the infrastructure-as-code CLI
//! bound to it. A controller drives it through the `handle_*` functions: each
//! request carries the instance ID of the execution generation it belongs to,
//! and requests from any other generation are rejected before the CLI or the
//! plan store is touched.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Controller                              │
//! │  new_session → init → workspace → plan → save_plan               │
//! │                         ... approval ...                         │
//! │  new_session → init → load_plan → apply                          │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    handlers (RunnerHandlerState)                 │
//! │          SessionGuard::validate → permit held per request        │
//! └──────────────────────────────────────────────────────────────────┘
//!            │                                       │
//!            ▼                                       ▼
//! ┌─────────────────────┐                 ┌──────────────────────┐
//! │  Executor (trait)   │                 │  PlanManager         │
//! │  CLI in workdir     │                 │  (tofu-core)         │
//! └─────────────────────┘                 └──────────────────────┘
//!            │
//!            ▼ stderr
//! ┌─────────────────────┐
//! │  classify → Runner- │
//! │  Error::StateLocked │
//! └─────────────────────┘
//! ```
//!
//! # Handlers
//!
//! | Handler | Executor call | Plan store |
//! |---------|---------------|------------|
//! | [`handlers::handle_new_session`] | none | none |
//! | [`handlers::handle_init`] | `init` | none |
//! | [`handlers::handle_select_workspace`] | `select_workspace` unless "default" | none |
//! | [`handlers::handle_plan`] | `plan` | none |
//! | [`handlers::handle_save_plan`] | `read_plan_file`, `show_plan_*` | save |
//! | [`handlers::handle_load_plan`] | `write_plan_file` | load |
//! | [`handlers::handle_delete_plan`] | none | delete |
//! | [`handlers::handle_show_plan`] | `show_plan_*` | none |
//! | [`handlers::handle_apply`] | `apply` | none |
//! | [`handlers::handle_destroy`] | `destroy` | none |
//! | [`handlers::handle_output`] | `output` | none |
//! | [`handlers::handle_force_unlock`] | `force_unlock` | none |
//!
//! # Configuration
//!
//! See [`config::RunnerConfig::from_env`].

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod runtime;

pub use config::{RunnerConfig, StoreBackend};
pub use error::{Result, RunnerError};
pub use executor::{Executor, ExecutorError, MockExecutor};
pub use handlers::RunnerHandlerState;
pub use runtime::{RunnerRuntime, RunnerRuntimeBuilder};
