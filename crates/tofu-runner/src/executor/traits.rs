// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Executor trait definitions.
//!
//! Defines the boundary to the infrastructure-as-code CLI. Implementations
//! invoke the binary in a working directory; the handlers only see this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A failed executor invocation.
///
/// `stderr` is the free-text output of the CLI, passed unchanged to
/// [`tofu_core::classify`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {stderr}")]
pub struct ExecutorError {
    /// Operation that failed (e.g., "init", "apply").
    pub operation: &'static str,
    /// Error output of the CLI.
    pub stderr: String,
}

impl ExecutorError {
    /// Create an error for `operation`.
    pub fn new(operation: &'static str, stderr: impl Into<String>) -> Self {
        Self {
            operation,
            stderr: stderr.into(),
        }
    }
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Options for `init`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Upgrade modules and providers.
    pub upgrade: bool,
    /// Copy existing state to a new backend without prompting.
    pub force_copy: bool,
    /// Backend configuration `key=value` pairs.
    pub backend_config: BTreeMap<String, String>,
}

/// Options for `plan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Plan a destroy.
    pub destroy: bool,
    /// Refresh state before planning.
    pub refresh: bool,
    /// Limit planning to these resource addresses.
    pub targets: Vec<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            destroy: false,
            refresh: true,
            targets: Vec::new(),
        }
    }
}

/// Options for `apply`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Apply the saved plan file rather than planning inline.
    pub use_plan_file: bool,
    /// Refresh state before applying.
    pub refresh_before_apply: bool,
    /// Limit the apply to these resource addresses.
    pub targets: Vec<String>,
}

/// One root module output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMeta {
    /// Whether the value is marked sensitive.
    pub sensitive: bool,
    /// Type constraint as reported by the CLI.
    #[serde(rename = "type")]
    pub output_type: Value,
    /// Output value.
    pub value: Value,
}

/// Infrastructure-as-code CLI bound to one working directory.
///
/// Executors are PURE execution engines; they do not touch the plan store.
/// Plan persistence is handled by the caller.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executor type identifier (e.g., "tofu", "terraform", "mock").
    fn executor_type(&self) -> &'static str;

    /// Initialize the working directory.
    async fn init(&self, options: &InitOptions) -> Result<()>;

    /// Create (if needed) and select a workspace.
    async fn select_workspace(&self, workspace: &str) -> Result<()>;

    /// Produce a plan file. Returns whether changes are pending.
    async fn plan(&self, options: &PlanOptions) -> Result<bool>;

    /// Apply changes.
    async fn apply(&self, options: &ApplyOptions) -> Result<()>;

    /// Destroy managed resources.
    async fn destroy(&self, targets: &[String]) -> Result<()>;

    /// Root module outputs.
    async fn output(&self) -> Result<BTreeMap<String, OutputMeta>>;

    /// Release a held state lock.
    async fn force_unlock(&self, lock_id: &str) -> Result<()>;

    /// Read the plan file produced by `plan`.
    async fn read_plan_file(&self) -> Result<Vec<u8>>;

    /// Write a plan file for `apply` to consume.
    async fn write_plan_file(&self, bytes: &[u8]) -> Result<()>;

    /// JSON rendering of the plan file.
    async fn show_plan_json(&self) -> Result<Vec<u8>>;

    /// Human-readable rendering of the plan file.
    async fn show_plan_raw(&self) -> Result<String>;
}
