// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock executor for testing.
//!
//! Simulates the CLI in memory: `plan` writes a synthetic plan file, a held
//! state lock makes state-touching operations fail with the CLI's lock
//! output, and failures can be scripted per operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use super::traits::*;

/// Operations that take the state lock.
const LOCKING_OPERATIONS: [&str; 4] = ["init", "plan", "apply", "destroy"];

#[derive(Debug, Default)]
struct MockState {
    plan_file: Option<Vec<u8>>,
    workspace: String,
    held_lock: Option<String>,
    failures: HashMap<&'static str, String>,
    outputs: BTreeMap<String, OutputMeta>,
    calls: Vec<&'static str>,
    plans_run: u32,
}

/// Mock executor for testing.
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
    /// Whether `plan` reports pending changes
    pub drifted: bool,
    /// If true, every operation fails
    pub fail_by_default: bool,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    /// Create a new mock executor.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                workspace: "default".to_string(),
                ..Default::default()
            })),
            drifted: true,
            fail_by_default: false,
        }
    }

    /// Create a mock executor where every operation fails.
    pub fn failing() -> Self {
        Self {
            fail_by_default: true,
            ..Self::new()
        }
    }

    /// Make `operation` fail with `stderr` until cleared.
    pub async fn fail_on(&self, operation: &'static str, stderr: impl Into<String>) {
        self.state
            .lock()
            .await
            .failures
            .insert(operation, stderr.into());
    }

    /// Clear a scripted failure.
    pub async fn clear_failure(&self, operation: &'static str) {
        self.state.lock().await.failures.remove(operation);
    }

    /// Simulate another execution holding the state lock.
    pub async fn hold_lock(&self, lock_id: impl Into<String>) {
        self.state.lock().await.held_lock = Some(lock_id.into());
    }

    /// Set a root module output.
    pub async fn set_output(
        &self,
        name: impl Into<String>,
        value: serde_json::Value,
        sensitive: bool,
    ) {
        self.state.lock().await.outputs.insert(
            name.into(),
            OutputMeta {
                sensitive,
                output_type: json!("string"),
                value,
            },
        );
    }

    /// Operations invoked so far, in order.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.state.lock().await.calls.clone()
    }

    /// Current plan file contents.
    pub async fn plan_file(&self) -> Option<Vec<u8>> {
        self.state.lock().await.plan_file.clone()
    }

    /// Selected workspace.
    pub async fn workspace(&self) -> String {
        self.state.lock().await.workspace.clone()
    }

    /// Currently held lock, if any.
    pub async fn held_lock(&self) -> Option<String> {
        self.state.lock().await.held_lock.clone()
    }

    fn check(&self, state: &mut MockState, operation: &'static str) -> Result<()> {
        state.calls.push(operation);

        if self.fail_by_default {
            return Err(ExecutorError::new(operation, "Mock failure"));
        }
        if let Some(stderr) = state.failures.get(operation) {
            return Err(ExecutorError::new(operation, stderr.clone()));
        }
        if let Some(lock_id) = &state.held_lock
            && LOCKING_OPERATIONS.contains(&operation)
        {
            return Err(ExecutorError::new(operation, lock_output(lock_id)));
        }
        Ok(())
    }
}

/// CLI output for a held state lock.
fn lock_output(lock_id: &str) -> String {
    format!(
        "Error: Error acquiring the state lock\n\n\
         Error message: resource temporarily unavailable\n\
         Lock Info:\n  \
         ID:        {lock_id}\n  \
         Path:      terraform.tfstate\n  \
         Operation: OperationTypePlan\n  \
         Who:       runner@mock\n  \
         Version:   1.6.0\n  \
         Created:   2024-01-01 00:00:00 +0000 UTC\n\n\
         Terraform acquires a state lock to protect the state from being written\n\
         by multiple users at the same time.\n"
    )
}

#[async_trait]
impl Executor for MockExecutor {
    fn executor_type(&self) -> &'static str {
        "mock"
    }

    async fn init(&self, _options: &InitOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "init")
    }

    async fn select_workspace(&self, workspace: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "select_workspace")?;
        state.workspace = workspace.to_string();
        Ok(())
    }

    async fn plan(&self, options: &PlanOptions) -> Result<bool> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "plan")?;
        state.plans_run += 1;
        let plan = format!(
            "mock plan {} workspace={} destroy={} targets={}",
            state.plans_run,
            state.workspace,
            options.destroy,
            options.targets.join(",")
        );
        state.plan_file = Some(plan.into_bytes());
        Ok(self.drifted)
    }

    async fn apply(&self, options: &ApplyOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "apply")?;
        if options.use_plan_file && state.plan_file.is_none() {
            return Err(ExecutorError::new(
                "apply",
                "Error: Failed to load \"tfplan\" as a plan file",
            ));
        }
        Ok(())
    }

    async fn destroy(&self, _targets: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "destroy")
    }

    async fn output(&self) -> Result<BTreeMap<String, OutputMeta>> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "output")?;
        Ok(state.outputs.clone())
    }

    async fn force_unlock(&self, lock_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "force_unlock")?;
        match &state.held_lock {
            Some(held) if held == lock_id => {
                state.held_lock = None;
                Ok(())
            }
            _ => Err(ExecutorError::new(
                "force_unlock",
                format!(
                    "Error: failed to unlock state: lock ID \"{lock_id}\" does not match existing lock"
                ),
            )),
        }
    }

    async fn read_plan_file(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "read_plan_file")?;
        state
            .plan_file
            .clone()
            .ok_or_else(|| {
                ExecutorError::new("read_plan_file", "open tfplan: no such file or directory")
            })
    }

    async fn write_plan_file(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "write_plan_file")?;
        state.plan_file = Some(bytes.to_vec());
        Ok(())
    }

    async fn show_plan_json(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "show_plan_json")?;
        let plan = state
            .plan_file
            .as_ref()
            .ok_or_else(|| ExecutorError::new("show_plan_json", "no plan file"))?;
        let rendered = json!({
            "format_version": "1.2",
            "plan": String::from_utf8_lossy(plan),
        });
        serde_json::to_vec(&rendered)
            .map_err(|e| ExecutorError::new("show_plan_json", e.to_string()))
    }

    async fn show_plan_raw(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.check(&mut state, "show_plan_raw")?;
        let plan = state
            .plan_file
            .as_ref()
            .ok_or_else(|| ExecutorError::new("show_plan_raw", "no plan file"))?;
        Ok(format!(
            "Terraform will perform the following actions:\n\n{}\n",
            String::from_utf8_lossy(plan)
        ))
    }
}
