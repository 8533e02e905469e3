// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner request handlers.
//!
//! Every handler except [`handle_new_session`] first validates the request's
//! instance ID against the [`SessionGuard`] and holds the resulting permit
//! until it returns. A request from a stale execution generation is rejected
//! before the executor or the plan store is touched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use tofu_core::{
    ForceUnlock, LoadRequest, PlanArtifact, PlanManager, ReadableFormat, SessionGuard,
    approve_message, derive_plan_id, lock_to_release,
};

use crate::error::{Result, RunnerError};
use crate::executor::{ApplyOptions, Executor, InitOptions, OutputMeta, PlanOptions};

/// Plan bytes stored when the backend is completely disabled.
pub const DUMMY_PLAN: &[u8] = b"dummy plan";

/// Workspace that needs no explicit selection.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Shared state for runner handlers.
pub struct RunnerHandlerState {
    /// Guard over the active execution generation.
    pub session: SessionGuard,
    /// CLI bound to the working directory.
    pub executor: Arc<dyn Executor>,
    /// Plan store.
    pub plans: PlanManager,
}

impl RunnerHandlerState {
    /// Create a new runner handler state with no bound session.
    pub fn new(executor: Arc<dyn Executor>, plans: PlanManager) -> Self {
        Self {
            session: SessionGuard::new(),
            executor,
            plans,
        }
    }

    /// Replace the session guard (e.g., to install a custom identity matcher).
    pub fn with_session_guard(mut self, session: SessionGuard) -> Self {
        self.session = session;
        self
    }
}

/// Generic acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    /// Always "ok" on success.
    pub message: String,
}

impl OperationResponse {
    fn ok() -> Self {
        Self {
            message: "ok".to_string(),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Request to start a new execution generation.
#[derive(Debug, Clone, Default)]
pub struct NewSessionRequest {
    /// Instance ID to bind. A random one is generated when absent.
    pub instance_id: Option<String>,
}

/// Response from starting a new execution generation.
#[derive(Debug, Clone)]
pub struct NewSessionResponse {
    /// The bound instance ID; later requests must carry it.
    pub instance_id: String,
    /// Instance ID of the replaced generation, if any.
    pub previous_instance_id: Option<String>,
    /// When the session was bound.
    pub bound_at: DateTime<Utc>,
}

/// Handle a new session request.
pub async fn handle_new_session(
    state: &RunnerHandlerState,
    request: NewSessionRequest,
) -> Result<NewSessionResponse> {
    let instance_id = request
        .instance_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if instance_id.is_empty() {
        return Err(RunnerError::InvalidRequest(
            "instance_id must not be empty".to_string(),
        ));
    }

    let previous_instance_id = state.session.bind_new(instance_id.clone()).await;

    info!(
        instance_id = %instance_id,
        previous = ?previous_instance_id,
        executor = state.executor.executor_type(),
        "New runner session"
    );

    Ok(NewSessionResponse {
        instance_id,
        previous_instance_id,
        bound_at: Utc::now(),
    })
}

// ============================================================================
// Init / Workspace
// ============================================================================

/// Request to initialize the working directory.
#[derive(Debug, Clone, Default)]
pub struct InitRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Upgrade modules and providers.
    pub upgrade: bool,
    /// Copy state to a new backend without prompting.
    pub force_copy: bool,
    /// Backend configuration `key=value` pairs.
    pub backend_config: BTreeMap<String, String>,
}

/// Handle init request.
pub async fn handle_init(
    state: &RunnerHandlerState,
    request: InitRequest,
) -> Result<OperationResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;
    info!(instance_id = %request.instance_id, "Initializing");

    let options = InitOptions {
        upgrade: request.upgrade,
        force_copy: request.force_copy,
        backend_config: request.backend_config,
    };
    state
        .executor
        .init(&options)
        .await
        .map_err(|e| executor_failure(&request.instance_id, e))?;

    Ok(OperationResponse::ok())
}

/// Request to select a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Workspace name.
    pub workspace: String,
}

/// Handle workspace selection. The default workspace needs no selection.
pub async fn handle_select_workspace(
    state: &RunnerHandlerState,
    request: WorkspaceRequest,
) -> Result<OperationResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;

    if request.workspace != DEFAULT_WORKSPACE {
        info!(
            instance_id = %request.instance_id,
            workspace = %request.workspace,
            "Selecting workspace"
        );
        state
            .executor
            .select_workspace(&request.workspace)
            .await
            .map_err(|e| executor_failure(&request.instance_id, e))?;
    }

    Ok(OperationResponse::ok())
}

// ============================================================================
// Plan
// ============================================================================

/// Request to produce a plan.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Plan a destroy.
    pub destroy: bool,
    /// Refresh state before planning.
    pub refresh: bool,
    /// Limit planning to these resource addresses.
    pub targets: Vec<String>,
}

/// Response from planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanResponse {
    /// Whether changes are pending.
    pub drifted: bool,
}

/// Handle plan request.
pub async fn handle_plan(state: &RunnerHandlerState, request: PlanRequest) -> Result<PlanResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;
    info!(instance_id = %request.instance_id, destroy = request.destroy, "Creating a plan");

    let options = PlanOptions {
        destroy: request.destroy,
        refresh: request.refresh,
        targets: request.targets,
    };
    let drifted = state
        .executor
        .plan(&options)
        .await
        .map_err(|e| executor_failure(&request.instance_id, e))?;

    Ok(PlanResponse { drifted })
}

/// Request to persist the plan file produced by the last plan.
#[derive(Debug, Clone)]
pub struct SavePlanRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Name of the owning object.
    pub name: String,
    /// Namespace of the owning object.
    pub namespace: String,
    /// Workspace the plan was produced in.
    pub workspace: String,
    /// Unique ID of the owning object.
    pub owner_uid: String,
    /// Upstream revision the plan was produced from.
    pub revision: String,
    /// The backend is disabled; store a placeholder instead of the plan file.
    pub backend_completely_disable: bool,
    /// Also store a readable rendering.
    pub readable: Option<ReadableFormat>,
}

/// Response from saving a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePlanResponse {
    /// Plan ID to record as pending.
    pub plan_id: String,
    /// Operator hint for approving the plan.
    pub approve_message: String,
    /// Number of objects written for the binary plan.
    pub objects: usize,
}

/// Handle save plan request.
pub async fn handle_save_plan(
    state: &RunnerHandlerState,
    request: SavePlanRequest,
) -> Result<SavePlanResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;

    let plan_id = derive_plan_id(&request.revision);
    info!(
        instance_id = %request.instance_id,
        name = %request.name,
        revision = %request.revision,
        plan_id = %plan_id,
        "Saving the plan"
    );

    let bytes = if request.backend_completely_disable {
        DUMMY_PLAN.to_vec()
    } else {
        state
            .executor
            .read_plan_file()
            .await
            .map_err(|e| executor_failure(&request.instance_id, e))?
    };

    let mut plan = PlanArtifact {
        name: request.name,
        namespace: request.namespace,
        workspace: request.workspace,
        owner_uid: request.owner_uid,
        plan_id: plan_id.clone(),
        bytes,
    };
    let objects = state.plans.save(&plan).await?;

    if let Some(format) = request.readable {
        plan.bytes = render_plan(state, format)
            .await
            .map_err(|e| executor_failure(&request.instance_id, e))?;
        state.plans.save_readable(&plan, format).await?;
    }

    Ok(SavePlanResponse {
        approve_message: approve_message(&plan_id, "Plan generated"),
        plan_id,
        objects,
    })
}

/// Request to load a stored plan into the working directory.
#[derive(Debug, Clone)]
pub struct LoadPlanRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Name of the owning object.
    pub name: String,
    /// Namespace of the owning object.
    pub namespace: String,
    /// Workspace the plan was saved for.
    pub workspace: String,
    /// Plan ID recorded as pending.
    pub pending_plan_id: String,
    /// Skip the staleness check.
    pub force: bool,
    /// The backend is disabled; nothing is written to the working directory.
    pub backend_completely_disable: bool,
}

/// Response from loading a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlanResponse {
    /// Plan ID recorded on the stored plan.
    pub plan_id: String,
}

/// Handle load plan request.
pub async fn handle_load_plan(
    state: &RunnerHandlerState,
    request: LoadPlanRequest,
) -> Result<LoadPlanResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;
    info!(
        instance_id = %request.instance_id,
        name = %request.name,
        pending_plan_id = %request.pending_plan_id,
        "Loading the plan"
    );

    let plan = state
        .plans
        .load(&LoadRequest {
            name: request.name,
            namespace: request.namespace,
            workspace: request.workspace,
            pending_plan_id: request.pending_plan_id,
            force: request.force,
        })
        .await
        .inspect_err(|e| {
            error!(
                instance_id = %request.instance_id,
                error = %e,
                "Unable to load the plan"
            )
        })?;

    if !request.backend_completely_disable {
        state
            .executor
            .write_plan_file(&plan.bytes)
            .await
            .map_err(|e| executor_failure(&request.instance_id, e))?;
    }

    Ok(LoadPlanResponse {
        plan_id: plan.plan_id,
    })
}

/// Request to discard a stored plan.
#[derive(Debug, Clone)]
pub struct DeletePlanRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Name of the owning object.
    pub name: String,
    /// Namespace of the owning object.
    pub namespace: String,
    /// Workspace the plan was saved for.
    pub workspace: String,
}

/// Handle delete plan request. Returns the number of objects removed.
pub async fn handle_delete_plan(
    state: &RunnerHandlerState,
    request: DeletePlanRequest,
) -> Result<usize> {
    let _permit = state.session.validate(&request.instance_id).await?;
    Ok(state
        .plans
        .delete(&request.name, &request.namespace, &request.workspace)
        .await?)
}

/// Request to render the current plan file.
#[derive(Debug, Clone)]
pub struct ShowPlanRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Rendering to produce.
    pub format: ReadableFormat,
}

/// Handle show plan request.
pub async fn handle_show_plan(
    state: &RunnerHandlerState,
    request: ShowPlanRequest,
) -> Result<Vec<u8>> {
    let _permit = state.session.validate(&request.instance_id).await?;
    render_plan(state, request.format)
        .await
        .map_err(|e| executor_failure(&request.instance_id, e))
}

async fn render_plan(
    state: &RunnerHandlerState,
    format: ReadableFormat,
) -> crate::executor::Result<Vec<u8>> {
    match format {
        ReadableFormat::Json => state.executor.show_plan_json().await,
        ReadableFormat::Human => state.executor.show_plan_raw().await.map(String::into_bytes),
    }
}

// ============================================================================
// Apply / Destroy / Output
// ============================================================================

/// Request to apply changes.
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Apply the loaded plan file.
    pub use_plan_file: bool,
    /// Refresh state before applying.
    pub refresh_before_apply: bool,
    /// Limit the apply to these resource addresses.
    pub targets: Vec<String>,
}

/// Handle apply request.
pub async fn handle_apply(
    state: &RunnerHandlerState,
    request: ApplyRequest,
) -> Result<OperationResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;
    info!(instance_id = %request.instance_id, "Running apply");

    let options = ApplyOptions {
        use_plan_file: request.use_plan_file,
        refresh_before_apply: request.refresh_before_apply,
        targets: request.targets,
    };
    state
        .executor
        .apply(&options)
        .await
        .map_err(|e| executor_failure(&request.instance_id, e))?;

    Ok(OperationResponse::ok())
}

/// Request to destroy managed resources.
#[derive(Debug, Clone, Default)]
pub struct DestroyRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Limit the destroy to these resource addresses.
    pub targets: Vec<String>,
}

/// Handle destroy request.
pub async fn handle_destroy(
    state: &RunnerHandlerState,
    request: DestroyRequest,
) -> Result<OperationResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;
    info!(instance_id = %request.instance_id, "Running destroy");

    state
        .executor
        .destroy(&request.targets)
        .await
        .map_err(|e| executor_failure(&request.instance_id, e))?;

    Ok(OperationResponse::ok())
}

/// Handle output request.
pub async fn handle_output(
    state: &RunnerHandlerState,
    instance_id: &str,
) -> Result<BTreeMap<String, OutputMeta>> {
    let _permit = state.session.validate(instance_id).await?;
    state
        .executor
        .output()
        .await
        .map_err(|e| executor_failure(instance_id, e))
}

// ============================================================================
// Force Unlock
// ============================================================================

/// Request to release a held state lock.
#[derive(Debug, Clone)]
pub struct ForceUnlockRequest {
    /// Session the request belongs to.
    pub instance_id: String,
    /// Operator policy.
    pub policy: ForceUnlock,
    /// Lock identifier supplied by the operator.
    pub requested_lock_id: String,
    /// Lock identifier recorded from the last state lock error.
    pub pending_lock_id: String,
}

/// Response from a force unlock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceUnlockResponse {
    /// Lock that was released, if the policy allowed one.
    pub released: Option<String>,
    /// Status message.
    pub message: String,
}

/// Handle force unlock request.
pub async fn handle_force_unlock(
    state: &RunnerHandlerState,
    request: ForceUnlockRequest,
) -> Result<ForceUnlockResponse> {
    let _permit = state.session.validate(&request.instance_id).await?;

    let Some(lock_id) = lock_to_release(
        request.policy,
        &request.requested_lock_id,
        &request.pending_lock_id,
    ) else {
        return Ok(ForceUnlockResponse {
            released: None,
            message: "No lock released".to_string(),
        });
    };

    warn!(instance_id = %request.instance_id, lock_id = %lock_id, "Force unlocking state");
    state
        .executor
        .force_unlock(&lock_id)
        .await
        .map_err(|e| executor_failure(&request.instance_id, e))?;

    Ok(ForceUnlockResponse {
        message: format!("Successfully unlocked state with lock identifier: {lock_id}"),
        released: Some(lock_id),
    })
}

/// Log an executor failure and lift it into a runner error.
fn executor_failure(instance_id: &str, err: crate::executor::ExecutorError) -> RunnerError {
    let operation = err.operation;
    let err = RunnerError::from(err);
    match err.state_lock_identifier() {
        Some(lock_id) => warn!(
            instance_id = %instance_id,
            operation = operation,
            lock_id = %lock_id,
            "State is locked"
        ),
        None => error!(
            instance_id = %instance_id,
            operation = operation,
            error = %err,
            "Executor failed"
        ),
    }
    err
}
