// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plan lifecycle manager.
//!
//! Persists plan artifacts through an [`ObjectStore`] and gates their reuse.
//!
//! ## Save
//!
//! 1. Find the objects of the previous artifact (label query, falling back to
//!    the legacy single-object name).
//! 2. Delete them all.
//! 3. Encode the new plan and create one object per chunk.
//!
//! Superseded objects are deleted before new ones are written. A reader in
//! that window sees no plan at all rather than a mix of old and new chunks.
//!
//! ## Load
//!
//! 1. Find the artifact's objects (same lookup as save).
//! 2. Unless forced, reject the artifact if any object's saved plan ID differs
//!    from the pending one.
//! 3. Reassemble through the codec.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::artifact::{
    self, ArtifactLayout, PlanArtifact, artifact_labels, object_base_name, saved_plan_id,
};
use crate::codec::{self, Chunk, DEFAULT_MAX_CHUNK_SIZE};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{ObjectStore, StoredObject};

/// Rendering of a plan kept next to the binary plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadableFormat {
    /// Machine-readable JSON, compressed, stored under the `.json` suffix.
    Json,
    /// Human-readable text, stored uncompressed.
    Human,
}

impl ReadableFormat {
    /// Storage layout for this rendering.
    pub fn layout(self) -> ArtifactLayout {
        match self {
            Self::Json => ArtifactLayout::JSON,
            Self::Human => ArtifactLayout::HUMAN,
        }
    }
}

/// Parameters for [`PlanManager::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Name of the owning object.
    pub name: String,
    /// Namespace of the owning object.
    pub namespace: String,
    /// Workspace the plan was saved for.
    pub workspace: String,
    /// Plan ID the caller expects to apply.
    pub pending_plan_id: String,
    /// Skip the staleness check.
    pub force: bool,
}

/// Saves, loads and deletes plan artifacts.
#[derive(Clone)]
pub struct PlanManager {
    store: Arc<dyn ObjectStore>,
    max_chunk_size: usize,
    verify_hashes: bool,
}

impl PlanManager {
    /// Create a manager with the default chunk size and no hash verification.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            verify_hashes: false,
        }
    }

    /// Create a manager using the chunking settings from `config`.
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self::new(store)
            .with_max_chunk_size(config.max_chunk_size)
            .with_hash_verification(config.verify_chunk_hash)
    }

    /// Set the chunk size bound.
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    /// Check every chunk against its recorded hash on load.
    pub fn with_hash_verification(mut self, verify: bool) -> Self {
        self.verify_hashes = verify;
        self
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Persist the binary plan, replacing any previous one.
    ///
    /// Returns the number of objects written.
    pub async fn save(&self, plan: &PlanArtifact) -> Result<usize> {
        self.save_with_layout(plan, ArtifactLayout::PLAN).await
    }

    /// Persist a readable rendering of the plan, replacing any previous one.
    pub async fn save_readable(
        &self,
        plan: &PlanArtifact,
        format: ReadableFormat,
    ) -> Result<usize> {
        self.save_with_layout(plan, format.layout()).await
    }

    /// Load the binary plan, checking it against the pending plan ID.
    pub async fn load(&self, request: &LoadRequest) -> Result<PlanArtifact> {
        self.load_with_layout(request, ArtifactLayout::PLAN).await
    }

    /// Load a readable rendering of the plan.
    pub async fn load_readable(
        &self,
        request: &LoadRequest,
        format: ReadableFormat,
    ) -> Result<PlanArtifact> {
        self.load_with_layout(request, format.layout()).await
    }

    /// Delete every object of the binary plan and its readable renderings.
    ///
    /// Returns the number of objects removed.
    pub async fn delete(&self, name: &str, namespace: &str, workspace: &str) -> Result<usize> {
        let mut removed = 0;
        for layout in [ArtifactLayout::PLAN, ArtifactLayout::JSON, ArtifactLayout::HUMAN] {
            let existing = self.find(layout, name, namespace, workspace).await?;
            removed += self.evict(&existing).await?;
        }
        info!(
            name = %name,
            namespace = %namespace,
            workspace = %workspace,
            removed = removed,
            "Deleted plan"
        );
        Ok(removed)
    }

    async fn save_with_layout(
        &self,
        plan: &PlanArtifact,
        layout: ArtifactLayout,
    ) -> Result<usize> {
        let existing = self
            .find(layout, &plan.name, &plan.namespace, &plan.workspace)
            .await?;
        let evicted = self.evict(&existing).await?;

        let chunks = codec::encode(
            &plan.plan_id,
            &plan.bytes,
            self.max_chunk_size,
            layout.encoding,
        )?;
        let objects = artifact::to_objects(plan, layout, &chunks);

        for (created, object) in objects.iter().enumerate() {
            if let Err(e) = self.store.create(object).await {
                warn!(
                    name = %plan.name,
                    object = %object.name,
                    created = created,
                    error = %e,
                    "Plan save failed, removing partial plan"
                );
                self.rollback(&objects[..created]).await;
                return Err(e.into());
            }
        }

        info!(
            name = %plan.name,
            namespace = %plan.namespace,
            workspace = %plan.workspace,
            plan_id = %plan.plan_id,
            kind = %layout.kind,
            size = plan.bytes.len(),
            chunks = objects.len(),
            evicted = evicted,
            "Saved plan"
        );

        Ok(objects.len())
    }

    async fn load_with_layout(
        &self,
        request: &LoadRequest,
        layout: ArtifactLayout,
    ) -> Result<PlanArtifact> {
        let objects = self
            .find(layout, &request.name, &request.namespace, &request.workspace)
            .await?;

        if objects.is_empty() {
            warn!(
                name = %request.name,
                namespace = %request.namespace,
                workspace = %request.workspace,
                "No plan found"
            );
            return Err(Error::NoPlanFound {
                name: request.name.clone(),
                namespace: request.namespace.clone(),
                workspace: request.workspace.clone(),
            });
        }

        if request.force {
            info!(name = %request.name, "Force mode, skipping the saved plan check");
        } else if let Some(stale) = objects
            .iter()
            .find(|o| saved_plan_id(o) != request.pending_plan_id)
        {
            let stored = saved_plan_id(stale).to_string();
            warn!(
                name = %request.name,
                pending = %request.pending_plan_id,
                stored = %stored,
                "Stored plan does not match the pending plan"
            );
            return Err(Error::PlanMismatch {
                pending: request.pending_plan_id.clone(),
                stored,
            });
        }

        let chunks = objects
            .iter()
            .map(artifact::chunk_from_object)
            .collect::<Result<Vec<Chunk>>>()?;

        let bytes = if self.verify_hashes {
            codec::decode_verified(chunks)?
        } else {
            codec::decode(chunks)?
        };

        let first = &objects[0];
        let plan = PlanArtifact {
            name: request.name.clone(),
            namespace: request.namespace.clone(),
            workspace: request.workspace.clone(),
            owner_uid: first
                .owner_refs
                .first()
                .map(|owner| owner.uid.clone())
                .unwrap_or_default(),
            plan_id: saved_plan_id(first).to_string(),
            bytes,
        };

        debug!(
            name = %plan.name,
            plan_id = %plan.plan_id,
            chunks = objects.len(),
            size = plan.bytes.len(),
            "Loaded plan"
        );

        Ok(plan)
    }

    /// All objects of one artifact; labeled objects first, else the legacy name.
    async fn find(
        &self,
        layout: ArtifactLayout,
        name: &str,
        namespace: &str,
        workspace: &str,
    ) -> Result<Vec<StoredObject>> {
        let labels = artifact_labels(name, workspace, layout.suffix);
        let found = self
            .store
            .list_by_label(layout.kind, namespace, &labels)
            .await?;
        if !found.is_empty() {
            return Ok(found);
        }

        let legacy_name = object_base_name(workspace, name, layout.suffix);
        let legacy = self.store.get(layout.kind, namespace, &legacy_name).await?;
        if legacy.is_some() {
            debug!(name = %legacy_name, "Found legacy plan object");
        }
        Ok(legacy.into_iter().collect())
    }

    /// Remove objects written by a failed save. The save error is what the
    /// caller sees, so failures here are only logged.
    async fn rollback(&self, created: &[StoredObject]) {
        for object in created {
            if let Err(e) = self.store.delete(object).await {
                error!(
                    name = %object.name,
                    kind = %object.kind,
                    error = %e,
                    "Unable to remove partial plan object"
                );
            }
        }
    }

    async fn evict(&self, objects: &[StoredObject]) -> Result<usize> {
        for object in objects {
            self.store.delete(object).await?;
            debug!(name = %object.name, kind = %object.kind, "Evicted plan object");
        }
        Ok(objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ENCODING_ANNOTATION, GZIP_ENCODING, PLAN_DATA_KEY, SAVED_PLAN_ANNOTATION};
    use crate::store::{MemoryObjectStore, ObjectKind};

    fn plan(plan_id: &str, bytes: &[u8]) -> PlanArtifact {
        PlanArtifact {
            name: "stack".to_string(),
            namespace: "flux-system".to_string(),
            workspace: "default".to_string(),
            owner_uid: "uid-1".to_string(),
            plan_id: plan_id.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    fn request(pending: &str, force: bool) -> LoadRequest {
        LoadRequest {
            name: "stack".to_string(),
            namespace: "flux-system".to_string(),
            workspace: "default".to_string(),
            pending_plan_id: pending.to_string(),
            force,
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = Arc::new(MemoryObjectStore::new());
        let manager = PlanManager::new(store.clone());

        let written = manager.save(&plan("plan-main-abc", b"content")).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.len().await, 1);

        let loaded = manager.load(&request("plan-main-abc", false)).await.unwrap();
        assert_eq!(loaded.bytes, b"content");
        assert_eq!(loaded.plan_id, "plan-main-abc");
        assert_eq!(loaded.owner_uid, "uid-1");
    }

    #[tokio::test]
    async fn test_load_without_plan() {
        let manager = PlanManager::new(Arc::new(MemoryObjectStore::new()));
        let err = manager.load(&request("plan-main-abc", false)).await.unwrap_err();
        assert!(matches!(err, Error::NoPlanFound { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_stale_plan_rejected_unless_forced() {
        let manager = PlanManager::new(Arc::new(MemoryObjectStore::new()));
        manager.save(&plan("plan-main-abc", b"old")).await.unwrap();

        let err = manager.load(&request("plan-main-def", false)).await.unwrap_err();
        match err {
            Error::PlanMismatch { pending, stored } => {
                assert_eq!(pending, "plan-main-def");
                assert_eq!(stored, "plan-main-abc");
            }
            other => panic!("expected PlanMismatch, got {other}"),
        }

        let loaded = manager.load(&request("plan-main-def", true)).await.unwrap();
        assert_eq!(loaded.bytes, b"old");
        assert_eq!(loaded.plan_id, "plan-main-abc");
    }

    #[tokio::test]
    async fn test_save_evicts_previous_chunks() {
        let store = Arc::new(MemoryObjectStore::new());
        let manager = PlanManager::new(store.clone()).with_max_chunk_size(8);

        let big: Vec<u8> = (0..200u8).collect();
        let first = manager.save(&plan("plan-main-abc", &big)).await.unwrap();
        assert!(first > 1);
        assert_eq!(store.len().await, first);

        let second = manager.save(&plan("plan-main-def", b"x")).await.unwrap();
        assert_eq!(store.len().await, second);

        let loaded = manager.load(&request("plan-main-def", false)).await.unwrap();
        assert_eq!(loaded.bytes, b"x");
    }

    #[tokio::test]
    async fn test_legacy_object_is_found() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut legacy =
            StoredObject::new(ObjectKind::Secret, "flux-system", "tfplan-default-stack");
        legacy
            .annotations
            .insert(SAVED_PLAN_ANNOTATION.to_string(), "plan-main-abc".to_string());
        legacy
            .annotations
            .insert(ENCODING_ANNOTATION.to_string(), GZIP_ENCODING.to_string());
        legacy
            .data
            .insert(PLAN_DATA_KEY.to_string(), codec::gzip_encode(b"legacy").unwrap());
        store.create(&legacy).await.unwrap();

        let manager = PlanManager::new(store.clone());
        let loaded = manager.load(&request("plan-main-abc", false)).await.unwrap();
        assert_eq!(loaded.bytes, b"legacy");

        // saving replaces the legacy object
        manager.save(&plan("plan-main-def", b"new")).await.unwrap();
        assert_eq!(store.len().await, 1);
        let loaded = manager.load(&request("plan-main-def", false)).await.unwrap();
        assert_eq!(loaded.bytes, b"new");
    }

    #[tokio::test]
    async fn test_readable_renderings_are_separate() {
        let store = Arc::new(MemoryObjectStore::new());
        let manager = PlanManager::new(store.clone());
        let binary = plan("plan-main-abc", b"binary");
        manager.save(&binary).await.unwrap();

        let json = PlanArtifact {
            bytes: br#"{"format_version":"1.2"}"#.to_vec(),
            ..binary.clone()
        };
        manager.save_readable(&json, ReadableFormat::Json).await.unwrap();

        let human = PlanArtifact {
            bytes: b"No changes.".to_vec(),
            ..binary.clone()
        };
        manager.save_readable(&human, ReadableFormat::Human).await.unwrap();
        assert_eq!(store.len().await, 3);

        let req = request("plan-main-abc", false);
        assert_eq!(manager.load(&req).await.unwrap().bytes, b"binary");
        assert_eq!(
            manager
                .load_readable(&req, ReadableFormat::Json)
                .await
                .unwrap()
                .bytes,
            json.bytes
        );

        let human_object = store
            .get(ObjectKind::ConfigMap, "flux-system", "tfplan-default-stack")
            .await
            .unwrap()
            .expect("human plan should be stored as a ConfigMap");
        assert_eq!(human_object.data[PLAN_DATA_KEY], b"No changes.");

        let removed = manager.delete("stack", "flux-system", "default").await.unwrap();
        assert_eq!(removed, 3);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_partial_plan() {
        let store = Arc::new(MemoryObjectStore::new());
        let manager = PlanManager::new(store.clone()).with_max_chunk_size(4);

        // unrelated object already holding the name of chunk 2
        let blocker =
            StoredObject::new(ObjectKind::ConfigMap, "flux-system", "tfplan-default-stack-2");
        store.create(&blocker).await.unwrap();

        let human = plan("plan-main-abc", b"0123456789ab");
        let err = manager
            .save_readable(&human, ReadableFormat::Human)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "OBJECT_ALREADY_EXISTS");
        assert_eq!(store.len().await, 1, "only the unrelated object remains");

        let err = manager
            .load_readable(&request("plan-main-abc", false), ReadableFormat::Human)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoPlanFound { .. }), "{err}");

        // saving again once the conflict is gone succeeds
        store.delete(&blocker).await.unwrap();
        assert_eq!(
            manager
                .save_readable(&human, ReadableFormat::Human)
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_failed_gzip_save_is_not_reported_as_corrupt() {
        let store = Arc::new(MemoryObjectStore::new());
        let manager = PlanManager::new(store.clone()).with_max_chunk_size(8);

        let blocker =
            StoredObject::new(ObjectKind::Secret, "flux-system", "tfplan-default-stack-1");
        store.create(&blocker).await.unwrap();

        let bytes: Vec<u8> = (0..64u8).collect();
        assert!(manager.save(&plan("plan-main-abc", &bytes)).await.is_err());

        let err = manager.load(&request("plan-main-abc", false)).await.unwrap_err();
        assert!(matches!(err, Error::NoPlanFound { .. }), "{err}");
        assert_eq!(err.class(), crate::error::ErrorClass::OperatorActionable);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_hash_verification() {
        let store = Arc::new(MemoryObjectStore::new());
        let audit_only = PlanManager::new(store.clone()).with_max_chunk_size(4);
        let verifying = audit_only.clone().with_hash_verification(true);

        let human = plan("plan-main-abc", b"0123456789");
        audit_only
            .save_readable(&human, ReadableFormat::Human)
            .await
            .unwrap();

        // rewrite the middle chunk, keeping its recorded hash
        let mut chunk = store
            .get(ObjectKind::ConfigMap, "flux-system", "tfplan-default-stack-1")
            .await
            .unwrap()
            .expect("chunk 1 should exist");
        store.delete(&chunk).await.unwrap();
        chunk.data.insert(PLAN_DATA_KEY.to_string(), b"XXXX".to_vec());
        store.create(&chunk).await.unwrap();

        let req = request("plan-main-abc", false);
        let unverified = audit_only
            .load_readable(&req, ReadableFormat::Human)
            .await
            .unwrap();
        assert_eq!(unverified.bytes, b"0123XXXX89");

        let err = verifying
            .load_readable(&req, ReadableFormat::Human)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CHUNK_HASH_MISMATCH");
    }
}
