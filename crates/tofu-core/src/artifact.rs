// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mapping between plan artifacts and stored objects.
//!
//! A plan is encoded into chunks by [`crate::codec`]; this module turns those
//! chunks into labeled objects and back.
//!
//! | Chunks | Object names |
//! |--------|--------------|
//! | 1 | `tfplan-<workspace>-<name><suffix>` |
//! | n > 1 | `tfplan-<workspace>-<name><suffix>-0` … `-<n-1>` |
//!
//! Every object of an artifact carries the same `plan-name` and
//! `plan-workspace` labels, so a single label query finds all of them.

use std::collections::BTreeMap;

use crate::codec::{Chunk, Encoding, sha256_hex};
use crate::error::{Error, Result};
use crate::store::{ObjectKind, OwnerReference, StoredObject};

/// Label holding `<name><suffix>`.
pub const PLAN_NAME_LABEL: &str = "infra.contrib.fluxcd.io/plan-name";
/// Label holding the workspace.
pub const PLAN_WORKSPACE_LABEL: &str = "infra.contrib.fluxcd.io/plan-workspace";
/// Annotation holding the chunk index (multi-chunk artifacts only).
pub const PLAN_CHUNK_ANNOTATION: &str = "infra.contrib.fluxcd.io/plan-chunk";
/// Annotation holding the hex SHA-256 of the object payload.
pub const PLAN_HASH_ANNOTATION: &str = "infra.contrib.fluxcd.io/plan-hash";
/// Annotation holding the plan ID the artifact was saved under.
pub const SAVED_PLAN_ANNOTATION: &str = "savedPlan";
/// Annotation naming the payload encoding.
pub const ENCODING_ANNOTATION: &str = "encoding";
/// Value of [`ENCODING_ANNOTATION`] for compressed payloads.
pub const GZIP_ENCODING: &str = "gzip";
/// Payload map key.
pub const PLAN_DATA_KEY: &str = "tfplan";
/// Object name prefix.
pub const OBJECT_NAME_PREFIX: &str = "tfplan";
/// API version of the owning object.
pub const OWNER_API_VERSION: &str = "infra.contrib.fluxcd.io/v1alpha2";
/// Kind of the owning object.
pub const OWNER_KIND: &str = "Terraform";

/// A serialized execution plan, owned by one managed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanArtifact {
    /// Name of the owning object.
    pub name: String,
    /// Namespace of the owning object.
    pub namespace: String,
    /// Workspace the plan was produced in.
    pub workspace: String,
    /// Unique ID of the owning object.
    pub owner_uid: String,
    /// Plan ID derived from the planned revision.
    pub plan_id: String,
    /// Raw plan bytes.
    pub bytes: Vec<u8>,
}

/// Where and how one rendering of a plan is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Object kind used for every chunk.
    pub kind: ObjectKind,
    /// Appended to the artifact name in labels and object names.
    pub suffix: &'static str,
    /// Payload encoding.
    pub encoding: Encoding,
}

impl ArtifactLayout {
    /// Binary plan.
    pub const PLAN: Self = Self {
        kind: ObjectKind::Secret,
        suffix: "",
        encoding: Encoding::Gzip,
    };

    /// JSON rendering of the plan.
    pub const JSON: Self = Self {
        kind: ObjectKind::Secret,
        suffix: ".json",
        encoding: Encoding::Gzip,
    };

    /// Human-readable rendering of the plan.
    pub const HUMAN: Self = Self {
        kind: ObjectKind::ConfigMap,
        suffix: "",
        encoding: Encoding::Plain,
    };
}

/// Base object name: `tfplan-<workspace>-<name><suffix>`.
///
/// Without a suffix this is also the legacy single-object name.
pub fn object_base_name(workspace: &str, name: &str, suffix: &str) -> String {
    format!("{OBJECT_NAME_PREFIX}-{workspace}-{name}{suffix}")
}

/// Label selector matching every object of an artifact.
pub fn artifact_labels(name: &str, workspace: &str, suffix: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(PLAN_NAME_LABEL.to_string(), format!("{name}{suffix}"));
    labels.insert(PLAN_WORKSPACE_LABEL.to_string(), workspace.to_string());
    labels
}

/// Build the objects holding `chunks` of `artifact`.
pub fn to_objects(
    artifact: &PlanArtifact,
    layout: ArtifactLayout,
    chunks: &[Chunk],
) -> Vec<StoredObject> {
    let base_name = object_base_name(&artifact.workspace, &artifact.name, layout.suffix);
    let labels = artifact_labels(&artifact.name, &artifact.workspace, layout.suffix);
    let owner = OwnerReference {
        api_version: OWNER_API_VERSION.to_string(),
        kind: OWNER_KIND.to_string(),
        name: artifact.name.clone(),
        uid: artifact.owner_uid.clone(),
    };
    let chunked = chunks.len() > 1;

    chunks
        .iter()
        .map(|chunk| {
            let name = if chunked {
                format!("{base_name}-{}", chunk.index)
            } else {
                base_name.clone()
            };

            let mut object = StoredObject::new(layout.kind, &artifact.namespace, name);
            object.labels = labels.clone();
            object
                .annotations
                .insert(SAVED_PLAN_ANNOTATION.to_string(), artifact.plan_id.clone());
            object
                .annotations
                .insert(PLAN_HASH_ANNOTATION.to_string(), chunk.content_hash.clone());
            if chunked {
                object
                    .annotations
                    .insert(PLAN_CHUNK_ANNOTATION.to_string(), chunk.index.to_string());
            }
            if chunk.is_compressed {
                object
                    .annotations
                    .insert(ENCODING_ANNOTATION.to_string(), GZIP_ENCODING.to_string());
            }
            object.owner_refs.push(owner.clone());
            object
                .data
                .insert(PLAN_DATA_KEY.to_string(), chunk.payload.clone());
            object
        })
        .collect()
}

/// Plan ID recorded on a stored object. A missing annotation reads as empty.
pub fn saved_plan_id(object: &StoredObject) -> &str {
    object
        .annotations
        .get(SAVED_PLAN_ANNOTATION)
        .map(String::as_str)
        .unwrap_or_default()
}

/// Read a chunk back from a stored object.
///
/// A missing chunk annotation means index 0. A missing hash annotation is
/// filled in from the payload as read.
pub fn chunk_from_object(object: &StoredObject) -> Result<Chunk> {
    let payload = object
        .data
        .get(PLAN_DATA_KEY)
        .ok_or_else(|| Error::MalformedObject {
            name: object.name.clone(),
            reason: format!("missing key {PLAN_DATA_KEY}"),
        })?
        .clone();

    let index = match object.annotations.get(PLAN_CHUNK_ANNOTATION) {
        Some(raw) if !raw.is_empty() => raw.parse().map_err(|e| Error::MalformedObject {
            name: object.name.clone(),
            reason: format!("invalid chunk index annotation '{raw}': {e}"),
        })?,
        _ => 0,
    };

    let content_hash = object
        .annotations
        .get(PLAN_HASH_ANNOTATION)
        .cloned()
        .unwrap_or_else(|| sha256_hex(&payload));

    let is_compressed = object
        .annotations
        .get(ENCODING_ANNOTATION)
        .is_some_and(|e| e == GZIP_ENCODING);

    Ok(Chunk {
        index,
        plan_id: saved_plan_id(object).to_string(),
        payload,
        content_hash,
        is_compressed,
    })
}
