// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object store interface and backend implementations.
//!
//! The persistence medium is a namespaced key/value store of labeled objects,
//! each carrying a string-to-bytes payload map bounded by a per-object size
//! ceiling. This module defines that abstraction; [`crate::artifact`] maps
//! plan chunks onto it.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryObjectStore;
pub use self::sqlite::SqliteObjectStore;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorClass;

/// Maximum payload size of a single stored object (1 MiB).
pub const MAX_OBJECT_SIZE: usize = 1024 * 1024;

/// Errors from object store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The object does not exist.
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        /// Object kind.
        kind: ObjectKind,
        /// Namespace of the object.
        namespace: String,
        /// Name of the object.
        name: String,
    },

    /// An object with the same kind, namespace and name already exists.
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        /// Object kind.
        kind: ObjectKind,
        /// Namespace of the object.
        namespace: String,
        /// Name of the object.
        name: String,
    },

    /// The object payload exceeds the per-object ceiling.
    #[error("Object '{name}' is {size} bytes, limit is {limit}")]
    ObjectTooLarge {
        /// Name of the object.
        name: String,
        /// Payload size in bytes.
        size: usize,
        /// Ceiling in bytes.
        limit: usize,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Labels, annotations or owner references could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "OBJECT_NOT_FOUND",
            Self::AlreadyExists { .. } => "OBJECT_ALREADY_EXISTS",
            Self::ObjectTooLarge { .. } => "OBJECT_TOO_LARGE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Classify this error for the control loop.
    ///
    /// An oversized object means the chunk size bound is misconfigured, which
    /// no retry will fix.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ObjectTooLarge { .. } | Self::Serialization(_) => ErrorClass::Fatal,
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::Database(_) => {
                ErrorClass::Unclassified
            }
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Kind of stored object. Names are unique per kind and namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Opaque binary payloads (binary and JSON plans).
    Secret,
    /// Text payloads (human-readable plans).
    ConfigMap,
}

impl ObjectKind {
    /// Stable string form, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Secret" => Ok(Self::Secret),
            "ConfigMap" => Ok(Self::ConfigMap),
            other => Err(format!("unknown object kind '{}'", other)),
        }
    }
}

/// Reference from a stored object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    /// API group/version of the owner.
    pub api_version: String,
    /// Kind of the owner.
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// Unique ID of the owner.
    pub uid: String,
}

/// A labeled, annotated key/value record in the persistence medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object kind.
    pub kind: ObjectKind,
    /// Object name, unique per kind and namespace.
    pub name: String,
    /// Namespace the object lives in.
    pub namespace: String,
    /// Labels used for list-based retrieval.
    pub labels: BTreeMap<String, String>,
    /// Free-form metadata.
    pub annotations: BTreeMap<String, String>,
    /// Owners; deleting an owner cascades to the object.
    pub owner_refs: Vec<OwnerReference>,
    /// Payload map.
    pub data: BTreeMap<String, Vec<u8>>,
    /// Set by the store when the object is created.
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredObject {
    /// Create an empty object.
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owner_refs: Vec::new(),
            data: BTreeMap::new(),
            created_at: None,
        }
    }

    /// Total size of the payload values in bytes.
    pub fn payload_size(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    /// Whether every label in `selector` is present with the same value.
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.labels.get(key) == Some(value))
    }

    /// Whether any owner reference points at `uid`.
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_refs.iter().any(|owner| owner.uid == uid)
    }
}

/// Reject objects whose payload exceeds `limit`.
pub(crate) fn check_size(object: &StoredObject, limit: usize) -> Result<()> {
    let size = object.payload_size();
    if size > limit {
        return Err(StoreError::ObjectTooLarge {
            name: object.name.clone(),
            size,
            limit,
        });
    }
    Ok(())
}

/// Persistence medium for plan objects.
///
/// Implementations must be safe to share between independently reconciled
/// objects. Each call is a single round-trip; create and delete are atomic
/// per object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend identifier (e.g., "memory", "sqlite").
    fn backend(&self) -> &'static str;

    /// List objects of `kind` in `namespace` carrying all `labels`, ordered by name.
    async fn list_by_label(
        &self,
        kind: ObjectKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<StoredObject>>;

    /// Get a single object by name.
    async fn get(&self, kind: ObjectKind, namespace: &str, name: &str)
    -> Result<Option<StoredObject>>;

    /// Create a new object.
    ///
    /// Fails with `AlreadyExists` when the name is taken and `ObjectTooLarge`
    /// when the payload exceeds the ceiling.
    async fn create(&self, object: &StoredObject) -> Result<()>;

    /// Delete an object. Fails with `NotFound` when it does not exist.
    async fn delete(&self, object: &StoredObject) -> Result<()>;

    /// Delete every object in `namespace` owned by `owner_uid`.
    ///
    /// Returns the number of objects removed.
    async fn delete_owned_by(&self, namespace: &str, owner_uid: &str) -> Result<usize>;
}
