// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory object store.
//!
//! Keeps objects in a map behind an async `RwLock`. Used by tests and by
//! embedded setups that do not need plans to survive a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{MAX_OBJECT_SIZE, ObjectKind, ObjectStore, Result, StoreError, StoredObject, check_size};

type ObjectKey = (ObjectKind, String, String);

/// In-memory [`ObjectStore`].
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<ObjectKey, StoredObject>>>,
    max_object_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    /// Create an empty store with the default 1 MiB object ceiling.
    pub fn new() -> Self {
        Self::with_max_object_size(MAX_OBJECT_SIZE)
    }

    /// Create an empty store with a custom object ceiling.
    pub fn with_max_object_size(max_object_size: usize) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            max_object_size,
        }
    }

    /// Number of objects currently stored.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn key(kind: ObjectKind, namespace: &str, name: &str) -> ObjectKey {
        (kind, namespace.to_string(), name.to_string())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list_by_label(
        &self,
        kind: ObjectKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<StoredObject>> {
        let objects = self.objects.read().await;
        let mut found: Vec<StoredObject> = objects
            .values()
            .filter(|o| o.kind == kind && o.namespace == namespace && o.matches_labels(labels))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredObject>> {
        let objects = self.objects.read().await;
        Ok(objects.get(&Self::key(kind, namespace, name)).cloned())
    }

    async fn create(&self, object: &StoredObject) -> Result<()> {
        check_size(object, self.max_object_size)?;

        let mut objects = self.objects.write().await;
        let key = Self::key(object.kind, &object.namespace, &object.name);
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: object.kind,
                namespace: object.namespace.clone(),
                name: object.name.clone(),
            });
        }

        let mut stored = object.clone();
        stored.created_at = Some(Utc::now());
        objects.insert(key, stored);
        Ok(())
    }

    async fn delete(&self, object: &StoredObject) -> Result<()> {
        let mut objects = self.objects.write().await;
        let key = Self::key(object.kind, &object.namespace, &object.name);
        match objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind: object.kind,
                namespace: object.namespace.clone(),
                name: object.name.clone(),
            }),
        }
    }

    async fn delete_owned_by(&self, namespace: &str, owner_uid: &str) -> Result<usize> {
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|_, o| !(o.namespace == namespace && o.is_owned_by(owner_uid)));
        Ok(before - objects.len())
    }
}
