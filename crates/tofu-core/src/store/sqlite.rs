// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed object store.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::{
    MAX_OBJECT_SIZE, ObjectKind, ObjectStore, OwnerReference, Result, StoreError, StoredObject,
    check_size,
};
use crate::migrations;

/// JSON path selecting `key` from the labels column. Keys contain `.` and `/`.
fn label_path(key: &str) -> String {
    format!("$.\"{key}\"")
}

#[derive(sqlx::FromRow)]
struct ObjectRow {
    kind: String,
    namespace: String,
    name: String,
    labels: String,
    annotations: String,
    owner_refs: String,
    created_at: DateTime<Utc>,
}

impl ObjectRow {
    fn kind(&self) -> Result<ObjectKind> {
        self.kind
            .parse()
            .map_err(|e: String| StoreError::Database(sqlx::Error::Decode(e.into())))
    }

    fn labels(&self) -> Result<BTreeMap<String, String>> {
        Ok(serde_json::from_str(&self.labels)?)
    }

    fn owner_refs(&self) -> Result<Vec<OwnerReference>> {
        Ok(serde_json::from_str(&self.owner_refs)?)
    }
}

#[derive(sqlx::FromRow)]
struct DataRow {
    data_key: String,
    data_value: Vec<u8>,
}

/// SQLite-backed [`ObjectStore`].
#[derive(Clone)]
pub struct SqliteObjectStore {
    pool: SqlitePool,
    max_object_size: usize,
}

impl SqliteObjectStore {
    /// Create a store from an existing pool. Migrations must already be applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_object_size: MAX_OBJECT_SIZE,
        }
    }

    /// Override the per-object ceiling.
    pub fn with_max_object_size(mut self, max_object_size: usize) -> Self {
        self.max_object_size = max_object_size;
        self
    }

    /// Create and initialize a store from a file path.
    ///
    /// Creates parent directories and the database file if needed, then runs
    /// all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.into()))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;

        debug!(path = %path.display(), "SQLite object store ready");

        Ok(Self::new(pool))
    }

    async fn load_data(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let rows = sqlx::query_as::<_, DataRow>(
            r#"
            SELECT data_key, data_value
            FROM stored_object_data
            WHERE kind = ? AND namespace = ? AND name = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(namespace)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.data_key, row.data_value))
            .collect())
    }

    async fn hydrate(&self, row: ObjectRow) -> Result<StoredObject> {
        let kind = row.kind()?;
        let labels = row.labels()?;
        let annotations = serde_json::from_str(&row.annotations)?;
        let owner_refs = row.owner_refs()?;
        let data = self.load_data(kind, &row.namespace, &row.name).await?;

        Ok(StoredObject {
            kind,
            name: row.name,
            namespace: row.namespace,
            labels,
            annotations,
            owner_refs,
            data,
            created_at: Some(row.created_at),
        })
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn list_by_label(
        &self,
        kind: ObjectKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<StoredObject>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT kind, namespace, name, labels, annotations, owner_refs, created_at \
             FROM stored_objects WHERE kind = ",
        );
        query.push_bind(kind.as_str());
        query.push(" AND namespace = ");
        query.push_bind(namespace.to_string());
        for (key, value) in labels {
            query.push(" AND json_extract(labels, ");
            query.push_bind(label_path(key));
            query.push(") = ");
            query.push_bind(value.clone());
        }
        query.push(" ORDER BY name");

        let rows = query
            .build_query_as::<ObjectRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            found.push(self.hydrate(row).await?);
        }

        Ok(found)
    }

    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredObject>> {
        let row = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT kind, namespace, name, labels, annotations, owner_refs, created_at
            FROM stored_objects
            WHERE kind = ? AND namespace = ? AND name = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(namespace)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, object: &StoredObject) -> Result<()> {
        check_size(object, self.max_object_size)?;

        let labels = serde_json::to_string(&object.labels)?;
        let annotations = serde_json::to_string(&object.annotations)?;
        let owner_refs = serde_json::to_string(&object.owner_refs)?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO stored_objects
                (kind, namespace, name, labels, annotations, owner_refs, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(object.kind.as_str())
        .bind(&object.namespace)
        .bind(&object.name)
        .bind(labels)
        .bind(annotations)
        .bind(owner_refs)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                return Err(StoreError::AlreadyExists {
                    kind: object.kind,
                    namespace: object.namespace.clone(),
                    name: object.name.clone(),
                });
            }
            return Err(e.into());
        }

        for (key, value) in &object.data {
            sqlx::query(
                r#"
                INSERT INTO stored_object_data (kind, namespace, name, data_key, data_value)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(object.kind.as_str())
            .bind(&object.namespace)
            .bind(&object.name)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, object: &StoredObject) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM stored_object_data
            WHERE kind = ? AND namespace = ? AND name = ?
            "#,
        )
        .bind(object.kind.as_str())
        .bind(&object.namespace)
        .bind(&object.name)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            DELETE FROM stored_objects
            WHERE kind = ? AND namespace = ? AND name = ?
            "#,
        )
        .bind(object.kind.as_str())
        .bind(&object.namespace)
        .bind(&object.name)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: object.kind,
                namespace: object.namespace.clone(),
                name: object.name.clone(),
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_owned_by(&self, namespace: &str, owner_uid: &str) -> Result<usize> {
        let rows = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT kind, namespace, name, labels, annotations, owner_refs, created_at
            FROM stored_objects
            WHERE namespace = ?
            "#,
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        let mut removed = 0;
        for row in rows {
            let owned = row.owner_refs()?.iter().any(|owner| owner.uid == owner_uid);
            if !owned {
                continue;
            }
            let object = StoredObject::new(row.kind()?, row.namespace, row.name);
            self.delete(&object).await?;
            removed += 1;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create an in-memory SQLite pool for testing.
    async fn test_store() -> SqliteObjectStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteObjectStore::new(pool)
    }

    fn object(name: &str) -> StoredObject {
        let mut obj = StoredObject::new(ObjectKind::Secret, "flux-system", name);
        obj.labels.insert("plan-name".into(), "stack".into());
        obj.labels.insert("plan-workspace".into(), "default".into());
        obj.annotations.insert("saved-plan".into(), "plan-main-abc".into());
        obj.owner_refs.push(OwnerReference {
            api_version: "infra.contrib.fluxcd.io/v1alpha2".into(),
            kind: "Terraform".into(),
            name: "stack".into(),
            uid: "uid-1".into(),
        });
        obj.data.insert("tfplan".into(), vec![1, 2, 3, 4]);
        obj
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = test_store().await;
        let obj = object("tfplan-default-stack");

        store.create(&obj).await.expect("Failed to create object");

        let fetched = store
            .get(ObjectKind::Secret, "flux-system", "tfplan-default-stack")
            .await
            .expect("Failed to get object")
            .expect("Object should exist");

        assert_eq!(fetched.labels, obj.labels);
        assert_eq!(fetched.annotations, obj.annotations);
        assert_eq!(fetched.owner_refs, obj.owner_refs);
        assert_eq!(fetched.data, obj.data);
        assert!(fetched.created_at.is_some());
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = test_store().await;
        let result = store
            .get(ObjectKind::Secret, "flux-system", "nonexistent")
            .await
            .expect("Query should succeed");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let store = test_store().await;
        let obj = object("tfplan-default-stack");
        store.create(&obj).await.unwrap();

        let err = store.create(&obj).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_create_too_large() {
        let store = test_store().await.with_max_object_size(3);
        let err = store.create(&object("big")).await.unwrap_err();
        assert!(matches!(err, StoreError::ObjectTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_list_by_label() {
        let store = test_store().await;
        store.create(&object("tfplan-default-stack-1")).await.unwrap();
        store.create(&object("tfplan-default-stack-0")).await.unwrap();

        let mut other = object("tfplan-default-other");
        other.labels.insert("plan-name".into(), "other".into());
        store.create(&other).await.unwrap();

        let mut selector = BTreeMap::new();
        selector.insert("plan-name".to_string(), "stack".to_string());
        selector.insert("plan-workspace".to_string(), "default".to_string());

        let found = store
            .list_by_label(ObjectKind::Secret, "flux-system", &selector)
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["tfplan-default-stack-0", "tfplan-default-stack-1"]);
        assert!(found.iter().all(|o| o.data["tfplan"] == vec![1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn test_list_by_label_with_qualified_keys() {
        let store = test_store().await;

        let mut plan = object("tfplan-default-stack");
        plan.labels.clear();
        plan.labels.insert("infra.contrib.fluxcd.io/plan-name".into(), "stack".into());
        plan.labels.insert("infra.contrib.fluxcd.io/plan-workspace".into(), "default".into());
        store.create(&plan).await.unwrap();

        let mut json = object("tfplan-default-stack.json");
        json.labels.clear();
        json.labels.insert("infra.contrib.fluxcd.io/plan-name".into(), "stack.json".into());
        json.labels.insert("infra.contrib.fluxcd.io/plan-workspace".into(), "default".into());
        store.create(&json).await.unwrap();

        let mut selector = BTreeMap::new();
        selector.insert("infra.contrib.fluxcd.io/plan-name".to_string(), "stack".to_string());
        selector.insert(
            "infra.contrib.fluxcd.io/plan-workspace".to_string(),
            "default".to_string(),
        );
        let found = store
            .list_by_label(ObjectKind::Secret, "flux-system", &selector)
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["tfplan-default-stack"]);

        // a key the objects do not carry matches nothing
        selector.insert("infra.contrib.fluxcd.io/other".to_string(), "x".to_string());
        let found = store
            .list_by_label(ObjectKind::Secret, "flux-system", &selector)
            .await
            .unwrap();
        assert!(found.is_empty());

        // an empty selector matches every object of the kind in the namespace
        let found = store
            .list_by_label(ObjectKind::Secret, "flux-system", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = test_store().await;
        let obj = object("tfplan-default-stack");
        store.create(&obj).await.unwrap();

        store.delete(&obj).await.expect("Failed to delete object");
        assert!(
            store
                .get(ObjectKind::Secret, "flux-system", "tfplan-default-stack")
                .await
                .unwrap()
                .is_none()
        );

        let err = store.delete(&obj).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        // name is free again
        store.create(&obj).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_owned_by() {
        let store = test_store().await;
        store.create(&object("tfplan-default-stack-0")).await.unwrap();
        store.create(&object("tfplan-default-stack-1")).await.unwrap();

        let mut unowned = object("tfplan-default-unowned");
        unowned.owner_refs.clear();
        store.create(&unowned).await.unwrap();

        let removed = store
            .delete_owned_by("flux-system", "uid-1")
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let all = store
            .list_by_label(ObjectKind::Secret, "flux-system", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "tfplan-default-unowned");
    }
}
