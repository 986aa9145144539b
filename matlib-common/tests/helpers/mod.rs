//! Shared fixtures for matlib-common integration tests
//!
//! Every test gets its own SQLite file inside a temporary directory, so
//! tests run in parallel without sharing state.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;

use matlib_common::db::{init_database, MaterialStatus, Property};
use matlib_common::property::{PropertyCache, PropertyDraft};
use matlib_common::{AssignmentStore, MaterialStore, PropertyStore, TreeBuilder};

/// Fresh database with every store wired to one shared cache
pub struct TestDb {
    // Held so the directory outlives the pool
    _dir: TempDir,
    pub pool: SqlitePool,
    pub cache: Arc<PropertyCache>,
    pub properties: PropertyStore,
    pub tree: TreeBuilder,
    pub assignments: AssignmentStore,
    pub materials: MaterialStore,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let pool = init_database(&dir.path().join("matlib.db"))
            .await
            .expect("init database");
        let cache = Arc::new(PropertyCache::new());

        Self {
            properties: PropertyStore::new(pool.clone(), Arc::clone(&cache)),
            tree: TreeBuilder::new(pool.clone(), Arc::clone(&cache)),
            assignments: AssignmentStore::new(pool.clone(), Arc::clone(&cache)),
            materials: MaterialStore::new(pool.clone()),
            cache,
            pool,
            _dir: dir,
        }
    }

    /// Insert a property and return its id
    pub async fn property(&self, parent: i64, value: &str) -> i64 {
        self.properties
            .save(PropertyDraft::new(Some(parent), value))
            .await
            .expect("save property")
            .id
    }

    pub async fn property_with_priority(&self, parent: i64, value: &str, priority: i64) -> i64 {
        let draft = PropertyDraft {
            priority,
            ..PropertyDraft::new(Some(parent), value)
        };
        self.properties.save(draft).await.expect("save property").id
    }

    /// Insert a published material tagged with `tags`
    pub async fn material(&self, title: &str, tags: &[i64]) -> i64 {
        self.material_with_status(title, MaterialStatus::Published, tags)
            .await
    }

    pub async fn material_with_status(
        &self,
        title: &str,
        status: MaterialStatus,
        tags: &[i64],
    ) -> i64 {
        let material = self
            .materials
            .create(title, status)
            .await
            .expect("create material");
        self.assignments
            .assign(material.id, tags)
            .await
            .expect("assign tags");
        material.id
    }
}

/// Ids of a node's children, in order
pub fn child_ids(node: &Property) -> Vec<i64> {
    node.children().iter().map(|c| c.id).collect()
}
