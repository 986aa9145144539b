//! Material ↔ property association

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::info;

use super::listing::push_id_list;
use super::{ancestor_chain, invalidate_lineage, PropertyCache, DEFAULT_ORDER, FLAT_SELECT};
use crate::db::Property;
use crate::{Error, Result};

/// Rows changed by [`AssignmentStore::assign`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentChange {
    pub added: BTreeSet<i64>,
    pub removed: BTreeSet<i64>,
}

impl AssignmentChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone)]
pub struct AssignmentStore {
    pool: SqlitePool,
    cache: Arc<PropertyCache>,
}

impl AssignmentStore {
    pub fn new(pool: SqlitePool, cache: Arc<PropertyCache>) -> Self {
        Self { pool, cache }
    }

    /// Make `property_ids` the exact tag set of a material
    ///
    /// Only the difference is written. Usage counts are part of cached
    /// subtrees, so every added or removed property has its lineage
    /// invalidated.
    pub async fn assign(&self, material_id: i64, property_ids: &[i64]) -> Result<AssignmentChange> {
        let wanted: BTreeSet<i64> = property_ids.iter().copied().collect();
        let mut tx = self.pool.begin().await?;

        let material = sqlx::query_scalar::<_, i64>("SELECT id FROM materials WHERE id = ?")
            .bind(material_id)
            .fetch_optional(&mut *tx)
            .await?;
        if material.is_none() {
            return Err(Error::NotFound(format!("Material {} not found", material_id)));
        }

        let missing = missing_properties(&mut *tx, &wanted).await?;
        if !missing.is_empty() {
            return Err(Error::validation(
                "properties",
                format!("Unknown property ids: {:?}", missing),
            ));
        }

        let current: BTreeSet<i64> = sqlx::query_scalar::<_, i64>(
            "SELECT property_id FROM material_property WHERE material_id = ?",
        )
        .bind(material_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let change = AssignmentChange {
            added: wanted.difference(&current).copied().collect(),
            removed: current.difference(&wanted).copied().collect(),
        };
        if change.is_empty() {
            return Ok(change);
        }

        for property_id in &change.added {
            sqlx::query("INSERT INTO material_property (material_id, property_id) VALUES (?, ?)")
                .bind(material_id)
                .bind(*property_id)
                .execute(&mut *tx)
                .await?;
        }
        for property_id in &change.removed {
            sqlx::query("DELETE FROM material_property WHERE material_id = ? AND property_id = ?")
                .bind(material_id)
                .bind(*property_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("UPDATE materials SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(material_id)
            .execute(&mut *tx)
            .await?;

        let mut stale = Vec::new();
        for property_id in change.added.iter().chain(&change.removed) {
            stale.extend(ancestor_chain(&mut *tx, Some(*property_id)).await?);
        }

        tx.commit().await?;
        invalidate_lineage(&self.cache, stale);

        info!(
            "Material {} tags updated: +{:?} -{:?}",
            material_id, change.added, change.removed
        );
        Ok(change)
    }

    /// Properties attached to a material, flat, in default order
    pub async fn properties_of(&self, material_id: i64) -> Result<Vec<Property>> {
        let properties = sqlx::query_as::<_, Property>(&format!(
            "{} WHERE p.id IN (SELECT property_id FROM material_property WHERE material_id = ?) {}",
            FLAT_SELECT, DEFAULT_ORDER
        ))
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(properties)
    }

    /// Distinct property ids attached to at least one material
    pub async fn used_property_ids(&self, published_only: bool) -> Result<BTreeSet<i64>> {
        let sql = if published_only {
            "SELECT DISTINCT mp.property_id FROM material_property mp \
             JOIN materials m ON m.id = mp.material_id \
             WHERE m.status = 'published'"
        } else {
            "SELECT DISTINCT property_id FROM material_property"
        };
        let ids: Vec<i64> = sqlx::query_scalar(sql).fetch_all(&self.pool).await?;
        Ok(ids.into_iter().collect())
    }
}

/// Ids among `ids` with no property row
async fn missing_properties(
    conn: &mut SqliteConnection,
    ids: &BTreeSet<i64>,
) -> Result<BTreeSet<i64>> {
    if ids.is_empty() {
        return Ok(BTreeSet::new());
    }
    let list: Vec<i64> = ids.iter().copied().collect();
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM properties WHERE id IN ");
    push_id_list(&mut qb, &list);

    let found: HashSet<i64> = qb
        .build_query_scalar::<i64>()
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();
    Ok(list.into_iter().filter(|id| !found.contains(id)).collect())
}
