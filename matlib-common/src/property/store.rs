//! Property persistence
//!
//! Every mutation runs in one transaction with its structural guards
//! (uniqueness, parent existence, acyclicity, usage). Cache invalidation
//! happens after commit and covers the touched nodes plus their ancestors.

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::form::PropertyDraft;
use super::listing::{order_clause, push_conditions, ListQuery};
use super::{ancestor_chain, invalidate_lineage, PropertyCache, DEFAULT_ORDER, FLAT_SELECT};
use crate::db::Property;
use crate::pagination::{calculate_pagination, PagedResult};
use crate::{Error, Result};

const DUPLICATE_VALUE: &str = "Tag with the same value already exists";
const CYCLIC_PARENT: &str = "Tag cannot be nested under itself or its own children";
const MISSING_PARENT: &str = "Given id is not valid";

#[derive(Clone)]
pub struct PropertyStore {
    pool: SqlitePool,
    cache: Arc<PropertyCache>,
}

impl PropertyStore {
    pub fn new(pool: SqlitePool, cache: Arc<PropertyCache>) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &Arc<PropertyCache> {
        &self.cache
    }

    /// Flat record with `category` and `usage`; `children` is never set
    ///
    /// Id 0 denotes the synthetic root and is never stored.
    pub async fn find(&self, id: i64) -> Result<Option<Property>> {
        if id == 0 {
            return Ok(None);
        }
        let property = sqlx::query_as::<_, Property>(&format!("{} WHERE p.id = ?", FLAT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(property)
    }

    /// Insert when `draft.id` is `None`, update otherwise
    ///
    /// Returns the stored record as [`PropertyStore::find`] would.
    pub async fn save(&self, draft: PropertyDraft) -> Result<Property> {
        let parent = draft.parent.filter(|p| *p != 0);
        let mut tx = self.pool.begin().await?;

        let old_parent = match draft.id {
            Some(id) => {
                let row = sqlx::query_scalar::<_, Option<i64>>(
                    "SELECT parent FROM properties WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
                match row {
                    Some(old_parent) => old_parent,
                    None => return Err(Error::NotFound(format!("Property {} not found", id))),
                }
            }
            None => None,
        };

        ensure_unique(&mut *tx, draft.id, parent, &draft.value).await?;

        let new_chain = match parent {
            Some(parent_id) => {
                let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM properties WHERE id = ?")
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .is_some();
                if !exists {
                    return Err(Error::validation("tag", MISSING_PARENT));
                }

                let chain = ancestor_chain(&mut *tx, Some(parent_id)).await?;
                if let Some(id) = draft.id {
                    // The new parent must not be the node itself or lie below it
                    if chain.contains(&id) {
                        return Err(Error::validation("tag", CYCLIC_PARENT));
                    }
                }
                chain
            }
            None => Vec::new(),
        };

        let id = match draft.id {
            Some(id) => {
                sqlx::query(
                    "UPDATE properties SET parent = ?, value = ?, priority = ?, description = ? \
                     WHERE id = ?",
                )
                .bind(parent)
                .bind(&draft.value)
                .bind(draft.priority)
                .bind(&draft.description)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_unique_violation)?;
                id
            }
            None => sqlx::query(
                "INSERT INTO properties (parent, value, priority, description) VALUES (?, ?, ?, ?)",
            )
            .bind(parent)
            .bind(&draft.value)
            .bind(draft.priority)
            .bind(&draft.description)
            .execute(&mut *tx)
            .await
            .map_err(map_unique_violation)?
            .last_insert_rowid(),
        };

        let old_chain = if old_parent != parent {
            ancestor_chain(&mut *tx, old_parent).await?
        } else {
            Vec::new()
        };

        tx.commit().await?;

        invalidate_lineage(
            &self.cache,
            std::iter::once(id).chain(new_chain).chain(old_chain),
        );

        if draft.id.is_some() {
            info!("Updated property {} ({:?} under {:?})", id, draft.value, parent);
        } else {
            info!("Created property {} ({:?} under {:?})", id, draft.value, parent);
        }

        self.find(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Property {} vanished after save", id)))
    }

    /// Delete a property
    ///
    /// Without `purge`, a property that is used by materials or has children
    /// is left alone and [`Error::Conflict`] is returned. With `purge`, the
    /// whole subtree goes, deepest nodes first. Returns `Ok(false)` when the
    /// id does not exist.
    pub async fn delete(&self, id: i64, purge: bool) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let parent = match sqlx::query_scalar::<_, Option<i64>>(
            "SELECT parent FROM properties WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        {
            Some(parent) => parent,
            None => return Ok(false),
        };

        if !purge {
            let usage: i64 = sqlx::query_scalar(
                "SELECT COUNT(id) FROM material_property WHERE property_id = ?",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if usage > 0 {
                return Err(Error::Conflict(format!(
                    "Tag is used by {} material{}",
                    usage,
                    if usage == 1 { "" } else { "s" }
                )));
            }

            let children: i64 =
                sqlx::query_scalar("SELECT COUNT(id) FROM properties WHERE parent = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if children > 0 {
                return Err(Error::Conflict(format!(
                    "Tag contains {} nested value{}",
                    children,
                    if children == 1 { "" } else { "s" }
                )));
            }
        }

        let doomed = subtree_post_order(&mut *tx, id).await?;
        for node in &doomed {
            sqlx::query("DELETE FROM properties WHERE id = ?")
                .bind(*node)
                .execute(&mut *tx)
                .await?;
        }

        let ancestors = ancestor_chain(&mut *tx, parent).await?;
        tx.commit().await?;

        invalidate_lineage(&self.cache, doomed.iter().copied().chain(ancestors));
        info!(
            "Deleted property {} ({} node{} removed, purge={})",
            id,
            doomed.len(),
            if doomed.len() == 1 { "" } else { "s" },
            purge
        );
        Ok(true)
    }

    /// One page of flat records, searched, filtered and sorted
    pub async fn list(&self, query: &ListQuery) -> Result<PagedResult<Property>> {
        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM (");
        count_qb.push(FLAT_SELECT);
        push_conditions(&mut count_qb, query);
        count_qb.push(")");
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let pagination = calculate_pagination(total, query.page, query.page_size);

        let mut qb = QueryBuilder::<Sqlite>::new(FLAT_SELECT);
        push_conditions(&mut qb, query);
        qb.push(order_clause(query.sort_key(), query.sort_dir()));
        qb.push(" LIMIT ");
        qb.push_bind(pagination.page_size);
        qb.push(" OFFSET ");
        qb.push_bind(pagination.offset);

        let items = qb
            .build_query_as::<Property>()
            .fetch_all(&self.pool)
            .await?;

        debug!(
            "Property list page {}/{}: {} of {} rows",
            pagination.page,
            pagination.total_pages,
            items.len(),
            total
        );
        Ok(PagedResult::new(items, pagination, total))
    }

    /// Every property, flat, in default order
    pub async fn available(&self) -> Result<Vec<Property>> {
        let properties = sqlx::query_as::<_, Property>(&format!("{} {}", FLAT_SELECT, DEFAULT_ORDER))
            .fetch_all(&self.pool)
            .await?;
        Ok(properties)
    }

    /// Properties whose value or category contains `search`
    ///
    /// Blank search yields nothing.
    pub async fn suggest(&self, search: &str, limit: i64) -> Result<Vec<Property>> {
        let search = search.trim();
        if search.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", search);
        let properties = sqlx::query_as::<_, Property>(&format!(
            "{} WHERE p.value LIKE ? OR c.value LIKE ? {} LIMIT ?",
            FLAT_SELECT, DEFAULT_ORDER
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(properties)
    }
}

/// Fails when a sibling other than `id` already carries `value`
async fn ensure_unique(
    conn: &mut SqliteConnection,
    id: Option<i64>,
    parent: Option<i64>,
    value: &str,
) -> Result<()> {
    let clashes: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM properties WHERE COALESCE(parent, 0) = ? AND value = ? LIMIT 2",
    )
    .bind(parent.unwrap_or(0))
    .bind(value)
    .fetch_all(&mut *conn)
    .await?;

    let unique = match clashes.as_slice() {
        [] => true,
        [only] => Some(*only) == id,
        _ => false,
    };
    if unique {
        Ok(())
    } else {
        Err(Error::validation("value", DUPLICATE_VALUE))
    }
}

/// `root` and all its descendants, children before parents
async fn subtree_post_order(conn: &mut SqliteConnection, root: i64) -> Result<Vec<i64>> {
    let mut pre_order = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            warn!("Property {} reached twice while collecting a subtree", id);
            continue;
        }
        pre_order.push(id);
        let children: Vec<i64> = sqlx::query_scalar("SELECT id FROM properties WHERE parent = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
        stack.extend(children);
    }

    // Reversed pre-order visits every child before its parent
    pre_order.reverse();
    Ok(pre_order)
}

/// Unique index violations that slipped past [`ensure_unique`] under a race
fn map_unique_violation(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::validation("value", DUPLICATE_VALUE)
        }
        _ => Error::Database(err),
    }
}
