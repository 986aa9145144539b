//! Property (tag) tree: persistence, tree materialization, filter compilation
//!
//! A property with no parent is a tag (category); its children are values
//! under that tag. Materialized subtrees are cached per property id in the
//! `property` namespace, plus one `tree` entry for the whole category tree.
//! Any structural change invalidates the changed node, all its ancestors and
//! the `tree` entry; unrelated subtrees stay cached.

pub mod assignment;
pub mod filter;
pub mod form;
pub mod listing;
pub mod store;
pub mod tree;

pub use assignment::{AssignmentChange, AssignmentStore};
pub use filter::{FilterCompiler, FilterMatch, FilterSelection, NO_MATCH_SENTINEL};
pub use form::{PropertyDraft, PropertyForm};
pub use listing::{ListQuery, SortDir, SortKey};
pub use store::PropertyStore;
pub use tree::{TreeBuilder, ROOT_LABEL};

use std::collections::HashSet;

use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheKey};
use crate::db::Property;
use crate::Result;

/// Cache namespace for materialized property subtrees
pub const PROPERTY_NAMESPACE: &str = "property";

/// Cache key of the whole category tree
pub const TREE_KEY: CacheKey = CacheKey::Named("tree");

/// Cache shared by everything that reads or mutates properties
pub type PropertyCache = Cache<Property>;

/// Flat property row with its category (parent value) and usage count
pub(crate) const FLAT_SELECT: &str = "SELECT p.id, p.parent, p.value, p.priority, p.description, \
     c.value AS category, COALESCE(u.usage, 0) AS usage \
     FROM properties p \
     LEFT JOIN properties c ON c.id = p.parent \
     LEFT JOIN (SELECT property_id, COUNT(id) AS usage FROM material_property GROUP BY property_id) u \
     ON u.property_id = p.id";

/// Default ordering of property rows
pub(crate) const DEFAULT_ORDER: &str =
    "ORDER BY p.priority DESC, p.parent ASC, p.value ASC, p.id ASC";

/// Drop the cached subtrees of `ids` and the whole-tree entry
///
/// Callers pass the changed node together with its ancestor chain.
pub fn invalidate_lineage(cache: &PropertyCache, ids: impl IntoIterator<Item = i64>) {
    let mut dropped = Vec::new();
    for id in ids {
        if cache.delete(id, PROPERTY_NAMESPACE) {
            dropped.push(id);
        }
    }
    cache.delete(TREE_KEY, PROPERTY_NAMESPACE);
    debug!("Invalidated cached property subtrees {:?} and the full tree", dropped);
}

/// `start` followed by each of its ancestors up to the top level
///
/// Stops at a missing row and at a repeated id, so malformed data cannot
/// loop forever.
pub(crate) async fn ancestor_chain(
    conn: &mut SqliteConnection,
    start: Option<i64>,
) -> Result<Vec<i64>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = start.filter(|id| *id != 0);

    while let Some(id) = current {
        if !seen.insert(id) {
            warn!("Property {} appears twice in its own ancestry", id);
            break;
        }
        chain.push(id);
        current = sqlx::query_scalar::<_, Option<i64>>("SELECT parent FROM properties WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();
    }

    Ok(chain)
}
