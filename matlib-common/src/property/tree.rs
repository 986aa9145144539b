//! Nested property trees
//!
//! On a cache miss every property is loaded once into an arena indexed by
//! parent, and the requested subtree is assembled top-down from it. Each
//! fully assembled node is cached under its id so later requests for any
//! part of the tree skip the database entirely.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::{PropertyCache, PROPERTY_NAMESPACE, TREE_KEY};
use crate::db::Property;
use crate::Result;

/// Label of the synthetic root above all tags
pub const ROOT_LABEL: &str = "Categories";

/// Default limit on how many levels below the requested root are assembled
pub const DEFAULT_MAX_DEPTH: usize = 64;

const ARENA_SELECT: &str = "SELECT p.id, p.parent, p.value, p.priority, p.description, \
     COALESCE(u.usage, 0) AS usage \
     FROM properties p \
     LEFT JOIN (SELECT property_id, COUNT(id) AS usage FROM material_property GROUP BY property_id) u \
     ON u.property_id = p.id \
     ORDER BY p.priority DESC, p.value ASC, p.id ASC";

/// Every property by id, plus ordered child ids per parent (0 for tags)
struct Arena {
    nodes: HashMap<i64, Property>,
    children: HashMap<i64, Vec<i64>>,
}

impl Arena {
    async fn load(pool: &SqlitePool) -> Result<Self> {
        let rows = sqlx::query_as::<_, Property>(ARENA_SELECT)
            .fetch_all(pool)
            .await?;

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for row in &rows {
            children.entry(row.parent.unwrap_or(0)).or_default().push(row.id);
        }
        let nodes = rows.into_iter().map(|row| (row.id, row)).collect();

        Ok(Self { nodes, children })
    }

    fn children_of(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone)]
pub struct TreeBuilder {
    pool: SqlitePool,
    cache: Arc<PropertyCache>,
    max_depth: usize,
}

impl TreeBuilder {
    pub fn new(pool: SqlitePool, cache: Arc<PropertyCache>) -> Self {
        Self {
            pool,
            cache,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Fresh arena for a cold build; stale cache entries go first
    async fn load_arena(&self) -> Result<Arena> {
        let purged = self.cache.purge_expired();
        if purged > 0 {
            debug!("Dropped {} expired tree entries", purged);
        }
        Arena::load(&self.pool).await
    }

    /// The synthetic "Categories" root with every tag below it
    pub async fn categories(&self) -> Result<Property> {
        if let Some(tree) = self.cache.get(TREE_KEY, PROPERTY_NAMESPACE) {
            debug!("Category tree served from cache");
            return Ok(tree);
        }

        let arena = self.load_arena().await?;
        let (tree, complete) = self.assemble_from(&arena, Property::synthetic_root(ROOT_LABEL));
        if complete {
            self.cache.set(TREE_KEY, PROPERTY_NAMESPACE, tree.clone(), None);
        }
        Ok(tree)
    }

    /// `root` with its whole subtree under `children`
    ///
    /// A root with id 0 is treated as the category root.
    pub async fn build(&self, root: Property) -> Result<Property> {
        if root.id == 0 {
            let mut tree = self.categories().await?;
            tree.value = root.value;
            return Ok(tree);
        }
        if let Some(cached) = self.cache.get(root.id, PROPERTY_NAMESPACE) {
            return Ok(cached);
        }

        let arena = self.load_arena().await?;
        Ok(self.assemble_and_cache(&arena, root))
    }

    /// Stored property `id` with its subtree, `None` when absent
    pub async fn subtree(&self, id: i64) -> Result<Option<Property>> {
        if id == 0 {
            return self.categories().await.map(Some);
        }
        if let Some(cached) = self.cache.get(id, PROPERTY_NAMESPACE) {
            return Ok(Some(cached));
        }

        let arena = self.load_arena().await?;
        Ok(arena
            .nodes
            .get(&id)
            .cloned()
            .map(|node| self.assemble_and_cache(&arena, node)))
    }

    /// Category tree reduced to the properties in `ids` and their ancestors
    pub async fn filtered(&self, ids: &BTreeSet<i64>) -> Result<Property> {
        let mut tree = self.categories().await?;
        let children = tree.children.take().unwrap_or_default();
        tree.children = Some(
            children
                .into_iter()
                .filter_map(|child| prune(child, ids))
                .collect(),
        );
        Ok(tree)
    }

    fn assemble_and_cache(&self, arena: &Arena, root: Property) -> Property {
        let id = root.id;
        let (node, complete) = self.assemble_from(arena, root);
        if complete {
            self.cache.set(id, PROPERTY_NAMESPACE, node.clone(), None);
        }
        node
    }

    fn assemble_from(&self, arena: &Arena, root: Property) -> (Property, bool) {
        let mut visited = HashSet::from([root.id]);
        self.assemble(arena, root, 0, &mut visited)
    }

    /// Returns the node and whether its subtree is complete. Incomplete
    /// subtrees (depth cap, revisited ids) are never cached.
    fn assemble(
        &self,
        arena: &Arena,
        mut node: Property,
        depth: usize,
        visited: &mut HashSet<i64>,
    ) -> (Property, bool) {
        let child_ids = arena.children_of(node.id);
        if depth >= self.max_depth && !child_ids.is_empty() {
            warn!(
                "Property tree deeper than {} levels, truncated at {}",
                self.max_depth, node.id
            );
            node.children = Some(Vec::new());
            return (node, false);
        }

        let mut complete = true;
        let mut children = Vec::with_capacity(child_ids.len());

        for &child_id in child_ids {
            if !visited.insert(child_id) {
                warn!("Property {} reached twice while building a tree, skipped", child_id);
                complete = false;
                continue;
            }
            if let Some(cached) = self.cache.get(child_id, PROPERTY_NAMESPACE) {
                children.push(cached);
                continue;
            }
            let Some(child) = arena.nodes.get(&child_id).cloned() else {
                continue;
            };

            let (child, child_complete) = self.assemble(arena, child, depth + 1, visited);
            if child_complete {
                self.cache
                    .set(child_id, PROPERTY_NAMESPACE, child.clone(), None);
            } else {
                complete = false;
            }
            children.push(child);
        }

        node.children = Some(children);
        (node, complete)
    }
}

/// `node` if it or any descendant is in `ids`, keeping only such children
fn prune(mut node: Property, ids: &BTreeSet<i64>) -> Option<Property> {
    let children: Vec<Property> = node
        .children
        .take()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|child| prune(child, ids))
        .collect();

    if children.is_empty() && !ids.contains(&node.id) {
        return None;
    }
    node.children = Some(children);
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, children: Vec<Property>) -> Property {
        let mut property = Property::synthetic_root(&format!("node {}", id));
        property.id = id;
        property.children = Some(children);
        property
    }

    #[test]
    fn test_prune_keeps_ancestors_of_selected() {
        let tag = node(1, vec![node(2, vec![]), node(3, vec![node(4, vec![])])]);
        let ids = BTreeSet::from([4]);

        let pruned = prune(tag, &ids).unwrap();
        let kept: Vec<i64> = pruned.children().iter().map(|c| c.id).collect();
        assert_eq!(kept, vec![3]);
        assert_eq!(pruned.children()[0].children()[0].id, 4);
    }

    #[test]
    fn test_prune_drops_unselected_branch() {
        let tag = node(1, vec![node(2, vec![])]);
        assert!(prune(tag, &BTreeSet::from([9])).is_none());
    }
}
