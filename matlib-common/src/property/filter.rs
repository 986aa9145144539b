//! Compile a tag selection into the set of matching materials
//!
//! A selection is any number of OR-groups plus one AND-set. Every entry,
//! in either shape, matches a material tagged with that property or with any
//! property whose parent is that entry, so selecting a tag selects all of its
//! values. Groups and AND entries are intersected against the full material
//! universe.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::listing::push_id_list;
use crate::{Error, Result};

/// Id that no material ever has, used by [`FilterMatch::to_id_list`] to
/// encode "match nothing" for consumers that read an empty list as "match
/// everything"
pub const NO_MATCH_SENTINEL: i64 = 0;

/// User filter selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSelection {
    /// A material must match at least one id of every group
    pub or: Vec<Vec<i64>>,
    /// A material must match every id
    pub and: Vec<i64>,
}

impl FilterSelection {
    /// True when nothing restricts the result; empty groups do not count
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.iter().all(Vec::is_empty)
    }

    /// Non-empty OR-groups
    pub fn or_groups(&self) -> impl Iterator<Item = &[i64]> {
        self.or.iter().map(Vec::as_slice).filter(|g| !g.is_empty())
    }

    /// Parse the JSON form sent by listing pages
    ///
    /// Blank input is an empty selection.
    pub fn from_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
            .map_err(|e| Error::InvalidInput(format!("Malformed filter selection: {}", e)))
    }
}

/// Outcome of compiling a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterMatch {
    /// No restriction was requested
    Unrestricted,
    /// Exactly these materials match; never empty
    Ids(BTreeSet<i64>),
    /// A restriction was requested and no material satisfies it
    MatchesNothing,
}

impl FilterMatch {
    pub fn allows(&self, material_id: i64) -> bool {
        match self {
            FilterMatch::Unrestricted => true,
            FilterMatch::Ids(ids) => ids.contains(&material_id),
            FilterMatch::MatchesNothing => false,
        }
    }

    pub fn ids(&self) -> Option<&BTreeSet<i64>> {
        match self {
            FilterMatch::Ids(ids) => Some(ids),
            _ => None,
        }
    }

    /// Legacy id-list encoding
    ///
    /// `None` means no restriction. "Match nothing" becomes
    /// `[NO_MATCH_SENTINEL]`, never an empty list.
    pub fn to_id_list(&self) -> Option<Vec<i64>> {
        match self {
            FilterMatch::Unrestricted => None,
            FilterMatch::Ids(ids) => Some(ids.iter().copied().collect()),
            FilterMatch::MatchesNothing => Some(vec![NO_MATCH_SENTINEL]),
        }
    }
}

/// Turns a [`FilterSelection`] into a [`FilterMatch`]
#[derive(Debug, Clone)]
pub struct FilterCompiler {
    pool: SqlitePool,
}

impl FilterCompiler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Query failures propagate; there is no partial result.
    pub async fn compile(&self, selection: &FilterSelection) -> Result<FilterMatch> {
        if selection.is_empty() {
            return Ok(FilterMatch::Unrestricted);
        }

        let universe: Vec<i64> = sqlx::query_scalar("SELECT id FROM materials")
            .fetch_all(&self.pool)
            .await?;
        let mut candidates: BTreeSet<i64> = universe.into_iter().collect();

        let groups = selection
            .or_groups()
            .map(<[i64]>::to_vec)
            .chain(selection.and.iter().map(|id| vec![*id]));

        for group in groups {
            if candidates.is_empty() {
                break;
            }
            let matching = self.materials_matching_any(&group).await?;
            candidates.retain(|id| matching.contains(id));
            debug!(
                "Filter group {:?} leaves {} candidate materials",
                group,
                candidates.len()
            );
        }

        if candidates.is_empty() {
            Ok(FilterMatch::MatchesNothing)
        } else {
            Ok(FilterMatch::Ids(candidates))
        }
    }

    /// Materials tagged with any of `ids` or with a child of any of `ids`
    async fn materials_matching_any(&self, ids: &[i64]) -> Result<BTreeSet<i64>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT mp.material_id FROM material_property mp \
             JOIN properties p ON p.id = mp.property_id \
             WHERE p.id IN ",
        );
        push_id_list(&mut qb, ids);
        qb.push(" OR p.parent IN ");
        push_id_list(&mut qb, ids);

        let rows: Vec<i64> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().collect())
    }
}
