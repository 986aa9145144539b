//! Flat, paged property listing for the admin tag table

use sqlx::{QueryBuilder, Sqlite};

use super::filter::FilterSelection;

/// Whitelisted sort columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Parent,
    Value,
    Priority,
    Description,
    Category,
    Usage,
}

impl SortKey {
    /// Parse a user-supplied sort name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "id" => Some(SortKey::Id),
            "parent" | "tag" => Some(SortKey::Parent),
            "value" => Some(SortKey::Value),
            "priority" => Some(SortKey::Priority),
            "description" => Some(SortKey::Description),
            "category" => Some(SortKey::Category),
            "usage" => Some(SortKey::Usage),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortKey::Id => "p.id",
            SortKey::Parent => "p.parent",
            SortKey::Value => "p.value",
            SortKey::Priority => "p.priority",
            SortKey::Description => "p.description",
            SortKey::Category => "c.value",
            SortKey::Usage => "usage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    /// `asc` in any case means ascending, anything else descending
    pub fn parse(dir: &str) -> Self {
        if dir.trim().eq_ignore_ascii_case("asc") {
            SortDir::Asc
        } else {
            SortDir::Desc
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Parameters of a paged property listing
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// 1-indexed, clamped into range
    pub page: i64,
    /// Non-positive means the default page size
    pub page_size: i64,
    pub sort: Option<String>,
    pub sort_dir: Option<String>,
    pub search: Option<String>,
    /// Rows matching any listed id, or whose parent is listed
    pub filters: FilterSelection,
}

impl ListQuery {
    pub fn sort_key(&self) -> SortKey {
        self.sort
            .as_deref()
            .and_then(SortKey::parse)
            .unwrap_or(SortKey::Priority)
    }

    pub fn sort_dir(&self) -> SortDir {
        self.sort_dir
            .as_deref()
            .map(SortDir::parse)
            .unwrap_or(SortDir::Desc)
    }

    fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s))
    }
}

/// ORDER BY with the primary key first, then the fixed tiebreakers
///
/// Each tiebreaker is skipped when it is already the primary sort.
pub(crate) fn order_clause(key: SortKey, dir: SortDir) -> String {
    let mut clauses = vec![format!("{} {}", key.column(), dir.sql())];
    let tiebreakers = [
        (SortKey::Priority, SortDir::Desc),
        (SortKey::Parent, SortDir::Asc),
        (SortKey::Value, SortDir::Asc),
        (SortKey::Id, SortDir::Asc),
    ];
    for (tiebreaker, tiebreaker_dir) in tiebreakers {
        if tiebreaker != key {
            clauses.push(format!("{} {}", tiebreaker.column(), tiebreaker_dir.sql()));
        }
    }
    format!(" ORDER BY {}", clauses.join(", "))
}

/// Append the WHERE clause for `query` (search AND any-of filters)
///
/// Expects `properties p` joined with its parent as `c`.
pub(crate) fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, query: &ListQuery) {
    let mut has_where = false;

    if let Some(pattern) = query.search_pattern() {
        qb.push(" WHERE (p.value LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR c.value LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
        has_where = true;
    }

    let groups: Vec<&[i64]> = query
        .filters
        .or_groups()
        .chain(Some(query.filters.and.as_slice()).filter(|ids| !ids.is_empty()))
        .collect();
    if groups.is_empty() {
        return;
    }

    qb.push(if has_where { " AND (" } else { " WHERE (" });
    for (i, ids) in groups.into_iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push("p.id IN ");
        push_id_list(qb, ids);
        qb.push(" OR p.parent IN ");
        push_id_list(qb, ids);
    }
    qb.push(")");
}

/// `(?, ?, ...)` with each id bound
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sort_is_priority_desc() {
        let query = ListQuery::default();
        assert_eq!(query.sort_key(), SortKey::Priority);
        assert_eq!(query.sort_dir(), SortDir::Desc);
        assert_eq!(
            order_clause(query.sort_key(), query.sort_dir()),
            " ORDER BY p.priority DESC, p.parent ASC, p.value ASC, p.id ASC"
        );
    }

    #[test]
    fn test_primary_sort_not_repeated() {
        assert_eq!(
            order_clause(SortKey::Value, SortDir::Asc),
            " ORDER BY p.value ASC, p.priority DESC, p.parent ASC, p.id ASC"
        );
        assert_eq!(
            order_clause(SortKey::Usage, SortDir::Desc),
            " ORDER BY usage DESC, p.priority DESC, p.parent ASC, p.value ASC, p.id ASC"
        );
    }

    #[test]
    fn test_unknown_sort_falls_back() {
        let query = ListQuery {
            sort: Some("password; DROP TABLE".to_string()),
            sort_dir: Some("AsC".to_string()),
            ..Default::default()
        };
        assert_eq!(query.sort_key(), SortKey::Priority);
        assert_eq!(query.sort_dir(), SortDir::Asc);
    }

    #[test]
    fn test_conditions_sql() {
        let query = ListQuery {
            search: Some(" math ".to_string()),
            filters: FilterSelection {
                or: vec![vec![1, 2], vec![]],
                and: vec![3],
            },
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM properties p");
        push_conditions(&mut qb, &query);

        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM properties p WHERE (p.value LIKE ? OR c.value LIKE ?) AND \
             (p.id IN (?, ?) OR p.parent IN (?, ?) OR p.id IN (?) OR p.parent IN (?))"
        );
    }
}
