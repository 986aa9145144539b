//! Material listing restricted by tag filters

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::db::{Material, MaterialStatus};
use crate::pagination::{calculate_pagination, PagedResult};
use crate::property::listing::push_id_list;
use crate::property::{FilterCompiler, FilterSelection};
use crate::{Error, Result};

const MATERIAL_COLUMNS: &str =
    "id, status, title, views, rating, rating_count, published_at, updated_at";

/// Parameters of a paged material listing
#[derive(Debug, Clone, Default)]
pub struct MaterialQuery {
    /// Substring of the title
    pub search: Option<String>,
    pub filters: FilterSelection,
    /// Hide drafts
    pub published_only: bool,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Clone)]
pub struct MaterialStore {
    pool: SqlitePool,
    compiler: FilterCompiler,
}

impl MaterialStore {
    pub fn new(pool: SqlitePool) -> Self {
        let compiler = FilterCompiler::new(pool.clone());
        Self { pool, compiler }
    }

    pub fn compiler(&self) -> &FilterCompiler {
        &self.compiler
    }

    /// Published materials get `published_at` set to now
    pub async fn create(&self, title: &str, status: MaterialStatus) -> Result<Material> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation("title", "Expected non-empty string"));
        }

        let published_at = match status {
            MaterialStatus::Published => Some(chrono::Utc::now().naive_utc()),
            MaterialStatus::Draft => None,
        };
        let id = sqlx::query("INSERT INTO materials (status, title, published_at) VALUES (?, ?, ?)")
            .bind(status)
            .bind(title)
            .bind(published_at)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        info!("Created material {} ({:?})", id, status);
        self.find(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Material {} vanished after insert", id)))
    }

    pub async fn find(&self, id: i64) -> Result<Option<Material>> {
        let material = sqlx::query_as::<_, Material>(&format!(
            "SELECT {} FROM materials WHERE id = ?",
            MATERIAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(material)
    }

    /// Newest first: published, then updated, then rating
    pub async fn list(&self, query: &MaterialQuery) -> Result<PagedResult<Material>> {
        let restriction = self.compiler.compile(&query.filters).await?.to_id_list();
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(id) FROM materials");
        push_conditions(
            &mut count_qb,
            query.published_only,
            search.as_deref(),
            restriction.as_deref(),
        );
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let pagination = calculate_pagination(total, query.page, query.page_size);

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM materials", MATERIAL_COLUMNS));
        push_conditions(
            &mut qb,
            query.published_only,
            search.as_deref(),
            restriction.as_deref(),
        );
        qb.push(" ORDER BY published_at DESC, updated_at DESC, rating DESC, id DESC LIMIT ");
        qb.push_bind(pagination.page_size);
        qb.push(" OFFSET ");
        qb.push_bind(pagination.offset);

        let items = qb
            .build_query_as::<Material>()
            .fetch_all(&self.pool)
            .await?;

        debug!(
            "Material list page {}/{}: {} of {} rows",
            pagination.page,
            pagination.total_pages,
            items.len(),
            total
        );
        Ok(PagedResult::new(items, pagination, total))
    }
}

fn push_conditions(
    qb: &mut QueryBuilder<'_, Sqlite>,
    published_only: bool,
    title_pattern: Option<&str>,
    restriction: Option<&[i64]>,
) {
    qb.push(" WHERE 1 = 1");
    if published_only {
        qb.push(" AND status = ");
        qb.push_bind(MaterialStatus::Published);
    }
    if let Some(pattern) = title_pattern {
        qb.push(" AND title LIKE ");
        qb.push_bind(pattern.to_string());
    }
    if let Some(ids) = restriction {
        qb.push(" AND id IN ");
        push_id_list(qb, ids);
    }
}
