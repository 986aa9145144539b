//! Admin tag browser: category tree, paged table and single subtrees

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use matlib_common::db::Property;
use matlib_common::pagination::PagedResult;
use matlib_common::property::ListQuery;
use matlib_common::FilterSelection;

use super::ApiError;
use crate::AppState;

/// Query parameters of the tag table
#[derive(Debug, Default, Deserialize)]
pub struct TagListParams {
    /// Page number (1-indexed)
    pub page: Option<i64>,
    pub sort: Option<String>,
    #[serde(rename = "sortDir")]
    pub sort_dir: Option<String>,
    pub search: Option<String>,
    /// JSON-encoded `{or, and}` selection
    pub filters: Option<String>,
}

/// GET /admin/tag
pub async fn category_tree(State(state): State<AppState>) -> Result<Json<Property>, ApiError> {
    Ok(Json(state.tree.categories().await?))
}

/// GET /admin/tag/list
pub async fn list_tags(
    State(state): State<AppState>,
    Query(params): Query<TagListParams>,
) -> Result<Json<PagedResult<Property>>, ApiError> {
    let filters = match params.filters.as_deref() {
        Some(raw) => FilterSelection::from_json(raw)?,
        None => FilterSelection::default(),
    };

    let query = ListQuery {
        page: params.page.unwrap_or(1),
        page_size: state.page_size,
        sort: params.sort,
        sort_dir: params.sort_dir,
        search: params.search,
        filters,
    };
    Ok(Json(state.properties.list(&query).await?))
}

/// GET /admin/tag/:id/tree
pub async fn tag_subtree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Property>, ApiError> {
    state
        .tree
        .subtree(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Tag {} not found", id)))
}
