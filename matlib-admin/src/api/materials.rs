//! Public material listing with tag filters

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use matlib_common::db::{Material, Property};
use matlib_common::pagination::PagedResult;
use matlib_common::{FilterSelection, MaterialQuery};

use super::ApiError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MaterialListParams {
    pub page: Option<i64>,
    pub search: Option<String>,
    /// JSON-encoded `{or, and}` selection
    pub filters: Option<String>,
}

/// GET /materials
///
/// Published materials only, restricted by the compiled tag filter.
pub async fn list_materials(
    State(state): State<AppState>,
    Query(params): Query<MaterialListParams>,
) -> Result<Json<PagedResult<Material>>, ApiError> {
    let filters = match params.filters.as_deref() {
        Some(raw) => FilterSelection::from_json(raw)?,
        None => FilterSelection::default(),
    };

    let query = MaterialQuery {
        search: params.search,
        filters,
        published_only: true,
        page: params.page.unwrap_or(1),
        page_size: state.page_size,
    };
    Ok(Json(state.materials.list(&query).await?))
}

/// GET /materials/filters
///
/// The category tree reduced to tags used by published materials.
pub async fn material_filters(State(state): State<AppState>) -> Result<Json<Property>, ApiError> {
    let used = state.assignments.used_property_ids(true).await?;
    Ok(Json(state.tree.filtered(&used).await?))
}
