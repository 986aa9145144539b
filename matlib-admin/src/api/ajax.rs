//! AJAX endpoints of the tag editor

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use matlib_common::db::Property;
use matlib_common::property::{AssignmentChange, PropertyForm};

use super::ApiError;
use crate::AppState;

/// Most suggestions returned for one search
pub const SUGGESTION_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub search: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    /// Also delete nested values and ignore usage
    #[serde(default)]
    pub purge: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub properties: Vec<i64>,
}

/// POST /admin/ajax/tag
///
/// Inserts when `id` is absent, updates otherwise. Responds with the flat
/// stored record. A body that does not fit the form is a 400 like any other
/// validation failure.
pub async fn save_tag(
    State(state): State<AppState>,
    form: Result<Json<PropertyForm>, JsonRejection>,
) -> Result<Json<Property>, ApiError> {
    let Json(form) = form?;
    let draft = form.validate()?;
    let saved = state.properties.save(draft).await?;
    Ok(Json(saved))
}

/// GET /admin/ajax/tag/all
pub async fn all_tags(State(state): State<AppState>) -> Result<Json<Vec<Property>>, ApiError> {
    Ok(Json(state.properties.available().await?))
}

/// GET /admin/ajax/tag/suggestions
pub async fn tag_suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Vec<Property>>, ApiError> {
    Ok(Json(
        state
            .properties
            .suggest(&params.search, SUGGESTION_LIMIT)
            .await?,
    ))
}

/// GET /admin/ajax/tag/:id
pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Property>, ApiError> {
    state
        .properties
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Tag {} not found", id)))
}

/// DELETE /admin/ajax/tag/:id
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Value>, ApiError> {
    if !state.properties.delete(id, params.purge).await? {
        return Err(ApiError::not_found(format!("Tag {} not found", id)));
    }
    Ok(Json(json!({ "deleted": true })))
}

/// PUT /admin/ajax/material/:id/tags
pub async fn assign_tags(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
    request: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<Json<AssignmentChange>, ApiError> {
    let Json(request) = request?;
    let change = state
        .assignments
        .assign(material_id, &request.properties)
        .await?;
    if change.is_empty() {
        info!("Material {} tags unchanged", material_id);
    }
    Ok(Json(change))
}
