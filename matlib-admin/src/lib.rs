//! matlib-admin library - tag administration and material filtering service
//!
//! Serves the admin tag editor (tree, table, AJAX editing) and the public
//! material listing with tag filters.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::fmt::MakeWriter;

use matlib_common::config::TomlConfig;
use matlib_common::property::PropertyCache;
use matlib_common::{AssignmentStore, MaterialStore, PropertyStore, TreeBuilder};

pub mod api;

/// Application state shared across HTTP handlers
///
/// Every store holds the same property cache, so a write through one is
/// visible to tree reads through another.
#[derive(Clone)]
pub struct AppState {
    pub properties: PropertyStore,
    pub tree: TreeBuilder,
    pub assignments: AssignmentStore,
    pub materials: MaterialStore,
    /// Rows per page for paged listings
    pub page_size: i64,
}

impl AppState {
    pub fn new(db: SqlitePool, config: &TomlConfig) -> Self {
        let cache = Arc::new(PropertyCache::with_default_ttl(config.cache_ttl()));

        Self {
            properties: PropertyStore::new(db.clone(), Arc::clone(&cache)),
            tree: TreeBuilder::new(db.clone(), Arc::clone(&cache))
                .with_max_depth(config.max_tree_depth),
            assignments: AssignmentStore::new(db.clone(), cache),
            materials: MaterialStore::new(db),
            page_size: config.page_size,
        }
    }
}

/// Load the TOML config with a bootstrap subscriber writing to `writer`
///
/// The service subscriber is configured from the loaded file, so messages
/// about finding the file go through this one.
pub fn load_config<W>(explicit: Option<&Path>, writer: W) -> matlib_common::Result<TomlConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(bootstrap, || TomlConfig::load_or_default(explicit))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let admin = Router::new()
        .route("/admin/tag", get(api::tags::category_tree))
        .route("/admin/tag/list", get(api::tags::list_tags))
        .route("/admin/tag/:id/tree", get(api::tags::tag_subtree))
        .route("/admin/ajax/tag", post(api::ajax::save_tag))
        .route("/admin/ajax/tag/all", get(api::ajax::all_tags))
        .route("/admin/ajax/tag/suggestions", get(api::ajax::tag_suggestions))
        .route(
            "/admin/ajax/tag/:id",
            get(api::ajax::get_tag).delete(api::ajax::delete_tag),
        )
        .route("/admin/ajax/material/:id/tags", put(api::ajax::assign_tags));

    let public = Router::new()
        .route("/materials", get(api::materials::list_materials))
        .route("/materials/filters", get(api::materials::material_filters))
        .merge(api::health_routes());

    Router::new()
        .merge(admin)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
