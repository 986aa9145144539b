//! # Materials Library Common
//!
//! Shared code for the materials library services including:
//! - Database schema bootstrap and row models
//! - Property (tag) store, tree builder and filter compiler
//! - Process-wide cache used for materialized tag subtrees
//! - Material listing and material/tag assignment
//! - Configuration loading

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod material;
pub mod pagination;
pub mod property;

pub use cache::{Cache, CacheKey};
pub use error::{Error, FieldErrors, Result};
pub use material::{MaterialQuery, MaterialStore};
pub use property::{
    AssignmentStore, FilterCompiler, FilterMatch, FilterSelection, PropertyStore, TreeBuilder,
};
