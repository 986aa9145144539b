//! Database models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A tag or tag value in the self-referencing category tree
///
/// `category`, `usage` and `children` are derived and never persisted.
/// `category` is filled by flat queries only; `children` only by the tree
/// builder (`None` means "not materialized", not "no children").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Property {
    pub id: i64,
    /// `None` for a top-level tag
    pub parent: Option<i64>,
    pub value: String,
    pub priority: i64,
    pub description: Option<String>,
    /// Value of the parent node
    #[sqlx(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Number of materials tagged with this property
    #[sqlx(default)]
    #[serde(default)]
    pub usage: i64,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Property>>,
}

impl Property {
    /// Unpersisted node used as the root of the category tree
    pub fn synthetic_root(value: &str) -> Self {
        Self {
            id: 0,
            parent: None,
            value: value.to_string(),
            priority: 0,
            description: None,
            category: None,
            usage: 0,
            children: None,
        }
    }

    /// True for top-level properties (tags)
    pub fn is_tag(&self) -> bool {
        self.parent.is_none()
    }

    /// Children if materialized, otherwise an empty slice
    pub fn children(&self) -> &[Property] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Publication status of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MaterialStatus {
    Published,
    Draft,
}

/// A content item that properties are attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Material {
    pub id: i64,
    pub status: MaterialStatus,
    pub title: String,
    pub views: i64,
    pub rating: f64,
    pub rating_count: i64,
    /// UTC
    pub published_at: Option<NaiveDateTime>,
    /// UTC
    pub updated_at: NaiveDateTime,
}
