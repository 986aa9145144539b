//! Edit boundary for properties
//!
//! [`PropertyForm`] is what the admin editor submits. Validation collects
//! every field problem at once before anything touches the database.

use serde::Deserialize;

use crate::error::FieldErrors;
use crate::Result;

pub const MIN_PRIORITY: i64 = -25;
pub const MAX_PRIORITY: i64 = 100;

/// Raw editor submission
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyForm {
    /// Absent or empty for a new property
    #[serde(default)]
    pub id: Option<i64>,
    /// Parent id, 0 for a top-level tag
    pub tag: i64,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
}

/// Validated property ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDraft {
    /// `None` inserts, `Some` updates
    pub id: Option<i64>,
    /// `None` for a top-level tag
    pub parent: Option<i64>,
    pub value: String,
    pub priority: i64,
    pub description: Option<String>,
}

impl PropertyDraft {
    /// New top-level tag or value with default priority
    pub fn new(parent: Option<i64>, value: impl Into<String>) -> Self {
        Self {
            id: None,
            parent: parent.filter(|p| *p != 0),
            value: value.into(),
            priority: 0,
            description: None,
        }
    }
}

impl PropertyForm {
    pub fn validate(self) -> Result<PropertyDraft> {
        let mut errors = FieldErrors::new();

        if let Some(id) = self.id {
            if id < 0 {
                errors.add("id", "Given id is not valid");
            }
        }
        if self.tag < 0 {
            errors.add("tag", "Tag must be a natural number");
        }

        let value = self.value.trim().to_string();
        if value.is_empty() {
            errors.add("value", "Expected non-empty string");
        }

        let priority = self.priority.unwrap_or(0);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            errors.add(
                "priority",
                format!("Priority must be between {} and {}", MIN_PRIORITY, MAX_PRIORITY),
            );
        }

        errors.into_result()?;

        Ok(PropertyDraft {
            id: self.id.filter(|id| *id != 0),
            parent: Some(self.tag).filter(|tag| *tag != 0),
            value,
            priority,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn form(tag: i64, value: &str) -> PropertyForm {
        PropertyForm {
            tag,
            value: value.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_form_normalizes() {
        let draft = PropertyForm {
            id: Some(0),
            description: Some("   ".to_string()),
            priority: Some(100),
            ..form(0, "  Subject ")
        }
        .validate()
        .unwrap();

        assert_eq!(draft.id, None);
        assert_eq!(draft.parent, None);
        assert_eq!(draft.value, "Subject");
        assert_eq!(draft.priority, 100);
        assert_eq!(draft.description, None);
    }

    #[test]
    fn test_all_errors_collected() {
        let err = PropertyForm {
            priority: Some(-26),
            ..form(-1, "")
        }
        .validate()
        .unwrap_err();

        match err {
            Error::Validation(errors) => {
                assert!(errors.contains("tag"));
                assert!(errors.contains("value"));
                assert!(errors.contains("priority"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_priority_bounds_inclusive() {
        assert!(PropertyForm { priority: Some(-25), ..form(3, "x") }.validate().is_ok());
        assert!(PropertyForm { priority: Some(101), ..form(3, "x") }.validate().is_err());
    }
}
