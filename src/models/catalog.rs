// src/models/catalog.rs

//! Catalog rows as they come out of the data source, validated once at the boundary.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// One sellable part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntity {
    /// Display name used directly in the part URL; unique per manufacturer
    pub identifier: String,

    pub category: String,

    pub subcategory: String,

    /// Date of the last catalog edit, if the source tracks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<NaiveDate>,
}

impl CatalogEntity {
    /// Build an entity, rejecting an empty identifier.
    pub fn new(
        identifier: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
        last_modified: Option<NaiveDate>,
    ) -> Result<Self> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(AppError::validation("catalog entity has an empty identifier"));
        }
        Ok(Self {
            identifier,
            category: category.into(),
            subcategory: subcategory.into(),
            last_modified,
        })
    }
}

/// The slice of a catalog row needed to discover the hierarchy.
///
/// Names are kept exactly as stored so they can be used as read filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRow {
    /// Cursor column; not used for grouping
    pub identifier: String,
    pub category: String,
    pub subcategory: String,
}

/// A unit of catalog reads: a whole manufacturer, one category, or one subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub manufacturer: String,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

impl Scope {
    /// Every part of a manufacturer.
    pub fn manufacturer(manufacturer: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            category: None,
            subcategory: None,
        }
    }

    /// Every part of one category.
    pub fn category(manufacturer: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            category: Some(category.into()),
            subcategory: None,
        }
    }

    /// Every part of one subcategory.
    pub fn subcategory(
        manufacturer: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            category: Some(category.into()),
            subcategory: Some(subcategory.into()),
        }
    }

    /// Whether an entity belongs to this scope.
    pub fn contains(&self, manufacturer: &str, category: &str, subcategory: &str) -> bool {
        self.manufacturer == manufacturer
            && self.category.as_deref().is_none_or(|c| c == category)
            && self.subcategory.as_deref().is_none_or(|s| s == subcategory)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manufacturer)?;
        if let Some(category) = &self.category {
            write!(f, " / {category}")?;
        }
        if let Some(subcategory) = &self.subcategory {
            write!(f, " / {subcategory}")?;
        }
        Ok(())
    }
}

/// Parse a last-modified column value into a calendar date.
///
/// Accepts RFC 3339 timestamps, naive timestamps and plain `YYYY-MM-DD` dates.
pub fn parse_last_modified(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(CatalogEntity::new("  ", "Standoffs", "Brass Standoffs", None).is_err());
        assert!(CatalogEntity::new("4501-440-B", "Standoffs", "Brass Standoffs", None).is_ok());
    }

    #[test]
    fn test_scope_contains() {
        let scope = Scope::category("Amatom", "Standoffs");
        assert!(scope.contains("Amatom", "Standoffs", "Brass Standoffs"));
        assert!(!scope.contains("Amatom", "Washers", "Captive Screw Washers"));
        assert!(!scope.contains("Keystone", "Standoffs", "Brass Standoffs"));
    }

    #[test]
    fn test_scope_display() {
        let scope = Scope::subcategory("Amatom", "Standoffs", "Nylon Standoffs");
        assert_eq!(scope.to_string(), "Amatom / Standoffs / Nylon Standoffs");
    }

    #[test]
    fn test_parse_last_modified() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 14);
        assert_eq!(parse_last_modified("2025-03-14"), expected);
        assert_eq!(parse_last_modified("2025-03-14T09:26:53+00:00"), expected);
        assert_eq!(parse_last_modified("2025-03-14T09:26:53.123456"), expected);
        assert_eq!(parse_last_modified("2025-03-14 09:26:53"), expected);
        assert_eq!(parse_last_modified("yesterday"), None);
        assert_eq!(parse_last_modified(""), None);
    }
}
