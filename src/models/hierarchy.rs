// src/models/hierarchy.rs

//! Category and subcategory tree for one manufacturer.

use serde::{Deserialize, Serialize};

use crate::models::Scope;

/// A top-level catalog category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Name as stored in the catalog
    pub name: String,

    /// URL-safe identifier, unique among categories of the manufacturer
    pub slug: String,

    pub subcategories: Vec<Subcategory>,
}

impl Category {
    /// Find a subcategory by its catalog name.
    pub fn subcategory(&self, name: &str) -> Option<&Subcategory> {
        self.subcategories.iter().find(|s| s.name == name)
    }
}

/// A subcategory within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    pub name: String,

    /// URL-safe identifier, unique among siblings
    pub slug: String,

    /// Parent category name
    pub category: String,

    /// Parent category slug
    pub category_slug: String,

    /// Count-only query result; diagnostics and planning only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<u64>,

    /// Rows seen for this subcategory while enumerating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_enumerated: Option<u64>,

    /// Stored `(category, subcategory)` values that trim to this node, when
    /// they differ from the trimmed names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_names: Vec<(String, String)>,
}

impl Subcategory {
    /// Scopes that together cover every part of this subcategory.
    pub fn scopes(&self, manufacturer: &str) -> Vec<Scope> {
        if self.source_names.is_empty() {
            return vec![Scope::subcategory(manufacturer, &self.category, &self.name)];
        }
        self.source_names
            .iter()
            .map(|(category, subcategory)| Scope::subcategory(manufacturer, category, subcategory))
            .collect()
    }
}

/// Either level of the hierarchy, borrowed from a [`Hierarchy`].
#[derive(Debug, Clone, Copy)]
pub enum HierarchyNode<'a> {
    Category(&'a Category),
    Subcategory(&'a Category, &'a Subcategory),
}

impl HierarchyNode<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Category(c) => &c.name,
            Self::Subcategory(_, s) => &s.name,
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Self::Category(c) => &c.slug,
            Self::Subcategory(_, s) => &s.slug,
        }
    }
}

/// Where a hierarchy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyOrigin {
    /// Enumerated from the data source
    Live,
    /// Taken from the configured offline fallback
    Fallback,
}

/// How a slug collision between siblings was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugConflict {
    /// Parent category name, `None` for top-level categories
    pub parent: Option<String>,

    /// The contested slug (empty if the names slugged to nothing)
    pub slug: String,

    /// Every source name that produced the slug, sorted
    pub names: Vec<String>,

    /// Names that were dropped from the tree because of the conflict
    pub skipped: Vec<String>,
}

/// The discovered tree for one manufacturer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    pub manufacturer: String,

    pub manufacturer_slug: String,

    /// Categories sorted by slug
    pub categories: Vec<Category>,

    pub origin: HierarchyOrigin,

    /// Enumeration stopped at the row ceiling; some values may be missing
    pub truncated: bool,

    /// Rows read while enumerating
    pub rows_scanned: usize,

    /// Rows ignored because category or subcategory was blank
    pub blank_rows: usize,

    pub conflicts: Vec<SlugConflict>,
}

impl Hierarchy {
    /// Look up a category by its catalog name.
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// All nodes, categories first within each category group.
    pub fn nodes(&self) -> impl Iterator<Item = HierarchyNode<'_>> {
        self.categories.iter().flat_map(|c| {
            std::iter::once(HierarchyNode::Category(c)).chain(
                c.subcategories
                    .iter()
                    .map(move |s| HierarchyNode::Subcategory(c, s)),
            )
        })
    }

    pub fn subcategory_count(&self) -> usize {
        self.categories.iter().map(|c| c.subcategories.len()).sum()
    }

    /// Sum of the known subcategory counts.
    pub fn estimated_entities(&self) -> u64 {
        self.categories
            .iter()
            .flat_map(|c| &c.subcategories)
            .filter_map(|s| s.entity_count)
            .sum()
    }
}
