//! Service layer for the sitemap generator.
//!
//! - Keyset pagination over catalog scopes (`CatalogCursorReader`)
//! - Category/subcategory discovery (`HierarchyEnumerator`)

mod cursor;
mod hierarchy;

pub use cursor::{CatalogCursorReader, CursorPage, ScopeStream};
pub use hierarchy::{CategoryPairs, HierarchyEnumerator, build_hierarchy, fallback_hierarchy};
