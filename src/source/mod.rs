//! Read collaborator: the hosted catalog data API.
//!
//! The generator needs exactly three read operations from the catalog:
//!
//! - paged entity listing filtered by manufacturer/category/subcategory,
//!   ordered by identifier and resumable from a strict "greater than" cursor
//! - paged `(identifier, category, subcategory)` rows for hierarchy discovery
//! - a count-only query for a scope
//!
//! ## Implementations
//!
//! - [`RestCatalogSource`]: PostgREST-style HTTP API (production)
//! - [`MemoryCatalog`]: in-memory snapshot, loadable from JSON (offline runs, tests)

pub mod memory;
pub mod rest;
pub mod retry;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CatalogEntity, HierarchyRow, Scope};

// Re-export for convenience
pub use memory::MemoryCatalog;
pub use rest::RestCatalogSource;
pub use retry::{Governor, RetryPolicy};

/// Trait for catalog data backends.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Up to `limit` entities of `scope` with identifier strictly greater
    /// than `after`, ordered by identifier ascending.
    async fn fetch_entities(
        &self,
        scope: &Scope,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CatalogEntity>>;

    /// Up to `limit` hierarchy rows of a manufacturer after `after`, ordered by identifier.
    async fn fetch_hierarchy_rows(
        &self,
        manufacturer: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HierarchyRow>>;

    /// Number of entities in `scope`, or `None` when the backend cannot tell.
    async fn count(&self, scope: &Scope) -> Result<Option<u64>>;
}
