// src/source/memory.rs

//! In-memory catalog snapshot.
//!
//! Serves offline runs (`generate --fixture snapshot.json`) and tests. Supports
//! fault injection and counts reads so pagination behavior can be asserted.
//!
//! ## Snapshot format
//!
//! ```json
//! {
//!   "manufacturers": {
//!     "Amatom": [
//!       { "identifier": "9908-NY", "category": "Standoffs",
//!         "subcategory": "Nylon Standoffs", "last_modified": "2025-02-01" }
//!     ]
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{CatalogEntity, HierarchyRow, Scope};
use crate::source::CatalogSource;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    manufacturers: BTreeMap<String, Vec<CatalogEntity>>,
}

/// Catalog held in memory, rows sorted by identifier.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    manufacturers: BTreeMap<String, Vec<CatalogEntity>>,
    inclusive_cursor: bool,
    failing_scopes: HashSet<(String, String)>,
    fail_hierarchy: bool,
    transient_failures: AtomicUsize,
    entity_reads: AtomicUsize,
    hierarchy_reads: AtomicUsize,
    read_log: Mutex<Vec<(Scope, Option<String>)>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_slice(&content)?;
        let mut catalog = Self::new();
        for (manufacturer, entities) in snapshot.manufacturers {
            for entity in entities {
                if entity.identifier.trim().is_empty() {
                    return Err(AppError::validation(format!(
                        "snapshot row for {manufacturer} has an empty identifier"
                    )));
                }
                catalog.insert(&manufacturer, entity);
            }
        }
        Ok(catalog)
    }

    /// Add one entity, keeping identifier order. Duplicates are kept on purpose.
    pub fn insert(&mut self, manufacturer: &str, entity: CatalogEntity) {
        let rows = self.manufacturers.entry(manufacturer.to_string()).or_default();
        let at = rows.partition_point(|e| e.identifier <= entity.identifier);
        rows.insert(at, entity);
    }

    /// Add `count` parts named `{prefix}-{n:06}` to a subcategory.
    pub fn with_parts(
        mut self,
        manufacturer: &str,
        category: &str,
        subcategory: &str,
        prefix: &str,
        count: usize,
    ) -> Self {
        let rows = self.manufacturers.entry(manufacturer.to_string()).or_default();
        rows.extend((0..count).map(|n| CatalogEntity {
            identifier: format!("{prefix}-{n:06}"),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            last_modified: None,
        }));
        rows.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        self
    }

    /// Treat the cursor as inclusive (`>=`), like a misbehaving backend.
    pub fn with_inclusive_cursor(mut self) -> Self {
        self.inclusive_cursor = true;
        self
    }

    /// Make every entity read touching this subcategory fail with a transient error.
    pub fn fail_scope(mut self, category: &str, subcategory: &str) -> Self {
        self.failing_scopes
            .insert((category.to_string(), subcategory.to_string()));
        self
    }

    /// Make hierarchy enumeration fail with a transient error.
    pub fn fail_hierarchy(mut self) -> Self {
        self.fail_hierarchy = true;
        self
    }

    /// Fail the next `n` reads of any kind with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Entity page reads served so far, failed ones included.
    pub fn entity_reads(&self) -> usize {
        self.entity_reads.load(Ordering::SeqCst)
    }

    /// Hierarchy page reads served so far, failed ones included.
    pub fn hierarchy_reads(&self) -> usize {
        self.hierarchy_reads.load(Ordering::SeqCst)
    }

    /// Every entity read as `(scope, cursor)`, in arrival order.
    pub fn read_log(&self) -> Vec<(Scope, Option<String>)> {
        self.read_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Every entity of a manufacturer.
    pub fn entities(&self, manufacturer: &str) -> &[CatalogEntity] {
        self.manufacturers
            .get(manufacturer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn manufacturers(&self) -> impl Iterator<Item = &str> {
        self.manufacturers.keys().map(String::as_str)
    }

    fn injected_failure(&self) -> Result<()> {
        let taken = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_ok() {
            return Err(unavailable("injected failure"));
        }
        Ok(())
    }

    fn page<'a>(
        &'a self,
        manufacturer: &str,
        after: Option<&str>,
    ) -> impl Iterator<Item = &'a CatalogEntity> + 'a {
        let rows = self.entities(manufacturer);
        let start = match after {
            Some(cursor) if self.inclusive_cursor => {
                rows.partition_point(|e| e.identifier.as_str() < cursor)
            }
            Some(cursor) => rows.partition_point(|e| e.identifier.as_str() <= cursor),
            None => 0,
        };
        rows[start..].iter()
    }
}

fn unavailable(message: &str) -> AppError {
    AppError::Upstream {
        status: 503,
        message: message.to_string(),
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn fetch_entities(
        &self,
        scope: &Scope,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CatalogEntity>> {
        self.entity_reads.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.read_log.lock() {
            log.push((scope.clone(), after.map(str::to_string)));
        }
        self.injected_failure()?;

        if let (Some(category), Some(subcategory)) = (&scope.category, &scope.subcategory) {
            if self
                .failing_scopes
                .contains(&(category.clone(), subcategory.clone()))
            {
                return Err(unavailable("scope unavailable"));
            }
        }

        Ok(self
            .page(&scope.manufacturer, after)
            .filter(|e| scope.contains(&scope.manufacturer, &e.category, &e.subcategory))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_hierarchy_rows(
        &self,
        manufacturer: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HierarchyRow>> {
        self.hierarchy_reads.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        if self.fail_hierarchy {
            return Err(unavailable("hierarchy unavailable"));
        }

        Ok(self
            .page(manufacturer, after)
            .take(limit)
            .map(|e| HierarchyRow {
                identifier: e.identifier.clone(),
                category: e.category.clone(),
                subcategory: e.subcategory.clone(),
            })
            .collect())
    }

    async fn count(&self, scope: &Scope) -> Result<Option<u64>> {
        self.injected_failure()?;
        let count = self
            .entities(&scope.manufacturer)
            .iter()
            .filter(|e| scope.contains(&scope.manufacturer, &e.category, &e.subcategory))
            .count();
        Ok(Some(count as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new()
            .with_parts("Amatom", "Standoffs", "Brass Standoffs", "B", 5)
            .with_parts("Amatom", "Washers", "Captive Screw Washers", "W", 2)
    }

    #[tokio::test]
    async fn test_pages_are_strictly_after_cursor() {
        let catalog = catalog();
        let scope = Scope::manufacturer("Amatom");

        let first = catalog.fetch_entities(&scope, None, 3).await.unwrap();
        let ids: Vec<_> = first.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, ["B-000000", "B-000001", "B-000002"]);

        let rest = catalog.fetch_entities(&scope, Some("B-000002"), 10).await.unwrap();
        assert_eq!(rest.len(), 4);
        assert_eq!(rest[0].identifier, "B-000003");
        assert_eq!(catalog.entity_reads(), 2);
    }

    #[tokio::test]
    async fn test_scope_filter_and_count() {
        let catalog = catalog();
        let scope = Scope::subcategory("Amatom", "Washers", "Captive Screw Washers");
        let page = catalog.fetch_entities(&scope, None, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(catalog.count(&scope).await.unwrap(), Some(2));
        assert_eq!(
            catalog.count(&Scope::manufacturer("Nobody")).await.unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let catalog = catalog().fail_scope("Washers", "Captive Screw Washers");
        let failing = Scope::subcategory("Amatom", "Washers", "Captive Screw Washers");
        let err = catalog.fetch_entities(&failing, None, 10).await.unwrap_err();
        assert!(err.is_transient());

        catalog.fail_next(1);
        let healthy = Scope::subcategory("Amatom", "Standoffs", "Brass Standoffs");
        assert!(catalog.fetch_entities(&healthy, None, 10).await.is_err());
        assert!(catalog.fetch_entities(&healthy, None, 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{"manufacturers": {"Amatom": [
                {"identifier": "Z-1", "category": "Washers", "subcategory": "Flat Washers"},
                {"identifier": "A-1", "category": "Standoffs", "subcategory": "Brass Standoffs",
                 "last_modified": "2025-01-31"}
            ]}}"#,
        )
        .unwrap();

        let catalog = MemoryCatalog::load(&path).unwrap();
        let ids: Vec<_> = catalog
            .entities("Amatom")
            .iter()
            .map(|e| e.identifier.as_str())
            .collect();
        assert_eq!(ids, ["A-1", "Z-1"]);
        assert_eq!(catalog.manufacturers().collect::<Vec<_>>(), ["Amatom"]);
    }

    #[test]
    fn test_load_rejects_empty_identifier() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{"manufacturers": {"Amatom": [
                {"identifier": " ", "category": "Washers", "subcategory": "Flat Washers"}
            ]}}"#,
        )
        .unwrap();
        assert!(MemoryCatalog::load(&path).is_err());
    }
}
