// src/services/hierarchy.rs

//! Category/subcategory discovery for one manufacturer.
//!
//! Distinct-value queries are capped by the data API, so the enumerator pages
//! raw `(identifier, category, subcategory)` rows and deduplicates locally.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    Category, FallbackCategory, Hierarchy, HierarchyConfig, HierarchyOrigin, HierarchyRow, Scope,
    SlugConflict, SlugConflictPolicy, Subcategory,
};
use crate::source::{CatalogSource, Governor, RetryPolicy};
use crate::utils::slugify;

/// Category name to subcategory names.
pub type CategoryPairs = BTreeMap<String, BTreeSet<String>>;

/// Stored names and row count behind one trimmed pair.
#[derive(Debug, Default)]
struct PairRows {
    variants: BTreeSet<(String, String)>,
    rows: u64,
}

/// Raw result of a row scan.
#[derive(Debug, Default)]
struct Scan {
    pairs: CategoryPairs,
    sources: BTreeMap<(String, String), PairRows>,
    rows_scanned: usize,
    blank_rows: usize,
    truncated: bool,
}

/// Discovers the hierarchy of a manufacturer from the catalog.
pub struct HierarchyEnumerator {
    source: Arc<dyn CatalogSource>,
    policy: RetryPolicy,
    governor: Arc<Governor>,
    config: HierarchyConfig,
}

impl HierarchyEnumerator {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        policy: RetryPolicy,
        governor: Arc<Governor>,
        config: HierarchyConfig,
    ) -> Self {
        Self {
            source,
            policy,
            governor,
            config,
        }
    }

    /// Enumerate the live hierarchy.
    pub async fn enumerate(&self, manufacturer: &str) -> Result<Hierarchy> {
        let mut scan = self.scan(manufacturer).await?;
        let mut hierarchy = build_hierarchy(
            manufacturer,
            &scan.pairs,
            self.config.slug_conflict,
            HierarchyOrigin::Live,
        );
        for sub in hierarchy
            .categories
            .iter_mut()
            .flat_map(|c| c.subcategories.iter_mut())
        {
            let trimmed = (sub.category.clone(), sub.name.clone());
            let Some(found) = scan.sources.remove(&trimmed) else {
                continue;
            };
            sub.rows_enumerated = Some(found.rows);
            if found.variants.len() > 1 || !found.variants.contains(&trimmed) {
                log::debug!(
                    "{} / {} / {}: stored as {:?}",
                    manufacturer,
                    sub.category,
                    sub.name,
                    found.variants
                );
                sub.source_names = found.variants.into_iter().collect();
            }
        }
        hierarchy.rows_scanned = scan.rows_scanned;
        hierarchy.blank_rows = scan.blank_rows;
        hierarchy.truncated = scan.truncated;

        log::info!(
            "{}: {} categories, {} subcategories from {} rows{}",
            manufacturer,
            hierarchy.categories.len(),
            hierarchy.subcategory_count(),
            hierarchy.rows_scanned,
            if hierarchy.truncated { " (truncated)" } else { "" }
        );
        Ok(hierarchy)
    }

    /// Enumerate, falling back to the configured offline hierarchy on failure.
    pub async fn enumerate_or_fallback(&self, manufacturer: &str) -> Result<Hierarchy> {
        match self.enumerate(manufacturer).await {
            Ok(hierarchy) => Ok(hierarchy),
            Err(e) => {
                let fallback = self.config.fallback_for(manufacturer);
                if fallback.is_empty() {
                    return Err(e);
                }
                log::warn!(
                    "{}: hierarchy enumeration failed ({}); using {} fallback categories",
                    manufacturer,
                    e,
                    fallback.len()
                );
                Ok(fallback_hierarchy(
                    manufacturer,
                    &fallback,
                    self.config.slug_conflict,
                ))
            }
        }
    }

    pub async fn list_categories(&self, manufacturer: &str) -> Result<Vec<Category>> {
        Ok(self.enumerate(manufacturer).await?.categories)
    }

    pub async fn list_subcategories(
        &self,
        manufacturer: &str,
        category: &str,
    ) -> Result<Vec<Subcategory>> {
        let hierarchy = self.enumerate(manufacturer).await?;
        Ok(hierarchy
            .category(category)
            .map(|c| c.subcategories.clone())
            .unwrap_or_default())
    }

    /// Fill subcategory counts with count-only queries.
    ///
    /// Counts are diagnostics; a failed count leaves the field empty.
    /// Subcategories stored under several spellings sum one count per spelling.
    pub async fn attach_counts(&self, hierarchy: &mut Hierarchy) {
        let manufacturer = hierarchy.manufacturer.clone();
        let jobs: Vec<(usize, usize, Scope)> = hierarchy
            .categories
            .iter()
            .enumerate()
            .flat_map(|(ci, c)| {
                let manufacturer = &manufacturer;
                c.subcategories.iter().enumerate().flat_map(move |(si, s)| {
                    s.scopes(manufacturer)
                        .into_iter()
                        .map(move |scope| (ci, si, scope))
                })
            })
            .collect();

        let mut counts = stream::iter(jobs)
            .map(|(ci, si, scope)| async move {
                let context = format!("count {scope}");
                let count = self
                    .policy
                    .run(&self.governor, &context, || self.source.count(&scope))
                    .await;
                (ci, si, scope, count)
            })
            .buffer_unordered(4);

        let mut totals: BTreeMap<(usize, usize), Option<u64>> = BTreeMap::new();
        while let Some((ci, si, scope, count)) = counts.next().await {
            let total = totals.entry((ci, si)).or_insert(Some(0));
            match count {
                Ok(Some(n)) => *total = total.map(|t| t + n),
                Ok(None) => *total = None,
                Err(e) => {
                    log::debug!("{}: count unavailable: {}", scope, e);
                    *total = None;
                }
            }
        }
        for ((ci, si), total) in totals {
            hierarchy.categories[ci].subcategories[si].entity_count = total;
        }
    }

    async fn scan(&self, manufacturer: &str) -> Result<Scan> {
        let batch_size = self.config.batch_size.max(1);
        let ceiling = self.config.row_ceiling;
        let mut scan = Scan::default();
        let mut cursor: Option<String> = None;

        loop {
            let limit = batch_size.min(ceiling - scan.rows_scanned);
            let rows = self.fetch(manufacturer, cursor.as_deref(), limit).await?;
            let full = rows.len() >= limit;

            let next = rows.last().map(|r| r.identifier.clone());
            for row in rows {
                scan.rows_scanned += 1;
                let category = row.category.trim();
                let subcategory = row.subcategory.trim();
                if category.is_empty() || subcategory.is_empty() {
                    scan.blank_rows += 1;
                    continue;
                }
                scan.pairs
                    .entry(category.to_string())
                    .or_default()
                    .insert(subcategory.to_string());

                let found = scan
                    .sources
                    .entry((category.to_string(), subcategory.to_string()))
                    .or_default();
                found.rows += 1;
                found
                    .variants
                    .insert((row.category.clone(), row.subcategory.clone()));
            }

            if !full {
                break;
            }
            if next.is_none() || next == cursor {
                return Err(AppError::source(
                    format!("{manufacturer} hierarchy"),
                    "full batch did not advance the cursor",
                ));
            }
            cursor = next;

            if scan.rows_scanned >= ceiling {
                // Probe one row to tell a complete scan from a cut-off one.
                let probe = self.fetch(manufacturer, cursor.as_deref(), 1).await?;
                if !probe.is_empty() {
                    scan.truncated = true;
                    log::warn!(
                        "{}: hierarchy row ceiling of {} reached; remaining rows were not enumerated",
                        manufacturer,
                        ceiling
                    );
                }
                break;
            }
        }

        if scan.blank_rows > 0 {
            log::warn!(
                "{}: {} rows with blank category or subcategory ignored",
                manufacturer,
                scan.blank_rows
            );
        }
        Ok(scan)
    }

    async fn fetch(
        &self,
        manufacturer: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HierarchyRow>> {
        let context = format!("{manufacturer} hierarchy after {:?}", after.unwrap_or(""));
        self.policy
            .run(&self.governor, &context, || {
                self.source.fetch_hierarchy_rows(manufacturer, after, limit)
            })
            .await
            .map_err(|e| AppError::source(context, e))
    }
}

/// Hierarchy from the configured offline fallback.
pub fn fallback_hierarchy(
    manufacturer: &str,
    fallback: &[FallbackCategory],
    policy: SlugConflictPolicy,
) -> Hierarchy {
    let mut pairs = CategoryPairs::new();
    for category in fallback {
        let subs = pairs.entry(category.name.trim().to_string()).or_default();
        subs.extend(
            category
                .subcategories
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        );
    }
    build_hierarchy(manufacturer, &pairs, policy, HierarchyOrigin::Fallback)
}

/// Turn distinct `(category, subcategory)` names into a slugged tree.
///
/// Categories and subcategories come out sorted by slug. Categories left
/// without subcategories are dropped.
pub fn build_hierarchy(
    manufacturer: &str,
    pairs: &CategoryPairs,
    policy: SlugConflictPolicy,
    origin: HierarchyOrigin,
) -> Hierarchy {
    let mut conflicts = Vec::new();
    let category_slugs = assign_slugs(pairs.keys(), None, policy, &mut conflicts);

    let mut categories = Vec::new();
    for (name, slug) in category_slugs {
        let Some(sub_names) = pairs.get(&name) else {
            continue;
        };
        let subcategories: Vec<Subcategory> =
            assign_slugs(sub_names.iter(), Some(&name), policy, &mut conflicts)
                .into_iter()
                .map(|(sub_name, sub_slug)| Subcategory {
                    name: sub_name,
                    slug: sub_slug,
                    category: name.clone(),
                    category_slug: slug.clone(),
                    entity_count: None,
                    rows_enumerated: None,
                    source_names: Vec::new(),
                })
                .collect();

        if subcategories.is_empty() {
            log::warn!("{}: category '{}' has no usable subcategories", manufacturer, name);
            continue;
        }
        categories.push(Category {
            name,
            slug,
            subcategories,
        });
    }

    Hierarchy {
        manufacturer: manufacturer.to_string(),
        manufacturer_slug: slugify(manufacturer),
        categories,
        origin,
        truncated: false,
        rows_scanned: 0,
        blank_rows: 0,
        conflicts,
    }
}

/// Slug every sibling name, settling collisions per `policy`.
///
/// Returns `(name, slug)` pairs sorted by slug.
fn assign_slugs<'a>(
    names: impl Iterator<Item = &'a String>,
    parent: Option<&str>,
    policy: SlugConflictPolicy,
    conflicts: &mut Vec<SlugConflict>,
) -> Vec<(String, String)> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        groups.entry(slugify(name)).or_default().push(name.clone());
    }

    let mut taken: HashSet<String> = groups.keys().filter(|s| !s.is_empty()).cloned().collect();
    let mut assigned = Vec::new();

    for (slug, mut names) in groups {
        names.sort();
        if slug.is_empty() {
            log::warn!(
                "{}: names without a usable slug skipped: {:?}",
                parent.unwrap_or("categories"),
                names
            );
            conflicts.push(SlugConflict {
                parent: parent.map(str::to_string),
                slug,
                skipped: names.clone(),
                names,
            });
            continue;
        }
        if names.len() == 1 {
            assigned.extend(names.into_iter().map(|n| (n, slug.clone())));
            continue;
        }

        log::warn!(
            "{}: {:?} all slug to '{}'",
            parent.unwrap_or("categories"),
            names,
            slug
        );
        let skipped = match policy {
            SlugConflictPolicy::Skip => names.clone(),
            SlugConflictPolicy::Suffix => {
                let mut iter = names.iter();
                if let Some(first) = iter.next() {
                    assigned.push((first.clone(), slug.clone()));
                }
                let mut n = 2;
                for name in iter {
                    let mut candidate = format!("{slug}-{n}");
                    while taken.contains(&candidate) {
                        n += 1;
                        candidate = format!("{slug}-{n}");
                    }
                    taken.insert(candidate.clone());
                    assigned.push((name.clone(), candidate));
                    n += 1;
                }
                Vec::new()
            }
        };
        conflicts.push(SlugConflict {
            parent: parent.map(str::to_string),
            slug,
            names,
            skipped,
        });
    }

    assigned.sort_by(|a, b| a.1.cmp(&b.1));
    assigned
}
