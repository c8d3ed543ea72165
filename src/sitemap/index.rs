// src/sitemap/index.rs

//! Index-of-index composition.
//!
//! Runs only after every category worker has finished, and sorts by slug, so
//! the tree never depends on completion order.

use crate::error::Result;
use crate::models::{Layout, SitemapIndexEntry};
use crate::sitemap::publish::{Publisher, StagedDocument};
use crate::utils::UrlScheme;

/// Fixed key of the root index.
pub const ROOT_KEY: &str = "sitemap.xml";

/// Shards one subcategory produced.
#[derive(Debug, Clone)]
pub struct SubcategoryOutput {
    pub slug: String,
    pub shards: Vec<StagedDocument>,
}

/// Everything one category produced. Failed subcategories are simply absent.
#[derive(Debug, Clone)]
pub struct CategoryOutput {
    pub manufacturer_slug: String,
    pub slug: String,

    /// Landing-page shard(s); empty in the flat layout
    pub landing: Vec<StagedDocument>,

    pub subcategories: Vec<SubcategoryOutput>,
}

impl CategoryOutput {
    pub fn index_key(&self) -> String {
        format!("{}/{}/index.xml", self.manufacturer_slug, self.slug)
    }
}

/// Result of composing the tree.
#[derive(Debug, Clone)]
pub struct Composition {
    pub root: StagedDocument,

    /// Every index written, root included
    pub indexes: Vec<StagedDocument>,

    /// Category index keys left out because nothing below them survived
    pub omitted: Vec<String>,
}

pub struct IndexComposer<'a> {
    publisher: &'a Publisher,
    scheme: &'a UrlScheme,
    layout: Layout,
    capacity: usize,
}

impl<'a> IndexComposer<'a> {
    pub fn new(
        publisher: &'a Publisher,
        scheme: &'a UrlScheme,
        layout: Layout,
        capacity: usize,
    ) -> Self {
        Self {
            publisher,
            scheme,
            layout,
            // An index split into chunks of one would never shrink.
            capacity: capacity.max(2),
        }
    }

    /// Build subcategory, category and root indexes.
    pub async fn compose(
        &self,
        static_shards: &[StagedDocument],
        mut categories: Vec<CategoryOutput>,
    ) -> Result<Composition> {
        categories.sort_by(|a, b| {
            (&a.manufacturer_slug, &a.slug).cmp(&(&b.manufacturer_slug, &b.slug))
        });

        let mut indexes = Vec::new();
        let mut omitted = Vec::new();
        let mut root_entries = Vec::new();
        for shard in static_shards {
            root_entries.push(shard.index_entry(self.scheme)?);
        }

        for mut category in categories {
            category.subcategories.sort_by(|a, b| a.slug.cmp(&b.slug));

            let mut entries = Vec::new();
            for landing in &category.landing {
                entries.push(landing.index_entry(self.scheme)?);
            }
            for sub in &category.subcategories {
                if sub.shards.is_empty() {
                    continue;
                }
                if self.layout == Layout::Tiered && sub.shards.len() > 1 {
                    let key = format!(
                        "{}/{}/{}/index.xml",
                        category.manufacturer_slug, category.slug, sub.slug
                    );
                    let children = self.entries(&sub.shards)?;
                    let index = self.write_index(&key, children, &mut indexes).await?;
                    entries.push(index.index_entry(self.scheme)?);
                } else {
                    entries.extend(self.entries(&sub.shards)?);
                }
            }

            let key = category.index_key();
            if category.subcategories.is_empty() || entries.is_empty() {
                log::warn!("Omitting {} from the root index: no subcategory output", key);
                omitted.push(key);
                continue;
            }
            let index = self.write_index(&key, entries, &mut indexes).await?;
            root_entries.push(index.index_entry(self.scheme)?);
        }

        let root = self.write_index(ROOT_KEY, root_entries, &mut indexes).await?;
        Ok(Composition {
            root,
            indexes,
            omitted,
        })
    }

    fn entries(&self, documents: &[StagedDocument]) -> Result<Vec<SitemapIndexEntry>> {
        documents
            .iter()
            .map(|d| d.index_entry(self.scheme))
            .collect()
    }

    /// Stage an index at `key`, splitting it into numbered child indexes
    /// while it holds more entries than the capacity.
    pub async fn write_index(
        &self,
        key: &str,
        mut entries: Vec<SitemapIndexEntry>,
        written: &mut Vec<StagedDocument>,
    ) -> Result<StagedDocument> {
        let stem = key.strip_suffix(".xml").unwrap_or(key);
        let mut level = 0;

        while entries.len() > self.capacity {
            level += 1;
            log::info!(
                "{} has {} entries; splitting into child indexes of {}",
                key,
                entries.len(),
                self.capacity
            );
            let mut parents = Vec::new();
            for (i, chunk) in entries.chunks(self.capacity).enumerate() {
                let child_key = if level == 1 {
                    format!("{stem}-{}.xml", i + 1)
                } else {
                    format!("{stem}-{level}-{}.xml", i + 1)
                };
                let child = self.publisher.stage_index(&child_key, chunk).await?;
                parents.push(child.index_entry(self.scheme)?);
                written.push(child);
            }
            entries = parents;
        }

        let index = self.publisher.stage_index(key, &entries).await?;
        written.push(index.clone());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Shard, SiteConfig, UrlRecord};
    use crate::sitemap::xml::{DocumentKind, parse_document};
    use crate::storage::{LocalStorage, SitemapStorage};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn scheme() -> UrlScheme {
        UrlScheme::new(&SiteConfig {
            base_url: "https://x.test".into(),
            ..SiteConfig::default()
        })
        .unwrap()
    }

    async fn shard(publisher: &Publisher, key: &str) -> StagedDocument {
        publisher
            .stage_shard(&Shard {
                key: key.to_string(),
                records: vec![UrlRecord::new(format!("https://x.test/{key}"))],
            })
            .await
            .unwrap()
    }

    async fn fixture(publisher: &Publisher) -> (Vec<StagedDocument>, Vec<CategoryOutput>) {
        let statics = vec![shard(publisher, "sitemap-pages.xml").await];
        let mut brass = Vec::new();
        for n in 1..=3 {
            brass.push(
                shard(
                    publisher,
                    &format!("amatom/standoffs/brass-standoffs/standoffs-brass-standoffs-{n}.xml"),
                )
                .await,
            );
        }
        let nylon = vec![shard(publisher, "amatom/standoffs/nylon-standoffs/standoffs-nylon-standoffs.xml").await];
        let captive = vec![shard(publisher, "amatom/washers/captive-screw-washers/washers-captive-screw-washers.xml").await];

        let categories = vec![
            CategoryOutput {
                manufacturer_slug: "amatom".into(),
                slug: "washers".into(),
                landing: vec![],
                subcategories: vec![SubcategoryOutput {
                    slug: "captive-screw-washers".into(),
                    shards: captive,
                }],
            },
            CategoryOutput {
                manufacturer_slug: "amatom".into(),
                slug: "standoffs".into(),
                landing: vec![],
                subcategories: vec![
                    SubcategoryOutput {
                        slug: "nylon-standoffs".into(),
                        shards: nylon,
                    },
                    SubcategoryOutput {
                        slug: "brass-standoffs".into(),
                        shards: brass,
                    },
                ],
            },
        ];
        (statics, categories)
    }

    async fn open(tmp: &TempDir) -> (Arc<dyn SitemapStorage>, Publisher) {
        let storage: Arc<dyn SitemapStorage> = Arc::new(LocalStorage::with_run_id(tmp.path(), "t"));
        let publisher = Publisher::open(storage.clone(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .await
            .unwrap();
        (storage, publisher)
    }

    async fn locations(storage: &Arc<dyn SitemapStorage>, key: &str) -> Vec<String> {
        let bytes = storage.read(key).await.unwrap().unwrap();
        let doc = parse_document(key, &String::from_utf8(bytes).unwrap()).unwrap();
        assert_eq!(doc.kind, DocumentKind::Index);
        doc.locations
    }

    #[tokio::test]
    async fn test_flat_layout_references_shards_directly() {
        let tmp = TempDir::new().unwrap();
        let (storage, publisher) = open(&tmp).await;
        let scheme = scheme();
        let (statics, categories) = fixture(&publisher).await;

        let composer = IndexComposer::new(&publisher, &scheme, Layout::Flat, 50_000);
        let composition = composer.compose(&statics, categories).await.unwrap();
        assert!(composition.omitted.is_empty());
        publisher.commit(ROOT_KEY, true, true).await.unwrap();

        assert_eq!(
            locations(&storage, ROOT_KEY).await,
            [
                "https://x.test/sitemap-pages.xml",
                "https://x.test/amatom/standoffs/index.xml",
                "https://x.test/amatom/washers/index.xml",
            ]
        );
        let standoffs = locations(&storage, "amatom/standoffs/index.xml").await;
        assert_eq!(standoffs.len(), 4);
        assert!(standoffs[0].ends_with("standoffs-brass-standoffs-1.xml"));
        assert!(standoffs[3].ends_with("standoffs-nylon-standoffs.xml"));
        assert_eq!(locations(&storage, "amatom/washers/index.xml").await.len(), 1);
    }

    #[tokio::test]
    async fn test_tiered_layout_adds_subcategory_index() {
        let tmp = TempDir::new().unwrap();
        let (storage, publisher) = open(&tmp).await;
        let scheme = scheme();
        let (statics, categories) = fixture(&publisher).await;

        let composer = IndexComposer::new(&publisher, &scheme, Layout::Tiered, 50_000);
        composer.compose(&statics, categories).await.unwrap();
        publisher.commit(ROOT_KEY, true, true).await.unwrap();

        assert_eq!(
            locations(&storage, "amatom/standoffs/index.xml").await,
            [
                "https://x.test/amatom/standoffs/brass-standoffs/index.xml",
                "https://x.test/amatom/standoffs/nylon-standoffs/standoffs-nylon-standoffs.xml",
            ]
        );
        assert_eq!(
            locations(&storage, "amatom/standoffs/brass-standoffs/index.xml").await.len(),
            3
        );
    }

    #[tokio::test]
    async fn test_category_without_output_is_omitted() {
        let tmp = TempDir::new().unwrap();
        let (storage, publisher) = open(&tmp).await;
        let scheme = scheme();
        let (statics, mut categories) = fixture(&publisher).await;
        categories[0].subcategories.clear();

        let composer = IndexComposer::new(&publisher, &scheme, Layout::Tiered, 50_000);
        let composition = composer.compose(&statics, categories).await.unwrap();
        assert_eq!(composition.omitted, ["amatom/washers/index.xml"]);
        publisher.commit(ROOT_KEY, true, true).await.unwrap();

        let root = locations(&storage, ROOT_KEY).await;
        assert_eq!(root.len(), 2);
        assert!(!storage.exists("amatom/washers/index.xml").await.unwrap());
    }

    #[tokio::test]
    async fn test_oversized_index_is_split() {
        let tmp = TempDir::new().unwrap();
        let (storage, publisher) = open(&tmp).await;
        let scheme = scheme();
        let (statics, categories) = fixture(&publisher).await;

        // Capacity 2: the flat standoffs index (4 entries) splits in two.
        let composer = IndexComposer::new(&publisher, &scheme, Layout::Flat, 2);
        composer.compose(&statics, categories).await.unwrap();
        publisher.commit(ROOT_KEY, true, true).await.unwrap();

        assert_eq!(
            locations(&storage, "amatom/standoffs/index.xml").await,
            [
                "https://x.test/amatom/standoffs/index-1.xml",
                "https://x.test/amatom/standoffs/index-2.xml",
            ]
        );
        // Root has 3 entries: split into sitemap-1 (2) and sitemap-2 (1).
        assert_eq!(locations(&storage, ROOT_KEY).await.len(), 2);
        assert_eq!(locations(&storage, "sitemap-1.xml").await.len(), 2);
    }
}
