// src/sitemap/verify.rs

//! Reachability check of a published sitemap tree.
//!
//! Walks from the root index and checks that every reference resolves, that
//! no document is referenced twice, that no URL sits in two shards and that
//! no document exceeds the capacity. Given the set of URLs that should exist,
//! it also reports omissions and strays.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::error::Result;
use crate::sitemap::index::ROOT_KEY;
use crate::sitemap::xml::{DocumentKind, parse_document};
use crate::storage::SitemapStorage;
use crate::utils::UrlScheme;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub indexes: usize,
    pub shards: usize,
    pub urls: usize,

    /// References to documents that do not exist or live outside the sitemap base
    pub dangling: Vec<String>,

    /// Documents referenced from more than one index entry
    pub duplicate_references: Vec<String>,

    /// URLs listed more than once across all shards
    pub duplicate_urls: Vec<String>,

    /// `(key, entries)` for documents above capacity
    pub over_capacity: Vec<(String, usize)>,

    /// Expected URLs that are not reachable
    pub missing: Vec<String>,

    /// Reachable URLs that were not expected
    pub unexpected: Vec<String>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.problems() == 0
    }

    pub fn problems(&self) -> usize {
        self.dangling.len()
            + self.duplicate_references.len()
            + self.duplicate_urls.len()
            + self.over_capacity.len()
            + self.missing.len()
            + self.unexpected.len()
    }
}

pub struct Verifier<'a> {
    storage: &'a dyn SitemapStorage,
    scheme: &'a UrlScheme,
    capacity: usize,
}

impl<'a> Verifier<'a> {
    pub fn new(storage: &'a dyn SitemapStorage, scheme: &'a UrlScheme, capacity: usize) -> Self {
        Self {
            storage,
            scheme,
            capacity,
        }
    }

    /// Walk the published tree. `expected` enables the omission check.
    pub async fn verify(&self, expected: Option<&HashSet<String>>) -> Result<VerificationReport> {
        let mut report = VerificationReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([ROOT_KEY.to_string()]);
        visited.insert(ROOT_KEY.to_string());

        while let Some(key) = queue.pop_front() {
            let Some(bytes) = self.storage.read(&key).await? else {
                report.dangling.push(key);
                continue;
            };
            let text = String::from_utf8_lossy(&bytes);
            let document = parse_document(&key, &text)?;

            // Indexes may hold two entries even at capacity one.
            let limit = match document.kind {
                DocumentKind::UrlSet => self.capacity,
                DocumentKind::Index => self.capacity.max(2),
            };
            if document.locations.len() > limit {
                report
                    .over_capacity
                    .push((key.clone(), document.locations.len()));
            }

            match document.kind {
                DocumentKind::Index => {
                    report.indexes += 1;
                    for location in document.locations {
                        match self.scheme.document_key(&location) {
                            None => report.dangling.push(location),
                            Some(child) if !visited.insert(child.clone()) => {
                                report.duplicate_references.push(child)
                            }
                            Some(child) => queue.push_back(child),
                        }
                    }
                }
                DocumentKind::UrlSet => {
                    report.shards += 1;
                    for location in document.locations {
                        report.urls += 1;
                        if !seen_urls.insert(location.clone()) {
                            report.duplicate_urls.push(location);
                        }
                    }
                }
            }
        }

        if let Some(expected) = expected {
            report.missing = sorted(expected.difference(&seen_urls));
            report.unexpected = sorted(seen_urls.difference(expected));
        }

        if report.is_ok() {
            log::info!(
                "Verified {} indexes, {} shards, {} URLs",
                report.indexes,
                report.shards,
                report.urls
            );
        } else {
            log::warn!("Verification found {} problems", report.problems());
        }
        Ok(report)
    }
}

fn sorted<'s>(items: impl Iterator<Item = &'s String>) -> Vec<String> {
    items.cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteConfig;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    const ROOT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://x.test/a.xml</loc></sitemap>
  <sitemap><loc>https://x.test/b.xml</loc></sitemap>
</sitemapindex>"#;

    fn scheme() -> UrlScheme {
        UrlScheme::new(&SiteConfig {
            base_url: "https://x.test".into(),
            ..SiteConfig::default()
        })
        .unwrap()
    }

    fn urlset(urls: &[&str]) -> String {
        let body: String = urls
            .iter()
            .map(|u| format!("<url><loc>{u}</loc></url>"))
            .collect();
        format!(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{body}</urlset>"#)
    }

    fn tree(files: &[(&str, String)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (key, body) in files {
            std::fs::write(tmp.path().join(key), body).unwrap();
        }
        tmp
    }

    #[tokio::test]
    async fn test_clean_tree() {
        let tmp = tree(&[
            ("sitemap.xml", ROOT.to_string()),
            ("a.xml", urlset(&["https://x.test/1", "https://x.test/2"])),
            ("b.xml", urlset(&["https://x.test/3"])),
        ]);
        let storage = LocalStorage::with_run_id(tmp.path(), "v");
        let scheme = scheme();
        let expected: HashSet<String> = ["1", "2", "3"]
            .iter()
            .map(|n| format!("https://x.test/{n}"))
            .collect();

        let report = Verifier::new(&storage, &scheme, 2)
            .verify(Some(&expected))
            .await
            .unwrap();
        assert!(report.is_ok(), "{report:?}");
        assert_eq!((report.indexes, report.shards, report.urls), (1, 2, 3));
    }

    #[tokio::test]
    async fn test_reports_every_violation() {
        let tmp = tree(&[
            ("sitemap.xml", ROOT.to_string()),
            (
                "a.xml",
                urlset(&["https://x.test/1", "https://x.test/2", "https://x.test/9"]),
            ),
        ]);
        let storage = LocalStorage::with_run_id(tmp.path(), "v");
        let scheme = scheme();
        let expected: HashSet<String> = ["https://x.test/1".to_string(), "https://x.test/3".to_string()]
            .into_iter()
            .collect();

        let report = Verifier::new(&storage, &scheme, 2)
            .verify(Some(&expected))
            .await
            .unwrap();
        assert_eq!(report.dangling, ["b.xml"]);
        assert_eq!(report.over_capacity, [("a.xml".to_string(), 3)]);
        assert_eq!(report.missing, ["https://x.test/3"]);
        assert_eq!(report.unexpected, ["https://x.test/2", "https://x.test/9"]);
        assert!(!report.is_ok());
    }

    #[tokio::test]
    async fn test_duplicates_detected() {
        let root = ROOT.replace("b.xml", "a.xml");
        let tmp = tree(&[
            ("sitemap.xml", root),
            ("a.xml", urlset(&["https://x.test/1", "https://x.test/1"])),
        ]);
        let storage = LocalStorage::with_run_id(tmp.path(), "v");
        let scheme = scheme();
        let report = Verifier::new(&storage, &scheme, 10).verify(None).await.unwrap();
        assert_eq!(report.duplicate_references, ["a.xml"]);
        assert_eq!(report.duplicate_urls, ["https://x.test/1"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_dangling() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_run_id(tmp.path(), "v");
        let scheme = scheme();
        let report = Verifier::new(&storage, &scheme, 10).verify(None).await.unwrap();
        assert_eq!(report.dangling, [ROOT_KEY]);
    }
}
