// src/sitemap/manifest.rs

//! Publish manifest: what the last run put into the output tree.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::sitemap::xml::DocumentKind;
use crate::storage::SitemapStorage;

pub const MANIFEST_KEY: &str = "sitemap-manifest.json";

/// One published document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: DocumentKind,

    /// Hex SHA-256 of the document bytes
    pub digest: String,

    /// URLs for a shard, entries for an index
    pub records: usize,

    pub last_modified: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    /// Run finished without skipped scopes
    #[serde(default)]
    pub complete: bool,

    #[serde(default)]
    pub files: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Load the published manifest. A missing or unreadable one counts as empty.
    pub async fn load(storage: &dyn SitemapStorage) -> Result<Self> {
        let Some(bytes) = storage.read(MANIFEST_KEY).await? else {
            return Ok(Self::default());
        };
        match serde_json::from_slice(&bytes) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                log::warn!("Ignoring unreadable {}: {}", MANIFEST_KEY, e);
                Ok(Self::default())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.files.get(key)
    }

    /// Keys present here but not in `next`.
    pub fn stale_keys(&self, next: &Manifest) -> Vec<String> {
        self.files
            .keys()
            .filter(|key| !next.files.contains_key(*key))
            .cloned()
            .collect()
    }

    /// Copy over entries `self` lacks; used when stale files stay on disk.
    pub fn carry_forward(&mut self, previous: &Manifest) {
        for (key, entry) in &previous.files {
            self.files.entry(key.clone()).or_insert_with(|| entry.clone());
        }
    }

    pub fn shard_count(&self) -> usize {
        self.count(DocumentKind::UrlSet)
    }

    pub fn index_count(&self) -> usize {
        self.count(DocumentKind::Index)
    }

    /// Total URLs across all shards.
    pub fn url_count(&self) -> usize {
        self.files
            .values()
            .filter(|e| e.kind == DocumentKind::UrlSet)
            .map(|e| e.records)
            .sum()
    }

    fn count(&self, kind: DocumentKind) -> usize {
        self.files.values().filter(|e| e.kind == kind).count()
    }
}

/// Hex SHA-256 digest of a document.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn entry(kind: DocumentKind, records: usize) -> ManifestEntry {
        ManifestEntry {
            kind,
            digest: digest(b"x"),
            records,
            last_modified: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        assert_eq!(
            digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_stale_keys_and_carry_forward() {
        let mut previous = Manifest::default();
        previous.files.insert("a.xml".into(), entry(DocumentKind::UrlSet, 3));
        previous.files.insert("b.xml".into(), entry(DocumentKind::UrlSet, 4));

        let mut next = Manifest::default();
        next.files.insert("b.xml".into(), entry(DocumentKind::UrlSet, 5));
        next.files.insert("sitemap.xml".into(), entry(DocumentKind::Index, 1));

        assert_eq!(previous.stale_keys(&next), ["a.xml"]);
        next.carry_forward(&previous);
        assert_eq!(next.files.len(), 3);
        assert_eq!(next.get("b.xml").unwrap().records, 5);
        assert_eq!(next.url_count(), 8);
        assert_eq!(next.shard_count(), 2);
        assert_eq!(next.index_count(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_or_corrupt() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_run_id(tmp.path(), "test");
        assert!(Manifest::load(&storage).await.unwrap().files.is_empty());

        std::fs::write(tmp.path().join(MANIFEST_KEY), b"{not json").unwrap();
        assert!(Manifest::load(&storage).await.unwrap().files.is_empty());
    }
}
