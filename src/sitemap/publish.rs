// src/sitemap/publish.rs

//! Staging and publishing of sitemap documents.
//!
//! Every document is rendered, digested and compared with the previous
//! manifest. Unchanged documents keep their published file and `lastmod`;
//! changed ones are written to staging and renamed into place at commit,
//! shards first and `sitemap.xml` last.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::{Shard, SitemapIndexEntry};
use crate::sitemap::manifest::{MANIFEST_KEY, Manifest, ManifestEntry, digest};
use crate::sitemap::xml::{DocumentKind, render_index, render_urlset};
use crate::storage::SitemapStorage;
use crate::utils::UrlScheme;

/// A document produced by this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDocument {
    /// Path relative to the output root
    pub key: String,

    pub kind: DocumentKind,

    /// URLs for a shard, entries for an index
    pub records: usize,

    pub digest: String,

    pub last_modified: NaiveDate,

    /// Bytes differ from the published version
    pub changed: bool,
}

impl StagedDocument {
    /// Entry pointing at this document from a parent index.
    pub fn index_entry(&self, scheme: &UrlScheme) -> Result<SitemapIndexEntry> {
        Ok(SitemapIndexEntry {
            location: scheme.document(&self.key)?,
            last_modified: Some(self.last_modified),
        })
    }
}

/// Outcome of [`Publisher::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub shards_written: usize,
    pub shards_unchanged: usize,
    pub indexes_written: usize,
    pub indexes_unchanged: usize,
    pub pruned: Vec<String>,
}

#[derive(Debug)]
struct Staged {
    order: usize,
    document: StagedDocument,
}

/// Stages documents for one run and publishes them together.
pub struct Publisher {
    storage: Arc<dyn SitemapStorage>,
    previous: Manifest,
    today: NaiveDate,
    staged: Mutex<BTreeMap<String, Staged>>,
}

impl Publisher {
    /// Open a run against `storage`, loading the previous manifest.
    pub async fn open(storage: Arc<dyn SitemapStorage>, today: NaiveDate) -> Result<Self> {
        let previous = Manifest::load(storage.as_ref()).await?;
        Ok(Self {
            storage,
            previous,
            today,
            staged: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn previous(&self) -> &Manifest {
        &self.previous
    }

    /// Render and stage a leaf shard.
    pub async fn stage_shard(&self, shard: &Shard) -> Result<StagedDocument> {
        let body = render_urlset(&shard.records);
        self.stage(
            &shard.key,
            DocumentKind::UrlSet,
            body,
            shard.len(),
            shard.last_modified(),
        )
        .await
    }

    /// Render and stage an index whose `lastmod` is its newest child.
    pub async fn stage_index(
        &self,
        key: &str,
        entries: &[SitemapIndexEntry],
    ) -> Result<StagedDocument> {
        let newest = entries.iter().filter_map(|e| e.last_modified).max();
        let body = render_index(entries);
        self.stage(key, DocumentKind::Index, body, entries.len(), newest)
            .await
    }

    async fn stage(
        &self,
        key: &str,
        kind: DocumentKind,
        body: String,
        records: usize,
        own_last_modified: Option<NaiveDate>,
    ) -> Result<StagedDocument> {
        let digest = digest(body.as_bytes());
        let previous = self
            .previous
            .get(key)
            .filter(|entry| entry.digest == digest && entry.kind == kind);

        let unchanged = match previous {
            Some(_) => self.storage.exists(key).await?,
            None => false,
        };

        let last_modified = own_last_modified
            .or(previous.filter(|_| unchanged).map(|p| p.last_modified))
            .unwrap_or(self.today);

        if !unchanged {
            self.storage.write(key, body.as_bytes()).await?;
        }

        let document = StagedDocument {
            key: key.to_string(),
            kind,
            records,
            digest,
            last_modified,
            changed: !unchanged,
        };

        let mut staged = self
            .staged
            .lock()
            .map_err(|_| AppError::sink(key, "staging table lock poisoned"))?;
        let order = staged.len();
        if staged.contains_key(key) {
            return Err(AppError::sink(key, "document staged twice in one run"));
        }
        staged.insert(
            key.to_string(),
            Staged {
                order,
                document: document.clone(),
            },
        );
        Ok(document)
    }

    /// Forget staged documents of a scope that failed part way.
    ///
    /// Their staged bytes are dropped with the staging area; published
    /// versions, if any, stay untouched.
    pub fn withdraw(&self, documents: &[StagedDocument]) {
        if let Ok(mut staged) = self.staged.lock() {
            for document in documents {
                staged.remove(&document.key);
            }
        }
    }

    /// Every document staged so far, in staging order.
    pub fn staged(&self) -> Vec<StagedDocument> {
        let Ok(staged) = self.staged.lock() else {
            return Vec::new();
        };
        let mut all: Vec<&Staged> = staged.values().collect();
        all.sort_by_key(|s| s.order);
        all.into_iter().map(|s| s.document.clone()).collect()
    }

    /// Publish changed documents and write the new manifest.
    ///
    /// Files from the previous manifest that this run did not produce are
    /// removed only when the run is `complete` and `prune` is set; otherwise
    /// they stay on disk and remain listed in the manifest.
    pub async fn commit(
        &self,
        root_key: &str,
        complete: bool,
        prune: bool,
    ) -> Result<PublishReport> {
        let documents = self.staged();
        let mut report = PublishReport::default();

        // Shards, then indexes children-first, the root last.
        let mut order: Vec<&StagedDocument> = documents.iter().collect();
        order.sort_by_key(|d| match d.kind {
            _ if d.key == root_key => 2,
            DocumentKind::UrlSet => 0,
            DocumentKind::Index => 1,
        });

        let mut publish = Vec::new();
        for document in &order {
            match (document.kind, document.changed) {
                (DocumentKind::UrlSet, true) => report.shards_written += 1,
                (DocumentKind::UrlSet, false) => report.shards_unchanged += 1,
                (DocumentKind::Index, true) => report.indexes_written += 1,
                (DocumentKind::Index, false) => report.indexes_unchanged += 1,
            }
            if document.changed {
                publish.push(document.key.clone());
            }
        }

        let mut manifest = Manifest {
            generated_at: Some(Utc::now()),
            complete,
            files: documents
                .iter()
                .map(|d| {
                    let entry = ManifestEntry {
                        kind: d.kind,
                        digest: d.digest.clone(),
                        records: d.records,
                        last_modified: d.last_modified,
                    };
                    (d.key.clone(), entry)
                })
                .collect(),
        };
        let stale = self.previous.stale_keys(&manifest);
        let prune = complete && prune;
        if !prune {
            manifest.carry_forward(&self.previous);
        }

        let manifest_body = serde_json::to_vec_pretty(&manifest)?;
        self.storage.write(MANIFEST_KEY, &manifest_body).await?;
        publish.push(MANIFEST_KEY.to_string());

        if let Err(e) = self.storage.publish(&publish).await {
            log::error!("Publishing failed: {}", e);
            self.abort().await;
            return Err(e);
        }
        self.storage.discard().await?;

        if prune {
            for key in stale {
                self.storage.remove(&key).await?;
                log::info!("Removed stale {}", key);
                report.pruned.push(key);
            }
        } else if !stale.is_empty() {
            log::warn!("Keeping {} files from the previous run", stale.len());
        }

        Ok(report)
    }

    /// Throw away everything staged; the published tree stays as it was.
    pub async fn abort(&self) {
        if let Err(e) = self.storage.discard().await {
            log::warn!("Could not clean up staging area: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UrlRecord;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn shard(key: &str, urls: &[&str]) -> Shard {
        Shard {
            key: key.to_string(),
            records: urls.iter().map(|u| UrlRecord::new(*u)).collect(),
        }
    }

    async fn run(
        root: &std::path::Path,
        run_id: &str,
        today: NaiveDate,
        shards: &[Shard],
        complete: bool,
    ) -> (Vec<StagedDocument>, PublishReport) {
        let storage: Arc<dyn SitemapStorage> = Arc::new(LocalStorage::with_run_id(root, run_id));
        let publisher = Publisher::open(storage, today).await.unwrap();
        let mut entries = Vec::new();
        for shard in shards {
            let doc = publisher.stage_shard(shard).await.unwrap();
            entries.push(SitemapIndexEntry {
                location: format!("https://x.test/{}", doc.key),
                last_modified: Some(doc.last_modified),
            });
        }
        publisher.stage_index("sitemap.xml", &entries).await.unwrap();
        let report = publisher.commit("sitemap.xml", complete, true).await.unwrap();
        (publisher.staged(), report)
    }

    #[tokio::test]
    async fn test_unchanged_documents_keep_lastmod_and_bytes() {
        let tmp = TempDir::new().unwrap();
        let shards = [shard("a.xml", &["https://x.test/1"]), shard("b.xml", &["https://x.test/2"])];

        let (first, report) = run(tmp.path(), "1", day(1), &shards, true).await;
        assert_eq!(report.shards_written, 2);
        assert!(first.iter().all(|d| d.last_modified == day(1)));
        let root_before = std::fs::read(tmp.path().join("sitemap.xml")).unwrap();

        let changed = [shard("a.xml", &["https://x.test/1"]), shard("b.xml", &["https://x.test/3"])];
        let (second, report) = run(tmp.path(), "2", day(9), &changed, true).await;
        assert_eq!(report.shards_unchanged, 1);
        assert_eq!(report.shards_written, 1);
        let by_key = |key: &str| second.iter().find(|d| d.key == key).unwrap().clone();
        assert_eq!(by_key("a.xml").last_modified, day(1));
        assert_eq!(by_key("b.xml").last_modified, day(9));
        assert_eq!(by_key("sitemap.xml").last_modified, day(9));
        assert_ne!(std::fs::read(tmp.path().join("sitemap.xml")).unwrap(), root_before);

        let (_, report) = run(tmp.path(), "3", day(20), &changed, true).await;
        assert_eq!(report.shards_written + report.indexes_written, 0);
        assert!(!tmp.path().join(".staging-3").exists());
    }

    #[tokio::test]
    async fn test_prune_only_after_complete_run() {
        let tmp = TempDir::new().unwrap();
        let both = [shard("a.xml", &["https://x.test/1"]), shard("b.xml", &["https://x.test/2"])];
        run(tmp.path(), "1", day(1), &both, true).await;

        let only_a = [shard("a.xml", &["https://x.test/1"])];
        let (_, report) = run(tmp.path(), "2", day(2), &only_a, false).await;
        assert!(report.pruned.is_empty());
        assert!(tmp.path().join("b.xml").exists());

        let (_, report) = run(tmp.path(), "3", day(3), &only_a, true).await;
        assert_eq!(report.pruned, ["b.xml"]);
        assert!(!tmp.path().join("b.xml").exists());
    }

    #[tokio::test]
    async fn test_record_dates_win_over_run_date() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn SitemapStorage> = Arc::new(LocalStorage::with_run_id(tmp.path(), "1"));
        let publisher = Publisher::open(storage, day(30)).await.unwrap();
        let mut dated = shard("a.xml", &["https://x.test/1"]);
        dated.records[0].last_modified = Some(day(4));
        let doc = publisher.stage_shard(&dated).await.unwrap();
        assert_eq!(doc.last_modified, day(4));

        assert!(publisher.stage_shard(&dated).await.is_err());
        publisher.withdraw(&[doc]);
        assert!(publisher.staged().is_empty());
        publisher.abort().await;
        assert!(!tmp.path().join("a.xml").exists());
    }
}
