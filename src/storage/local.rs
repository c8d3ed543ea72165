//! Local filesystem storage implementation.
//!
//! Every write lands under `{root}/.staging-{run-id}` through a uniquely named
//! temp file and a rename, so concurrent workers never share a temp path and a
//! crash never leaves a half-written document behind. Publishing renames the
//! staged files into `{root}`; staging lives inside the root so every rename
//! stays on one filesystem.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{SitemapStorage, validate_key};

/// Local filesystem storage backend.
#[derive(Debug)]
pub struct LocalStorage {
    root_dir: PathBuf,
    staging_dir: PathBuf,
    temp_seq: AtomicU64,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let run_id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            std::process::id()
        );
        Self::with_run_id(root_dir, &run_id)
    }

    /// Create a LocalStorage with an explicit staging name.
    pub fn with_run_id(root_dir: impl Into<PathBuf>, run_id: &str) -> Self {
        let root_dir = root_dir.into();
        let staging_dir = root_dir.join(format!(".staging-{run_id}"));
        Self {
            root_dir,
            staging_dir,
            temp_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn published_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root_dir.join(key))
    }

    fn staged_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.staging_dir.join(key))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to a unique temp file, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        Self::ensure_dir(path).await?;

        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()));

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl SitemapStorage for LocalStorage {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.staged_path(key)?;
        self.write_bytes(&path, bytes)
            .await
            .map_err(|e| AppError::sink(key, e))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.published_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.published_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn publish(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            let from = self.staged_path(key)?;
            let to = self.published_path(key)?;
            Self::ensure_dir(&to)
                .await
                .map_err(|e| AppError::sink(key.as_str(), e))?;
            tokio::fs::rename(&from, &to)
                .await
                .map_err(|e| AppError::sink(key.as_str(), e))?;
            log::debug!("Published {}", key);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.published_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AppError::sink(key, e)),
        }

        // Drop directories the removal emptied, stopping at the root.
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root_dir || tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }

    async fn discard(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.staging_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::sink(
                self.staging_dir.display().to_string(),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_is_invisible_until_published() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_run_id(tmp.path(), "test");

        storage.write("amatom/standoffs/index.xml", b"<x/>").await.unwrap();
        assert!(!storage.exists("amatom/standoffs/index.xml").await.unwrap());
        assert!(storage.read("amatom/standoffs/index.xml").await.unwrap().is_none());

        storage
            .publish(&["amatom/standoffs/index.xml".to_string()])
            .await
            .unwrap();
        let data = storage.read("amatom/standoffs/index.xml").await.unwrap();
        assert_eq!(data, Some(b"<x/>".to_vec()));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_run_id(tmp.path(), "test");
        storage.write("sitemap.xml", b"one").await.unwrap();
        storage.write("sitemap.xml", b"two").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(storage.staging_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["sitemap.xml"]);
    }

    #[tokio::test]
    async fn test_discard_leaves_published_tree_alone() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_run_id(tmp.path(), "a");
        storage.write("sitemap.xml", b"old").await.unwrap();
        storage.publish(&["sitemap.xml".to_string()]).await.unwrap();
        storage.discard().await.unwrap();

        let next = LocalStorage::with_run_id(tmp.path(), "b");
        next.write("sitemap.xml", b"new").await.unwrap();
        next.discard().await.unwrap();

        assert!(!next.staging_dir().exists());
        assert_eq!(next.read("sitemap.xml").await.unwrap(), Some(b"old".to_vec()));
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_dirs() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_run_id(tmp.path(), "test");
        let key = "amatom/washers/flat-washers/washers-flat-washers.xml".to_string();
        storage.write(&key, b"x").await.unwrap();
        storage.publish(std::slice::from_ref(&key)).await.unwrap();

        storage.remove(&key).await.unwrap();
        assert!(!tmp.path().join("amatom").exists());
        assert!(tmp.path().exists());
        storage.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_missing_staged_file_is_sink_error() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_run_id(tmp.path(), "test");
        let err = storage
            .publish(&["never-written.xml".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Sink { .. }));
    }
}
