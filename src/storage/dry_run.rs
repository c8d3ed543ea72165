// src/storage/dry_run.rs

//! Storage that records what would be written and touches nothing.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::{SitemapStorage, validate_key};

#[derive(Debug, Default)]
pub struct DryRunStorage {
    writes: Mutex<Vec<(String, usize)>>,
}

impl DryRunStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(key, size in bytes)` of every write, in order.
    pub fn writes(&self) -> Vec<(String, usize)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn bytes_written(&self) -> usize {
        self.writes().iter().map(|(_, size)| size).sum()
    }
}

#[async_trait]
impl SitemapStorage for DryRunStorage {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;
        log::debug!("[dry-run] would write {} ({} bytes)", key, bytes.len());
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((key.to_string(), bytes.len()));
        }
        Ok(())
    }

    async fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    async fn publish(&self, keys: &[String]) -> Result<()> {
        log::info!("[dry-run] would publish {} documents", keys.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        log::info!("[dry-run] would remove {}", key);
        Ok(())
    }

    async fn discard(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_writes_only() {
        let storage = DryRunStorage::new();
        storage.write("sitemap.xml", b"12345").await.unwrap();
        storage.write("sitemap-pages.xml", b"123").await.unwrap();
        storage.publish(&["sitemap.xml".into()]).await.unwrap();

        assert_eq!(storage.writes().len(), 2);
        assert_eq!(storage.bytes_written(), 8);
        assert!(storage.read("sitemap.xml").await.unwrap().is_none());
        assert!(storage.write("../escape.xml", b"x").await.is_err());
    }
}
