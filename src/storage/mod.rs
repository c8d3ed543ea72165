//! Write collaborator: the sitemap output tree.
//!
//! Documents are written into a private staging area first and only become
//! visible when published. A reader of the output directory sees either the
//! previous or the new version of a file, never a partial one.
//!
//! ## Directory Structure
//!
//! ```text
//! {output}/
//! ├── sitemap.xml                 # Root index (published last)
//! ├── sitemap-pages.xml           # Static pages shard
//! ├── sitemap-manifest.json       # Digests and lastmod per published file
//! ├── .staging-{run-id}/          # Private until publish
//! └── amatom/
//!     └── standoffs/
//!         ├── index.xml
//!         ├── standoffs-pages.xml
//!         └── brass-standoffs/
//!             ├── index.xml
//!             ├── standoffs-brass-standoffs-1.xml
//!             └── standoffs-brass-standoffs-2.xml
//! ```

pub mod dry_run;
pub mod local;

use async_trait::async_trait;

use crate::error::{AppError, Result};

// Re-export for convenience
pub use dry_run::DryRunStorage;
pub use local::LocalStorage;

/// Trait for sitemap output backends.
///
/// Keys are `/`-separated paths relative to the output root.
#[async_trait]
pub trait SitemapStorage: Send + Sync {
    /// Atomically write a document into the staging area.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read a published document, `None` if it does not exist.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Whether a published document exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Move staged documents into the published tree, in the given order.
    async fn publish(&self, keys: &[String]) -> Result<()>;

    /// Delete a published document.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Drop the staging area and everything still in it.
    async fn discard(&self) -> Result<()>;
}

/// Reject keys that could escape the output root.
pub fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(AppError::sink(key, "invalid document key"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("sitemap.xml").is_ok());
        assert!(validate_key("amatom/standoffs/index.xml").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("amatom/../../x.xml").is_err());
        assert!(validate_key("amatom//x.xml").is_err());
    }
}
