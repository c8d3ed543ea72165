// src/sitemap/shard.rs

//! Capacity-bounded partitioning of a record stream into shards.
//!
//! ```text
//! Accumulating --(record arrives at capacity)--> Flush `-n` --> Accumulating
//! Accumulating --(stream ends)--> Flush (unnumbered if nothing was flushed before)
//! ```
//!
//! Shard boundaries follow the stream itself, never a precomputed count, and
//! every flush is staged immediately through the [`Publisher`].

use crate::error::Result;
use crate::models::{Shard, UrlRecord};
use crate::sitemap::publish::{Publisher, StagedDocument};

/// Streams records of one scope into shards named after `stem`.
///
/// A stem of `amatom/standoffs/brass-standoffs/standoffs-brass-standoffs`
/// yields `...-1.xml`, `...-2.xml` when split and `....xml` otherwise.
pub struct ShardWriter<'a> {
    publisher: &'a Publisher,
    stem: String,
    capacity: usize,
    buffer: Vec<UrlRecord>,
    written: Vec<StagedDocument>,
    records: usize,
}

impl<'a> ShardWriter<'a> {
    pub fn new(publisher: &'a Publisher, stem: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            publisher,
            stem: stem.into(),
            capacity,
            buffer: Vec::with_capacity(capacity.min(4096)),
            written: Vec::new(),
            records: 0,
        }
    }

    /// Add one record, flushing a full buffer first.
    pub async fn push(&mut self, record: UrlRecord) -> Result<()> {
        if self.buffer.len() >= self.capacity {
            let index = self.written.len() + 1;
            self.flush(Some(index)).await?;
        }
        self.buffer.push(record);
        self.records += 1;
        Ok(())
    }

    pub async fn extend(&mut self, records: impl IntoIterator<Item = UrlRecord>) -> Result<()> {
        for record in records {
            self.push(record).await?;
        }
        Ok(())
    }

    /// Records accepted so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Flush the tail and return every shard in order. An empty stream yields none.
    pub async fn finish(mut self) -> Result<Vec<StagedDocument>> {
        if !self.buffer.is_empty() {
            let index = if self.written.is_empty() {
                None
            } else {
                Some(self.written.len() + 1)
            };
            self.flush(index).await?;
        }
        Ok(self.written)
    }

    /// Stop without flushing the tail; returns shards already staged.
    pub fn abandon(self) -> Vec<StagedDocument> {
        self.written
    }

    async fn flush(&mut self, index: Option<usize>) -> Result<()> {
        let key = match index {
            Some(n) => format!("{}-{}.xml", self.stem, n),
            None => format!("{}.xml", self.stem),
        };
        let shard = Shard {
            key,
            records: std::mem::take(&mut self.buffer),
        };
        log::debug!("Flushing {} ({} URLs)", shard.key, shard.len());
        let document = self.publisher.stage_shard(&shard).await?;
        self.written.push(document);
        Ok(())
    }
}
