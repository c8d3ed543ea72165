// src/services/cursor.rs

//! Keyset pagination over one scope of the catalog.
//!
//! Pages are keyed by the last identifier seen, never by offset. Each read asks
//! for one row more than the page size; that lookahead row proves another page
//! exists, so a scope of `k` rows costs `max(1, ceil(k / page_size))` reads.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{CatalogEntity, Scope};
use crate::source::{CatalogSource, Governor, RetryPolicy};

/// One page of a scope.
#[derive(Debug, Clone, Default)]
pub struct CursorPage {
    /// At most `page_size` entities, identifiers strictly advancing
    pub entities: Vec<CatalogEntity>,

    /// Cursor for the next read; `None` once the scope is drained
    pub next_cursor: Option<String>,
}

impl CursorPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Reads scopes page by page through the shared retry policy and governor.
#[derive(Clone)]
pub struct CatalogCursorReader {
    source: Arc<dyn CatalogSource>,
    policy: RetryPolicy,
    governor: Arc<Governor>,
    page_size: usize,
}

impl CatalogCursorReader {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        policy: RetryPolicy,
        governor: Arc<Governor>,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            policy,
            governor,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read the page of `scope` that follows `after`.
    ///
    /// Rows equal to the cursor and repeated identifiers are dropped, so a
    /// backend with duplicate keys or an inclusive cursor cannot make the
    /// reader loop or emit an entity twice.
    pub async fn read(&self, scope: &Scope, after: Option<&str>) -> Result<CursorPage> {
        let limit = self.page_size + 1;
        let context = match after {
            Some(cursor) => format!("{scope} after '{cursor}'"),
            None => format!("{scope} from start"),
        };

        let rows = self
            .policy
            .run(&self.governor, &context, || {
                self.source.fetch_entities(scope, after, limit)
            })
            .await
            .map_err(|e| AppError::source(&context, e))?;

        let more = rows.len() >= limit;
        let mut entities: Vec<CatalogEntity> = Vec::with_capacity(rows.len());
        for row in rows {
            if Some(row.identifier.as_str()) == after {
                continue;
            }
            if entities
                .last()
                .is_some_and(|prev| prev.identifier == row.identifier)
            {
                log::debug!("{}: duplicate identifier '{}' skipped", scope, row.identifier);
                continue;
            }
            entities.push(row);
        }
        entities.truncate(self.page_size);

        if !more {
            return Ok(CursorPage {
                entities,
                next_cursor: None,
            });
        }

        match entities.last() {
            Some(last) => {
                let next_cursor = Some(last.identifier.clone());
                Ok(CursorPage {
                    entities,
                    next_cursor,
                })
            }
            None => Err(AppError::source(
                context,
                "full page did not advance the cursor",
            )),
        }
    }

    /// Lazy, resumable sequence of pages for `scope`.
    pub fn stream(&self, scope: Scope) -> ScopeStream<'_> {
        ScopeStream {
            reader: self,
            scope,
            cursor: None,
            done: false,
            pages_read: 0,
        }
    }

    /// Drain a whole scope into memory.
    pub async fn read_all(&self, scope: &Scope) -> Result<Vec<CatalogEntity>> {
        let mut stream = self.stream(scope.clone());
        let mut all = Vec::new();
        while let Some(batch) = stream.next_batch().await? {
            all.extend(batch);
        }
        Ok(all)
    }
}

/// Pull-based page iterator over one scope.
///
/// A failed read leaves the cursor where it was, so the stream can be retried
/// or rebuilt later with [`ScopeStream::resume_from`].
pub struct ScopeStream<'a> {
    reader: &'a CatalogCursorReader,
    scope: Scope,
    cursor: Option<String>,
    done: bool,
    pages_read: usize,
}

impl ScopeStream<'_> {
    /// Continue after `cursor` instead of the start of the scope.
    pub fn resume_from(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self.done = false;
        self
    }

    /// Next batch, or `None` when the scope is drained.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<CatalogEntity>>> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .reader
            .read(&self.scope, self.cursor.as_deref())
            .await?;
        self.pages_read += 1;

        match page.next_cursor {
            Some(next) => self.cursor = Some(next),
            None => {
                self.done = true;
                if let Some(last) = page.entities.last() {
                    self.cursor = Some(last.identifier.clone());
                }
            }
        }
        Ok(Some(page.entities))
    }

    /// Last identifier handed out.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
