// src/pipeline/summary.rs

//! End-of-run summary.

use std::fmt;
use std::time::Duration;

use crate::models::Scope;
use crate::sitemap::{PublishReport, VerificationReport};

/// Why a scope is missing from the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Catalog reads kept failing after retries
    ReadFailed(String),
    /// The manufacturer's hierarchy could not be enumerated
    HierarchyFailed(String),
    /// Dropped by the `skip` slug conflict policy
    SlugConflict(String),
    /// The name produced an empty slug
    EmptySlug,
    /// The run was cancelled before the scope started
    Cancelled,
}

impl SkipReason {
    /// Failures, as opposed to deliberate omissions.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ReadFailed(_) | Self::HierarchyFailed(_) | Self::Cancelled
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
            Self::HierarchyFailed(e) => write!(f, "hierarchy unavailable: {e}"),
            Self::SlugConflict(slug) => write!(f, "slug conflict on '{slug}'"),
            Self::EmptySlug => f.write_str("name has no usable slug"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A scope left out of the tree, with enough context to re-run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFailure {
    pub scope: Scope,

    /// Last identifier read before the failure
    pub cursor: Option<String>,

    pub reason: SkipReason,
}

impl fmt::Display for ScopeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope)?;
        if let Some(cursor) = &self.cursor {
            write!(f, " (after '{cursor}')")?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Figure a drained total is reconciled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountBasis {
    /// Non-blank rows seen while enumerating the hierarchy
    Enumerated,
    /// Count-only query result
    Counted,
}

impl fmt::Display for CountBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enumerated => f.write_str("enumerated"),
            Self::Counted => f.write_str("counted"),
        }
    }
}

/// A scope whose drained parts disagree with the catalog's own figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMismatch {
    pub scope: Scope,
    pub basis: CountBasis,
    pub expected: u64,
    pub drained: u64,
}

impl fmt::Display for CountMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} parts drained, {} {}",
            self.scope, self.drained, self.expected, self.basis
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub dry_run: bool,
    pub cancelled: bool,

    pub manufacturers: usize,
    pub categories: usize,
    pub subcategories: usize,

    /// Catalog entities read
    pub entities: usize,

    /// URL records across all shards, landing and static pages included
    pub url_records: usize,

    pub publish: PublishReport,

    pub skipped: Vec<ScopeFailure>,

    /// Category index keys left out of the root
    pub omitted_categories: Vec<String>,

    /// Manufacturers whose hierarchy hit the row ceiling
    pub truncated: Vec<String>,

    /// Manufacturers built from the offline fallback hierarchy
    pub fallback: Vec<String>,

    /// Drained totals that disagree with enumeration or count queries
    pub mismatches: Vec<CountMismatch>,

    /// Part URLs already listed for an earlier manufacturer and left out
    pub repeated_parts: usize,

    pub verification: Option<VerificationReport>,

    pub elapsed: Duration,
}

impl RunSummary {
    pub fn failed_scopes(&self) -> usize {
        self.skipped.iter().filter(|s| s.reason.is_failure()).count()
    }

    /// No failed scope, no truncation and no cancellation.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed_scopes() == 0 && self.truncated.is_empty()
    }

    pub fn verified(&self) -> bool {
        self.verification.as_ref().is_none_or(|v| v.is_ok())
    }

    /// Problems that make a strict run fail.
    pub fn strict_failures(&self) -> usize {
        self.failed_scopes()
            + self.truncated.len()
            + usize::from(self.cancelled && self.failed_scopes() == 0)
            + usize::from(!self.verified())
            + self.mismatches.len()
    }

    /// Log the summary block.
    pub fn log(&self) {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        log::info!("[SUMMARY]{}", mode);
        log::info!(
            "  Hierarchy: {} manufacturers, {} categories, {} subcategories",
            self.manufacturers,
            self.categories,
            self.subcategories
        );
        log::info!("  Entities processed: {}", self.entities);
        log::info!("  URL records: {}", self.url_records);
        log::info!(
            "  Shards: {} written, {} unchanged",
            self.publish.shards_written,
            self.publish.shards_unchanged
        );
        log::info!(
            "  Indexes: {} written, {} unchanged",
            self.publish.indexes_written,
            self.publish.indexes_unchanged
        );
        if !self.publish.pruned.is_empty() {
            log::info!("  Stale files removed: {}", self.publish.pruned.len());
        }
        for name in &self.fallback {
            log::warn!("  {}: built from the offline fallback hierarchy", name);
        }
        for name in &self.truncated {
            log::warn!("  {}: hierarchy truncated at the row ceiling", name);
        }
        for failure in &self.skipped {
            log::warn!("  Skipped {}", failure);
        }
        for key in &self.omitted_categories {
            log::warn!("  Omitted {}", key);
        }
        for mismatch in &self.mismatches {
            log::warn!("  Count mismatch {}", mismatch);
        }
        if self.repeated_parts > 0 {
            log::warn!(
                "  Part URLs shared with an earlier manufacturer: {}",
                self.repeated_parts
            );
        }
        if self.cancelled {
            log::warn!("  Run was cancelled; unfinished scopes were left out");
        }
        match &self.verification {
            Some(report) if report.is_ok() => log::info!(
                "  Verification: OK ({} indexes, {} shards, {} URLs)",
                report.indexes,
                report.shards,
                report.urls
            ),
            Some(report) => {
                log::error!("  Verification: FAILED ({} problems)", report.problems());
                for key in report.dangling.iter().take(10) {
                    log::error!("    dangling reference: {}", key);
                }
                for key in report.duplicate_references.iter().take(10) {
                    log::error!("    referenced twice: {}", key);
                }
                for url in report.duplicate_urls.iter().take(10) {
                    log::error!("    duplicate URL: {}", url);
                }
                for (key, size) in report.over_capacity.iter().take(10) {
                    log::error!("    over capacity: {} ({} entries)", key, size);
                }
                for url in report.missing.iter().take(10) {
                    log::error!("    unreachable: {}", url);
                }
                for url in report.unexpected.iter().take(10) {
                    log::error!("    unexpected: {}", url);
                }
            }
            None => log::info!("  Verification: skipped"),
        }
        log::info!("  Elapsed: {:.1}s", self.elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(reason: SkipReason) -> ScopeFailure {
        ScopeFailure {
            scope: Scope::subcategory("Amatom", "Washers", "Captive Screw Washers"),
            cursor: Some("W-000010".into()),
            reason,
        }
    }

    #[test]
    fn test_failure_display_names_scope_and_cursor() {
        let text = failure(SkipReason::ReadFailed("503".into())).to_string();
        assert_eq!(
            text,
            "Amatom / Washers / Captive Screw Washers (after 'W-000010'): read failed: 503"
        );
    }

    #[test]
    fn test_completeness() {
        let mut summary = RunSummary::default();
        assert!(summary.is_complete());
        assert_eq!(summary.strict_failures(), 0);

        summary.skipped.push(failure(SkipReason::SlugConflict("flat-washers".into())));
        assert!(summary.is_complete());

        summary.skipped.push(failure(SkipReason::ReadFailed("timeout".into())));
        assert!(!summary.is_complete());
        assert_eq!(summary.strict_failures(), 1);

        summary.truncated.push("Amatom".into());
        assert_eq!(summary.strict_failures(), 2);
    }

    #[test]
    fn test_count_mismatch_is_strict_failure() {
        let mut summary = RunSummary::default();
        let mismatch = CountMismatch {
            scope: Scope::subcategory("Amatom", "Standoffs", "Brass Standoffs"),
            basis: CountBasis::Enumerated,
            expected: 6,
            drained: 5,
        };
        assert_eq!(
            mismatch.to_string(),
            "Amatom / Standoffs / Brass Standoffs: 5 parts drained, 6 enumerated"
        );

        summary.mismatches.push(mismatch);
        assert!(summary.is_complete());
        assert_eq!(summary.strict_failures(), 1);

        summary.repeated_parts = 3;
        assert_eq!(summary.strict_failures(), 1);
    }
}
