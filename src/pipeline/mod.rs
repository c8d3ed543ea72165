//! Pipeline entry points.
//!
//! - `run_generate`: Discover the hierarchy, shard every scope and publish the sitemap tree

pub mod generate;
pub mod summary;

pub use generate::{GenerateOptions, STATIC_STEM, run_generate};
pub use summary::{CountBasis, CountMismatch, RunSummary, ScopeFailure, SkipReason};
