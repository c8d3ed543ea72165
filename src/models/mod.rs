// src/models/mod.rs

//! Domain models for the sitemap generator.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod catalog;
mod config;
mod hierarchy;
mod sitemap;

// Re-export all public types
pub use catalog::{CatalogEntity, HierarchyRow, Scope, parse_last_modified};
pub use config::{
    Config, Credentials, ENV_API_KEY, ENV_API_URL, FallbackCategory, HierarchyConfig, Layout,
    LoggingConfig, OutputConfig, PageHints, RetryConfig, SiteConfig, SlugConflictPolicy,
    SourceConfig, StaticPage,
};
pub use hierarchy::{
    Category, Hierarchy, HierarchyNode, HierarchyOrigin, SlugConflict, Subcategory,
};
pub use sitemap::{
    ChangeFrequency, MAX_URLS_PER_SITEMAP, Shard, SitemapIndexEntry, UrlRecord,
};
