//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ChangeFrequency, MAX_URLS_PER_SITEMAP};

/// Environment variable holding the catalog API base URL.
pub const ENV_API_URL: &str = "CATALOG_API_URL";

/// Environment variable holding the catalog API key.
pub const ENV_API_KEY: &str = "CATALOG_API_KEY";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Catalog data source shape and request behavior
    #[serde(default)]
    pub source: SourceConfig,

    /// Retry schedule for page reads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Category/subcategory discovery
    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    /// Storefront URL scheme and static pages
    #[serde(default)]
    pub site: SiteConfig,

    /// Output tree settings
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.output.shard_capacity == 0 || self.output.shard_capacity > MAX_URLS_PER_SITEMAP {
            return Err(AppError::validation(format!(
                "output.shard_capacity must be between 1 and {MAX_URLS_PER_SITEMAP}, got {}",
                self.output.shard_capacity
            )));
        }
        if self.output.workers == 0 {
            return Err(AppError::validation("output.workers must be > 0"));
        }
        if self.output.dir.trim().is_empty() {
            return Err(AppError::validation("output.dir is empty"));
        }
        if self.source.page_size == 0 {
            return Err(AppError::validation("source.page_size must be > 0"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.max_concurrent == 0 {
            return Err(AppError::validation("source.max_concurrent must be > 0"));
        }
        for (name, column) in [
            ("source.table", &self.source.table),
            ("source.identifier_column", &self.source.identifier_column),
            ("source.manufacturer_column", &self.source.manufacturer_column),
            ("source.category_column", &self.source.category_column),
            ("source.subcategory_column", &self.source.subcategory_column),
        ] {
            if column.trim().is_empty() {
                return Err(AppError::validation(format!("{name} is empty")));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be >= 1"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(AppError::validation(
                "retry.max_delay_ms must be >= retry.base_delay_ms",
            ));
        }
        if self.hierarchy.batch_size == 0 {
            return Err(AppError::validation("hierarchy.batch_size must be > 0"));
        }
        if self.hierarchy.row_ceiling == 0 {
            return Err(AppError::validation("hierarchy.row_ceiling must be > 0"));
        }
        if self.site.default_manufacturer.trim().is_empty() {
            return Err(AppError::validation("site.default_manufacturer is empty"));
        }
        validate_http_url("site.base_url", &self.site.base_url)?;
        validate_http_url("site.sitemap_base_url", self.site.sitemap_base())?;
        Ok(())
    }
}

fn validate_http_url(name: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value)
        .map_err(|e| AppError::validation(format!("{name} is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::validation(format!(
            "{name} must be an absolute http(s) URL"
        )));
    }
    Ok(())
}

/// Catalog table shape and HTTP behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Table (or view) holding one row per part
    #[serde(default = "defaults::table")]
    pub table: String,

    /// Unique, sortable column used as the pagination cursor
    #[serde(default = "defaults::identifier_column")]
    pub identifier_column: String,

    #[serde(default = "defaults::manufacturer_column")]
    pub manufacturer_column: String,

    #[serde(default = "defaults::category_column")]
    pub category_column: String,

    #[serde(default = "defaults::subcategory_column")]
    pub subcategory_column: String,

    /// Optional timestamp column for `<lastmod>`
    #[serde(default = "defaults::last_modified_column")]
    pub last_modified_column: Option<String>,

    /// Rows per catalog page read
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum spacing between request starts in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum requests in flight across all workers
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table: defaults::table(),
            identifier_column: defaults::identifier_column(),
            manufacturer_column: defaults::manufacturer_column(),
            category_column: defaults::category_column(),
            subcategory_column: defaults::subcategory_column(),
            last_modified_column: defaults::last_modified_column(),
            page_size: defaults::page_size(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Retry schedule for a single page read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            max_delay_ms: defaults::max_delay(),
        }
    }
}

/// What to do when sibling names collapse to one slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlugConflictPolicy {
    /// Keep the first name, suffix the rest with `-2`, `-3`, ...
    #[default]
    Suffix,
    /// Drop every conflicting sibling and report it
    Skip,
}

/// Category/subcategory discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Rows per enumeration page
    #[serde(default = "defaults::hierarchy_batch")]
    pub batch_size: usize,

    /// Stop enumerating after this many rows and report the tree as truncated
    #[serde(default = "defaults::row_ceiling")]
    pub row_ceiling: usize,

    #[serde(default)]
    pub slug_conflict: SlugConflictPolicy,

    /// Offline hierarchy used when enumeration fails
    #[serde(default)]
    pub fallback: Vec<FallbackCategory>,
}

impl HierarchyConfig {
    /// Fallback categories configured for a manufacturer.
    pub fn fallback_for(&self, manufacturer: &str) -> Vec<FallbackCategory> {
        self.fallback
            .iter()
            .filter(|f| f.manufacturer == manufacturer)
            .cloned()
            .collect()
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::hierarchy_batch(),
            row_ceiling: defaults::row_ceiling(),
            slug_conflict: SlugConflictPolicy::default(),
            fallback: Vec::new(),
        }
    }
}

/// One category of the offline fallback hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackCategory {
    pub manufacturer: String,
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

/// Changefreq/priority applied to a kind of page.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PageHints {
    #[serde(default)]
    pub change_frequency: Option<ChangeFrequency>,
    #[serde(default)]
    pub priority: Option<f32>,
}

impl PageHints {
    fn new(change_frequency: ChangeFrequency, priority: f32) -> Self {
        Self {
            change_frequency: Some(change_frequency),
            priority: Some(priority),
        }
    }
}

/// A non-catalog storefront page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPage {
    /// Path relative to `site.base_url`, e.g. `/contact`
    pub path: String,

    #[serde(default)]
    pub change_frequency: Option<ChangeFrequency>,

    #[serde(default)]
    pub priority: Option<f32>,
}

/// Storefront URL scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public storefront origin
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Where the sitemap files are served; defaults to `base_url`
    #[serde(default)]
    pub sitemap_base_url: Option<String>,

    /// Manufacturer used when none is given on the command line
    #[serde(default = "defaults::default_manufacturer")]
    pub default_manufacturer: String,

    /// Path prefix of part pages
    #[serde(default = "defaults::parts_path")]
    pub parts_path: String,

    /// Path prefix of category and subcategory landing pages
    #[serde(default = "defaults::catalog_path")]
    pub catalog_path: String,

    #[serde(default = "defaults::static_pages")]
    pub static_pages: Vec<StaticPage>,

    #[serde(default = "defaults::part_hints")]
    pub part: PageHints,

    #[serde(default = "defaults::category_hints")]
    pub category: PageHints,

    #[serde(default = "defaults::subcategory_hints")]
    pub subcategory: PageHints,
}

impl SiteConfig {
    pub fn sitemap_base(&self) -> &str {
        self.sitemap_base_url.as_deref().unwrap_or(&self.base_url)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            sitemap_base_url: None,
            default_manufacturer: defaults::default_manufacturer(),
            parts_path: defaults::parts_path(),
            catalog_path: defaults::catalog_path(),
            static_pages: defaults::static_pages(),
            part: defaults::part_hints(),
            category: defaults::category_hints(),
            subcategory: defaults::subcategory_hints(),
        }
    }
}

/// Shape of the index tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Subcategory indexes for split scopes, landing pages per category
    #[default]
    Tiered,
    /// Shards hang directly off the category index, landing pages in the static shard
    Flat,
}

/// Output tree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the sitemap tree is published into
    #[serde(default = "defaults::output_dir")]
    pub dir: String,

    /// Maximum records per shard and entries per index
    #[serde(default = "defaults::shard_capacity")]
    pub shard_capacity: usize,

    #[serde(default)]
    pub layout: Layout,

    /// Categories processed concurrently
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Remove files from the previous run that are no longer referenced
    #[serde(default = "defaults::enabled")]
    pub prune_stale: bool,

    /// Walk the published tree and check reachability after each run
    #[serde(default = "defaults::enabled")]
    pub verify: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: defaults::output_dir(),
            shard_capacity: defaults::shard_capacity(),
            layout: Layout::default(),
            workers: defaults::workers(),
            prune_stale: defaults::enabled(),
            verify: defaults::enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Catalog API connection parameters, read from the environment only.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_url: String,
    pub api_key: String,
}

impl Credentials {
    /// Read `CATALOG_API_URL` and `CATALOG_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    AppError::config(format!("required environment variable {key} is not set"))
                })
        };
        let api_url = read(ENV_API_URL)?;
        let api_key = read(ENV_API_KEY)?;
        validate_http_url(ENV_API_URL, &api_url).map_err(|e| AppError::config(e.to_string()))?;
        Ok(Self { api_url, api_key })
    }
}

mod defaults {
    use super::{ChangeFrequency, PageHints, StaticPage};

    // Source defaults
    pub fn table() -> String {
        "parts".into()
    }
    pub fn identifier_column() -> String {
        "part_number".into()
    }
    pub fn manufacturer_column() -> String {
        "manufacturer".into()
    }
    pub fn category_column() -> String {
        "category".into()
    }
    pub fn subcategory_column() -> String {
        "subcategory".into()
    }
    pub fn last_modified_column() -> Option<String> {
        Some("updated_at".into())
    }
    pub fn page_size() -> usize {
        1000
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        50
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay() -> u64 {
        500
    }
    pub fn max_delay() -> u64 {
        5_000
    }

    // Hierarchy defaults
    pub fn hierarchy_batch() -> usize {
        1000
    }
    pub fn row_ceiling() -> usize {
        500_000
    }

    // Site defaults
    pub fn base_url() -> String {
        "https://www.example.com".into()
    }
    pub fn default_manufacturer() -> String {
        "Amatom".into()
    }
    pub fn parts_path() -> String {
        "parts".into()
    }
    pub fn catalog_path() -> String {
        "catalog".into()
    }
    pub fn static_pages() -> Vec<StaticPage> {
        let page = |path: &str, freq, priority| StaticPage {
            path: path.into(),
            change_frequency: Some(freq),
            priority: Some(priority),
        };
        vec![
            page("/", ChangeFrequency::Daily, 1.0),
            page("/catalog", ChangeFrequency::Weekly, 0.9),
            page("/rfq", ChangeFrequency::Monthly, 0.5),
            page("/about", ChangeFrequency::Yearly, 0.3),
            page("/contact", ChangeFrequency::Yearly, 0.3),
        ]
    }
    pub fn part_hints() -> PageHints {
        PageHints::new(ChangeFrequency::Monthly, 0.6)
    }
    pub fn category_hints() -> PageHints {
        PageHints::new(ChangeFrequency::Weekly, 0.8)
    }
    pub fn subcategory_hints() -> PageHints {
        PageHints::new(ChangeFrequency::Weekly, 0.7)
    }

    // Output defaults
    pub fn output_dir() -> String {
        "public/sitemaps".into()
    }
    pub fn shard_capacity() -> usize {
        super::MAX_URLS_PER_SITEMAP
    }
    pub fn workers() -> usize {
        1
    }
    pub fn enabled() -> bool {
        true
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
