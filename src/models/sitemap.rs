// src/models/sitemap.rs

//! Sitemap protocol records and documents.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Hard limit on entries per sitemap document imposed by crawlers.
pub const MAX_URLS_PER_SITEMAP: usize = 50_000;

/// `<changefreq>` values of the sitemap protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `<url>` entry of a leaf sitemap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Absolute page URL
    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_frequency: Option<ChangeFrequency>,

    /// Between 0.0 and 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f32>,
}

impl UrlRecord {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            last_modified: None,
            change_frequency: None,
            priority: None,
        }
    }

    pub fn with_last_modified(mut self, date: Option<NaiveDate>) -> Self {
        self.last_modified = date;
        self
    }

    pub fn with_change_frequency(mut self, freq: Option<ChangeFrequency>) -> Self {
        self.change_frequency = freq;
        self
    }

    /// Set the priority, clamped into `0.0..=1.0`.
    pub fn with_priority(mut self, priority: Option<f32>) -> Self {
        self.priority = priority.map(|p| p.clamp(0.0, 1.0));
        self
    }
}

/// A capacity-bounded leaf document.
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    /// Output path relative to the sitemap root, e.g. `amatom/standoffs/brass-standoffs/standoffs-brass-standoffs-1.xml`
    pub key: String,

    /// Records in stream order
    pub records: Vec<UrlRecord>,
}

impl Shard {
    /// Final path segment of the key.
    pub fn filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest record date, if any record carries one.
    pub fn last_modified(&self) -> Option<NaiveDate> {
        self.records.iter().filter_map(|r| r.last_modified).max()
    }
}

/// One `<sitemap>` entry of an index document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapIndexEntry {
    /// Absolute URL of a shard or child index
    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_clamped() {
        let record = UrlRecord::new("https://example.com/").with_priority(Some(1.7));
        assert_eq!(record.priority, Some(1.0));
        let record = UrlRecord::new("https://example.com/").with_priority(Some(-0.2));
        assert_eq!(record.priority, Some(0.0));
    }

    #[test]
    fn test_shard_filename_and_lastmod() {
        let d1 = NaiveDate::from_ymd_opt(2025, 1, 2);
        let d2 = NaiveDate::from_ymd_opt(2025, 6, 30);
        let shard = Shard {
            key: "amatom/standoffs/nylon-standoffs/standoffs-nylon-standoffs.xml".into(),
            records: vec![
                UrlRecord::new("https://example.com/a").with_last_modified(d2),
                UrlRecord::new("https://example.com/b").with_last_modified(d1),
                UrlRecord::new("https://example.com/c"),
            ],
        };
        assert_eq!(shard.filename(), "standoffs-nylon-standoffs.xml");
        assert_eq!(shard.last_modified(), d2);
        assert_eq!(shard.len(), 3);
    }

    #[test]
    fn test_change_frequency_serde() {
        let json = serde_json::to_string(&ChangeFrequency::Weekly).unwrap();
        assert_eq!(json, "\"weekly\"");
        let freq: ChangeFrequency = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(freq, ChangeFrequency::Monthly);
    }
}
