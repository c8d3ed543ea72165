// src/utils/url.rs

//! Absolute URL derivation for storefront pages and sitemap documents.

use url::Url;

use crate::error::{AppError, Result};
use crate::models::SiteConfig;

/// Builds every absolute URL the generator emits.
#[derive(Debug, Clone)]
pub struct UrlScheme {
    base: Url,
    sitemap_base: Url,
    parts_path: String,
    catalog_path: String,
}

impl UrlScheme {
    /// Create a scheme from site settings.
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let base = parse_base(&site.base_url)?;
        let sitemap_base = parse_base(site.sitemap_base())?;
        Ok(Self {
            base,
            sitemap_base,
            parts_path: site.parts_path.clone(),
            catalog_path: site.catalog_path.clone(),
        })
    }

    /// Part page: `{base}/{parts_path}/{identifier}` with the identifier escaped as one segment.
    ///
    /// The manufacturer is not part of the URL, so manufacturers sharing an
    /// identifier share the page.
    pub fn part(&self, identifier: &str) -> Result<String> {
        let prefix = split_path(&self.parts_path);
        let url = with_segments(&self.base, prefix.into_iter().chain([identifier]))?;
        Ok(url.into())
    }

    /// Category landing page.
    pub fn category(&self, manufacturer_slug: &str, category_slug: &str) -> Result<String> {
        let prefix = split_path(&self.catalog_path);
        let url = with_segments(
            &self.base,
            prefix.into_iter().chain([manufacturer_slug, category_slug]),
        )?;
        Ok(url.into())
    }

    /// Subcategory landing page.
    pub fn subcategory(
        &self,
        manufacturer_slug: &str,
        category_slug: &str,
        subcategory_slug: &str,
    ) -> Result<String> {
        let prefix = split_path(&self.catalog_path);
        let url = with_segments(
            &self.base,
            prefix
                .into_iter()
                .chain([manufacturer_slug, category_slug, subcategory_slug]),
        )?;
        Ok(url.into())
    }

    /// A configured static page path such as `/contact`.
    pub fn page(&self, path: &str) -> Result<String> {
        let url = with_segments(&self.base, split_path(path))?;
        Ok(url.into())
    }

    /// Public location of a sitemap document stored under `key`.
    pub fn document(&self, key: &str) -> Result<String> {
        let url = with_segments(&self.sitemap_base, split_path(key))?;
        Ok(url.into())
    }

    /// Inverse of [`UrlScheme::document`]; `None` for locations outside the sitemap base.
    pub fn document_key(&self, location: &str) -> Option<String> {
        let url = Url::parse(location).ok()?;
        if url.origin() != self.sitemap_base.origin() {
            return None;
        }
        let base_path = self.sitemap_base.path().trim_end_matches('/');
        let rest = url.path().strip_prefix(base_path)?.strip_prefix('/')?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_string())
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(AppError::config(format!("{raw} cannot be used as a base URL")));
    }
    Ok(url)
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn with_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut segments = segments.into_iter().peekable();
    if segments.peek().is_none() {
        return Ok(base.clone());
    }

    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| AppError::config(format!("{base} cannot be used as a base URL")))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> UrlScheme {
        UrlScheme::new(&SiteConfig {
            base_url: "https://shop.example.com".into(),
            sitemap_base_url: Some("https://shop.example.com/sitemaps/".into()),
            ..SiteConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_part_url_escapes_identifier() {
        let scheme = scheme();
        assert_eq!(
            scheme.part("4501-440-B").unwrap(),
            "https://shop.example.com/parts/4501-440-B"
        );
        assert_eq!(
            scheme.part("M3 x 5/8").unwrap(),
            "https://shop.example.com/parts/M3%20x%205%2F8"
        );
    }

    #[test]
    fn test_landing_pages() {
        let scheme = scheme();
        assert_eq!(
            scheme.category("amatom", "standoffs").unwrap(),
            "https://shop.example.com/catalog/amatom/standoffs"
        );
        assert_eq!(
            scheme
                .subcategory("amatom", "standoffs", "brass-standoffs")
                .unwrap(),
            "https://shop.example.com/catalog/amatom/standoffs/brass-standoffs"
        );
    }

    #[test]
    fn test_static_pages() {
        let scheme = scheme();
        assert_eq!(scheme.page("/").unwrap(), "https://shop.example.com/");
        assert_eq!(
            scheme.page("/contact").unwrap(),
            "https://shop.example.com/contact"
        );
    }

    #[test]
    fn test_document_round_trip() {
        let scheme = scheme();
        let location = scheme
            .document("amatom/standoffs/index.xml")
            .unwrap();
        assert_eq!(
            location,
            "https://shop.example.com/sitemaps/amatom/standoffs/index.xml"
        );
        assert_eq!(
            scheme.document_key(&location).as_deref(),
            Some("amatom/standoffs/index.xml")
        );
        assert_eq!(scheme.document_key("https://other.example.com/sitemaps/x.xml"), None);
        assert_eq!(scheme.document_key("https://shop.example.com/parts/x"), None);
    }

    #[test]
    fn test_document_without_sitemap_base() {
        let scheme = UrlScheme::new(&SiteConfig::default()).unwrap();
        let location = scheme.document("sitemap.xml").unwrap();
        assert_eq!(location, "https://www.example.com/sitemap.xml");
        assert_eq!(scheme.document_key(&location).as_deref(), Some("sitemap.xml"));
    }
}
