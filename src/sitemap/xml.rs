// src/sitemap/xml.rs

//! Sitemap protocol XML: rendering for both document kinds and a tolerant
//! reader used by verification.

use std::fmt::Write;

use chrono::NaiveDate;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{SitemapIndexEntry, UrlRecord};

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Render a leaf `urlset` document.
pub fn render_urlset(records: &[UrlRecord]) -> String {
    let mut out = String::with_capacity(64 + records.len() * 96);
    out.push_str(XML_DECLARATION);
    let _ = write!(out, "\n<urlset xmlns=\"{SITEMAP_NS}\">\n");
    for record in records {
        out.push_str("  <url>\n");
        let _ = writeln!(out, "    <loc>{}</loc>", escape(record.location.as_str()));
        if let Some(date) = record.last_modified {
            let _ = writeln!(out, "    <lastmod>{}</lastmod>", format_date(date));
        }
        if let Some(freq) = record.change_frequency {
            let _ = writeln!(out, "    <changefreq>{freq}</changefreq>");
        }
        if let Some(priority) = record.priority {
            let _ = writeln!(out, "    <priority>{priority:.1}</priority>");
        }
        out.push_str("  </url>\n");
    }
    out.push_str("</urlset>\n");
    out
}

/// Render a `sitemapindex` document.
pub fn render_index(entries: &[SitemapIndexEntry]) -> String {
    let mut out = String::with_capacity(64 + entries.len() * 96);
    out.push_str(XML_DECLARATION);
    let _ = write!(out, "\n<sitemapindex xmlns=\"{SITEMAP_NS}\">\n");
    for entry in entries {
        out.push_str("  <sitemap>\n");
        let _ = writeln!(out, "    <loc>{}</loc>", escape(entry.location.as_str()));
        if let Some(date) = entry.last_modified {
            let _ = writeln!(out, "    <lastmod>{}</lastmod>", format_date(date));
        }
        out.push_str("  </sitemap>\n");
    }
    out.push_str("</sitemapindex>\n");
    out
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The two sitemap document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    UrlSet,
    Index,
}

/// The parts of a sitemap document verification cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub kind: DocumentKind,

    /// `<loc>` values in document order
    pub locations: Vec<String>,
}

/// Parse a sitemap document. `key` only labels errors.
pub fn parse_document(key: &str, xml: &str) -> Result<ParsedDocument> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut kind = None;
    let mut in_loc = false;
    let mut locations = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"urlset" if kind.is_none() => kind = Some(DocumentKind::UrlSet),
                b"sitemapindex" if kind.is_none() => kind = Some(DocumentKind::Index),
                b"loc" => in_loc = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_loc => {
                let text = e.unescape().map_err(|err| AppError::xml(key, err))?;
                locations.push(text.trim().to_string());
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AppError::xml(
                    key,
                    format!("at byte {}: {}", reader.error_position(), e),
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    match kind {
        Some(kind) => Ok(ParsedDocument { kind, locations }),
        None => Err(AppError::xml(key, "neither <urlset> nor <sitemapindex> found")),
    }
}
