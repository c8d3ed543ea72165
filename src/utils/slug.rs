// src/utils/slug.rs

//! Display name to URL-safe identifier.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());
static HYPHENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Derive a slug from a display name.
///
/// Lower-cases, trims, turns whitespace runs into single hyphens, strips
/// everything outside `[a-z0-9-]`, collapses repeated hyphens and trims
/// hyphens from both ends. The result is stable under re-application:
/// `slugify(&slugify(x)) == slugify(x)`.
///
/// ```
/// use catalog_sitemap::utils::slugify;
///
/// assert_eq!(slugify("  Brass  Standoffs "), "brass-standoffs");
/// assert_eq!(slugify("M3 x 0.5 / Hex"), "m3-x-05-hex");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    let stripped = DISALLOWED.replace_all(&hyphenated, "");
    let collapsed = HYPHENS.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_names() {
        assert_eq!(slugify("Standoffs"), "standoffs");
        assert_eq!(slugify("Brass Standoffs"), "brass-standoffs");
        assert_eq!(slugify("Captive Screw Washers"), "captive-screw-washers");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        assert_eq!(slugify("Nylon\tStandoffs\n"), "nylon-standoffs");
        assert_eq!(slugify("Hex - Male/Female"), "hex-malefemale");
        assert_eq!(slugify("Spacers & Standoffs"), "spacers-standoffs");
        assert_eq!(slugify("--already--hyphenated--"), "already-hyphenated");
    }

    #[test]
    fn test_degenerate_input() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("   "), "");
        assert_eq!(slugify("日本語"), "");
        assert_eq!(slugify("Ünïcode Wäshers"), "ncode-wshers");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "",
            " ",
            "Brass Standoffs",
            "already-hyphenated",
            "-leading and trailing-",
            "a -- b",
            "Ünïcode Wäshers",
            "日本語 Parts",
            "M3 x 0.5 / Hex",
            "UPPER lower MiXeD",
            "tab\tand\nnewline",
            "émigré---café",
        ];
        for sample in samples {
            let once = slugify(sample);
            assert_eq!(slugify(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_output_alphabet() {
        let slug = slugify("Weird!! @Name#  (v2) — final");
        assert!(
            slug.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
        assert!(!slug.contains("--"));
        assert!(!slug.starts_with('-') && !slug.ends_with('-'));
    }
}
