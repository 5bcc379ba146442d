//! Series, volume, and issue-token normalization.
//!
//! Everything that turns free-text CLZ strings or image filenames into the
//! strict match key lives here. All functions are pure.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static VOL_PHRASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bvol\.?\s*(\d+)\b").unwrap());
static VOL_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[,()]*\s*\bvol\.?\s*\d+\b\)*").unwrap());
static VOL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^v(\d+)$").unwrap());
static YEAR_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(19\d{2}|20\d{2})$").unwrap());
static ISSUE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#?(\d+)([A-Za-z]*)$").unwrap());
static CATALOG_ISSUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*([A-Za-z]?)").unwrap());

/// Normalize a series name into a stable strict-match key.
///
/// Lower-cases, maps underscores and hyphens to spaces, drops every other
/// non-alphanumeric character, and collapses whitespace. Idempotent.
pub fn normalize_series(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let s = text.to_lowercase().replace(['_', '-'], " ");
    let s = NON_ALNUM_RE.replace_all(&s, "");
    MULTI_SPACE_RE.replace_all(&s, " ").trim().to_string()
}

/// Split a raw series string into display text and volume number.
///
/// Detects a `vol`/`vol.` phrase (case-insensitive) and extracts its number;
/// the phrase and any punctuation hugging it are stripped from the display
/// text. Volume defaults to 1.
pub fn parse_series_and_volume(series_raw: &str) -> (String, u32) {
    if series_raw.is_empty() {
        return (String::new(), 1);
    }

    let volume = VOL_PHRASE_RE
        .captures(series_raw)
        .and_then(|c| c[1].parse::<u32>().ok())
        .unwrap_or(1);

    let clean = VOL_STRIP_RE.replace_all(series_raw, "");
    let clean = MULTI_SPACE_RE.replace_all(clean.trim(), " ").to_string();
    (clean.trim().to_string(), volume)
}

/// Parse a strict issue token: optional leading `#`, digits, optional
/// trailing variant letters. Suffix is upper-cased.
pub fn parse_issue_token(token: &str) -> Option<(u32, String)> {
    let caps = ISSUE_TOKEN_RE.captures(token)?;
    let number = caps[1].parse::<u32>().ok()?;
    Some((number, caps[2].to_uppercase()))
}

/// Lenient issue parse for catalog cells: finds the first run of digits and
/// at most one following variant letter, tolerating `#` and whitespace.
pub fn parse_catalog_issue(issue_raw: &str) -> Option<(u32, String)> {
    let caps = CATALOG_ISSUE_RE.captures(issue_raw.trim())?;
    let number = caps[1].parse::<u32>().ok()?;
    Some((number, caps[2].to_uppercase()))
}

/// Parse an image filename into `(series_norm, volume, issue_number, suffix)`.
///
/// Supports `Series_V1_233A.png`, `Series_2016_12C.webp` (year token), and
/// `Series_233A.png` (no volume token, defaults to volume 1). The token
/// after the `v<digits>` marker (or the last token without one) must be an
/// issue token; year tokens are dropped from the series text.
pub fn parse_image_filename(file_name: &str) -> Option<(String, u32, u32, String)> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    if stem.is_empty() {
        return None;
    }

    let parts: Vec<&str> = stem.split('_').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return None;
    }

    let mut vol_idx: Option<usize> = None;
    let mut volume = 1u32;
    for (i, part) in parts.iter().enumerate() {
        if let Some(caps) = VOL_TOKEN_RE.captures(part) {
            vol_idx = Some(i);
            volume = caps[1].parse::<u32>().ok()?;
            break;
        }
    }

    let issue_idx = match vol_idx {
        Some(i) => i + 1,
        None => parts.len() - 1,
    };
    if issue_idx >= parts.len() {
        return None;
    }

    let (issue_number, issue_suffix) = parse_issue_token(parts[issue_idx])?;

    let series_tokens: Vec<&str> = match vol_idx {
        Some(i) => parts[..i].to_vec(),
        None => parts[..parts.len() - 1].to_vec(),
    };
    let series_tokens: Vec<&str> = series_tokens
        .into_iter()
        .filter(|t| !YEAR_TOKEN_RE.is_match(t))
        .collect();
    if series_tokens.is_empty() {
        return None;
    }

    let series_norm = normalize_series(&series_tokens.join(" "));
    Some((series_norm, volume, issue_number, issue_suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_series_idempotent() {
        let once = normalize_series("Spider-Man_2016");
        assert_eq!(once, "spider man 2016");
        assert_eq!(normalize_series(&once), once);
    }

    #[test]
    fn test_normalize_series_case_and_separators() {
        assert_eq!(
            normalize_series("Spider-Man_2016"),
            normalize_series("SPIDER MAN 2016")
        );
        assert_eq!(normalize_series("  Batman:  Year One! "), "batman year one");
        // Year tokens are kept; only parse_image_filename strips them.
        assert_eq!(normalize_series("Batman 2016"), "batman 2016");
    }

    #[test]
    fn test_parse_series_and_volume() {
        assert_eq!(
            parse_series_and_volume("Batman, Vol. 2"),
            ("Batman".to_string(), 2)
        );
        assert_eq!(
            parse_series_and_volume("Wolverine Vol 3"),
            ("Wolverine".to_string(), 3)
        );
        assert_eq!(
            parse_series_and_volume("Saga (Vol. 1)"),
            ("Saga".to_string(), 1)
        );
        assert_eq!(parse_series_and_volume("Chew"), ("Chew".to_string(), 1));
        assert_eq!(parse_series_and_volume(""), (String::new(), 1));
    }

    #[test]
    fn test_parse_issue_token() {
        assert_eq!(parse_issue_token("12"), Some((12, String::new())));
        assert_eq!(parse_issue_token("12A"), Some((12, "A".to_string())));
        assert_eq!(parse_issue_token("#7b"), Some((7, "B".to_string())));
        assert_eq!(parse_issue_token("001B"), Some((1, "B".to_string())));
        assert_eq!(parse_issue_token("A12"), None);
        assert_eq!(parse_issue_token(""), None);
        assert_eq!(parse_issue_token("cover"), None);
    }

    #[test]
    fn test_parse_catalog_issue() {
        assert_eq!(parse_catalog_issue("12A"), Some((12, "A".to_string())));
        assert_eq!(parse_catalog_issue("#12"), Some((12, String::new())));
        assert_eq!(parse_catalog_issue(" 12 a "), Some((12, "A".to_string())));
        assert_eq!(parse_catalog_issue(""), None);
        assert_eq!(parse_catalog_issue("n/a"), None);
    }

    #[test]
    fn test_parse_image_filename_with_volume_token() {
        assert_eq!(
            parse_image_filename("Batman_V2_12A.webp"),
            Some(("batman".to_string(), 2, 12, "A".to_string()))
        );
        assert_eq!(
            parse_image_filename("Spider_Man_V1_233.png"),
            Some(("spider man".to_string(), 1, 233, String::new()))
        );
    }

    #[test]
    fn test_parse_image_filename_year_token_stripped() {
        assert_eq!(
            parse_image_filename("Batman_2016_12C.webp"),
            Some(("batman".to_string(), 1, 12, "C".to_string()))
        );
    }

    #[test]
    fn test_parse_image_filename_defaults_to_volume_one() {
        assert_eq!(
            parse_image_filename("Chew_19A.webp"),
            Some(("chew".to_string(), 1, 19, "A".to_string()))
        );
    }

    #[test]
    fn test_parse_image_filename_rejects_bad_shapes() {
        // Single token
        assert_eq!(parse_image_filename("Batman.png"), None);
        // Issue token does not parse
        assert_eq!(parse_image_filename("Batman_cover.png"), None);
        // Nothing left after stripping the year token
        assert_eq!(parse_image_filename("2016_12.png"), None);
    }

    #[test]
    fn test_parse_image_filename_deterministic() {
        let a = parse_image_filename("Saga_V3_7B.jpg");
        let b = parse_image_filename("Saga_V3_7B.jpg");
        assert_eq!(a, b);
    }
}
