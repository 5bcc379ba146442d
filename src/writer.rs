//! Listing row assembly and CSV output.
//!
//! Materializes matched records into the vendor's fixed-column upload CSV
//! and failed records into an audit CSV. Row assembly is two ordered
//! passes: dynamic fill from the record, then the fixed-literal overlay,
//! with the protected dispatch column cleared at the end.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

use crate::types::ComicRecord;

// -------------------------------
// Template geometry (0-based)
// -------------------------------
pub const TITLE_COLUMN_INDEX: usize = 4;
pub const PICURL_COLUMN_INDEX: usize = 46;
pub const START_PRICE_INDEX: usize = 52;
/// Must remain blank regardless of any other rule
pub const DISPATCH_TIME_MAX_INDEX: usize = 65;

const CUSTOM_LABEL_INDEX: usize = 1;
const SERIES_TITLE_INDEX: usize = 10;
const STORY_TITLE_INDEX: usize = 33;
const ISSUE_NUMBER_INDEX: usize = 43;
const QUANTITY_INDEX: usize = 57;

const CHARACTER_INDEX: usize = 11;
const PUBLISHER_INDEX: usize = 14;
const PUBLICATION_YEAR_INDEX: usize = 16;
const ERA_INDEX: usize = 18;
const GRADE_INDEX: usize = 20;
const UNIVERSE_INDEX: usize = 24;
const COVER_ARTIST_INDEX: usize = 26;

const MAX_TITLE_LEN: usize = 80;

pub const FAILURE_REASON_COLUMN: &str = "FailureReason";

const DESCRIPTION_TEXT: &str = "This listing is part of a large comic book inventory upload. To efficiently process and make \
thousands of books available, the image shown is a stock photo used for cataloging and \
identification purposes. Higher value Near Mint (NM) books and key issues will be updated with \
an image of the actual book in the order they are uploaded. If you happen to view a listing \
before we get a chance to update the image, feel free to message me for actual photos and I'll \
get them over to you as fast as I can. Buy with confidence. Books are packaged securely with \
protective materials to ensure safe delivery. Combined shipping is available when purchasing \
multiple items. Your satisfaction is important. If you are unhappy for any reason, simply \
return the comic within 30 days for a no-questions-asked refund.";

/// Fixed literal values applied last, so they win over dynamic content
const FIXED_BY_COLUMN_INDEX: &[(usize, &str)] = &[
    (0, "Add "),
    (2, "259104"),
    (9, "3000"),
    (12, "Superheroes"),
    (17, "Single Issue"),
    (19, "Comic Book"),
    (22, "US Comics"),
    (25, "Boarded"),
    (28, "Single Issue"),
    (29, "No"),
    (30, "No"),
    (31, "No"),
    (34, "Color"),
    (36, "English"),
    (37, "United States "),
    (40, "General Audience"),
    (49, DESCRIPTION_TEXT),
    (50, "FixedPrice"),
    (51, "GTC"),
    (59, "19014"),
    (73, "Single Book - (ID: 261714543021)"),
    (74, "Returns Accepted,Seller,30 Days,Money Back,In - (ID: 227092209021)"),
];

static DISPLAY_VOL_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[,()\-]*\s*\bvol\.?\s*\d+\b\)*").unwrap());
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SKU_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// The vendor upload template: an info row and a header row that precede
/// all data rows and define the column layout.
#[derive(Debug, Clone)]
pub struct ListingTemplate {
    pub info_row: Vec<String>,
    pub header_row: Vec<String>,
}

impl ListingTemplate {
    /// Load and validate a template CSV from disk
    pub fn load(path: &Path) -> Result<ListingTemplate> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read listing template: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid listing template: {}", path.display()))
    }

    /// Parse and validate template content.
    ///
    /// The four checkpoint columns anchor the fixed geometry; any mismatch
    /// is a configuration error and nothing may be written.
    pub fn parse(content: &str) -> Result<ListingTemplate> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut rows = reader.records();
        let info_row: Vec<String> = match rows.next() {
            Some(record) => record?.iter().map(|c| c.to_string()).collect(),
            None => bail!("Invalid listing template CSV (missing info/header rows)"),
        };
        let header_row: Vec<String> = match rows.next() {
            Some(record) => record?.iter().map(|c| c.to_string()).collect(),
            None => bail!("Invalid listing template CSV (missing info/header rows)"),
        };

        if info_row.len() != header_row.len() {
            bail!("Invalid listing template CSV (row length mismatch)");
        }

        let checkpoints = [
            (TITLE_COLUMN_INDEX, "*Title"),
            (PICURL_COLUMN_INDEX, "PicURL"),
            (START_PRICE_INDEX, "*StartPrice"),
            (DISPATCH_TIME_MAX_INDEX, "*DispatchTimeMax"),
        ];
        for (index, label) in checkpoints {
            if header_row.get(index).map(String::as_str) != Some(label) {
                bail!("{} column mismatch (expected at index {})", label, index);
            }
        }

        Ok(ListingTemplate {
            info_row,
            header_row,
        })
    }

    pub fn column_count(&self) -> usize {
        self.header_row.len()
    }
}

/// Series text as shown in listing titles: volume phrase stripped,
/// whitespace collapsed, trailing comma dropped
pub fn series_display_name(series_raw: &str) -> String {
    let s = DISPLAY_VOL_STRIP_RE.replace_all(series_raw.trim(), "");
    let s = MULTI_SPACE_RE.replace_all(s.trim(), " ");
    s.trim().trim_end_matches(',').trim().to_string()
}

/// Deterministic SKU: normalized series, volume, zero-padded 4-digit issue
/// plus the variant letter. `batman` vol 2 issue 12A -> `batman_v2_0012A`
pub fn custom_label(record: &ComicRecord) -> String {
    let base = SKU_SEP_RE.replace_all(&record.series_norm, "_");
    let base = base.trim_matches('_');
    format!(
        "{}_v{}_{:04}{}",
        base,
        record.volume,
        record.issue_number,
        record.issue_suffix.to_uppercase()
    )
}

/// Display title: series, volume, issue, cover suffix, year, publisher.
/// Single-spaced, control characters removed, truncated to 80 characters
/// without splitting mid-word where a space allows it.
pub fn build_title(record: &ComicRecord) -> String {
    let mut parts: Vec<String> = Vec::new();

    let series = series_display_name(&record.series_raw);
    if !series.is_empty() {
        parts.push(series);
    }
    parts.push(format!("Vol. {}", record.volume));
    parts.push(format!("#{}", record.issue_number));

    let suffix = if !record.title_suffix.trim().is_empty() {
        record.title_suffix.trim().to_string()
    } else if !record.issue_suffix.is_empty() {
        format!("Cvr {}", record.issue_suffix.to_uppercase())
    } else {
        String::new()
    };
    if !suffix.is_empty() {
        parts.push(suffix);
    }

    if !record.release_year.is_empty() {
        parts.push(format!("({})", record.release_year));
    }
    if !record.publisher.is_empty() {
        parts.push(record.publisher.clone());
    }

    let joined: String = parts.join(" ").chars().filter(|c| !c.is_control()).collect();
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_title(&collapsed)
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_LEN {
        return title.trim_end().to_string();
    }

    let cut: String = title.chars().take(MAX_TITLE_LEN).collect();
    let next_char_is_word = title
        .chars()
        .nth(MAX_TITLE_LEN)
        .map(|c| !c.is_whitespace())
        .unwrap_or(false);

    let cut = if next_char_is_word {
        // Back up to the last space unless the title is one giant token
        match cut.rfind(' ') {
            Some(pos) if pos > 0 => cut[..pos].to_string(),
            _ => cut,
        }
    } else {
        cut
    };
    cut.trim_end().to_string()
}

fn parse_money(raw: &str) -> Option<f64> {
    let s = raw.trim().replace(['$', ','], "");
    if s.is_empty() {
        return None;
    }
    s.trim().parse::<f64>().ok()
}

fn format_amount(value: f64) -> String {
    format!("{:.2}", value)
}

/// Format a raw price string as fixed 2-decimal currency, or empty when
/// unparseable
pub fn format_money(raw: &str) -> String {
    parse_money(raw).map(format_amount).unwrap_or_default()
}

/// Price-floor policy. With no minimum the raw value passes through
/// formatted; with a minimum, blank or low values are raised to it.
pub fn compute_start_price(raw: &str, min_start_price: Option<f64>) -> String {
    match min_start_price {
        None => format_money(raw),
        Some(min) => match parse_money(raw) {
            None => format_amount(min),
            Some(v) if v < min => format_amount(min),
            Some(v) => format_amount(v),
        },
    }
}

/// Build one listing row at the template's column positions.
///
/// Pass 1 fills dynamic columns from the record; pass 2 applies the fixed
/// literal overlay; the protected dispatch column is cleared last.
pub fn assemble_listing_row(
    record: &ComicRecord,
    column_count: usize,
    min_start_price: Option<f64>,
) -> Vec<String> {
    let mut out = vec![String::new(); column_count];
    let mut set = |index: usize, value: String| {
        if index < column_count {
            out[index] = value;
        }
    };

    set(CUSTOM_LABEL_INDEX, custom_label(record));
    set(TITLE_COLUMN_INDEX, build_title(record));
    set(SERIES_TITLE_INDEX, record.series_raw.clone());
    if !record.raw_title.is_empty() {
        set(STORY_TITLE_INDEX, record.raw_title.clone());
    }
    set(ISSUE_NUMBER_INDEX, record.issue_number.to_string());
    set(QUANTITY_INDEX, "1".to_string());

    set(CHARACTER_INDEX, record.characters.clone());
    set(PUBLISHER_INDEX, record.publisher.clone());
    set(PUBLICATION_YEAR_INDEX, record.release_year.clone());
    set(ERA_INDEX, record.era.clone());
    set(GRADE_INDEX, record.grade.clone());
    set(UNIVERSE_INDEX, record.universe.clone());
    set(COVER_ARTIST_INDEX, record.cover_artist.clone());

    set(
        START_PRICE_INDEX,
        compute_start_price(&record.value, min_start_price),
    );
    // PicURL always carries a trailing delimiter
    set(PICURL_COLUMN_INDEX, format!("{}|", record.image_url));

    for (index, value) in FIXED_BY_COLUMN_INDEX {
        set(*index, value.to_string());
    }
    set(DISPATCH_TIME_MAX_INDEX, String::new());

    out
}

/// Write the upload CSV: info row, header row, one row per matched record
pub fn write_listing_csv(
    path: &Path,
    template: &ListingTemplate,
    matched: &[ComicRecord],
    min_start_price: Option<f64>,
) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create listing CSV: {}", path.display()))?;

    writer.write_record(&template.info_row)?;
    writer.write_record(&template.header_row)?;

    let column_count = template.column_count();
    for record in matched {
        writer.write_record(assemble_listing_row(record, column_count, min_start_price))?;
    }

    writer.flush()?;
    Ok(matched.len())
}

/// Write the failure CSV: original catalog header plus a FailureReason
/// column, raw rows verbatim. Returns the number of rows written.
pub fn write_failure_csv(
    path: &Path,
    catalog_header: &[String],
    failed: &[ComicRecord],
) -> Result<usize> {
    if failed.is_empty() {
        return Ok(0);
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create failure CSV: {}", path.display()))?;

    let mut header: Vec<String> = catalog_header.to_vec();
    header.push(FAILURE_REASON_COLUMN.to_string());
    writer.write_record(&header)?;

    let mut written = 0;
    for comic in failed {
        if comic.source_row.is_empty() {
            continue;
        }
        let mut row = comic.source_row.clone();
        row.push(comic.failure_code().to_string());
        writer.write_record(&row)?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}
