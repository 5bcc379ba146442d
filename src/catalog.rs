//! CLZ catalog export parsing.
//!
//! Reads the comma-separated export produced by the collection manager and
//! builds one `ComicRecord` per non-blank data row. Rows whose issue number
//! cannot be parsed are failed immediately but keep their raw row for the
//! failure CSV.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::normalize::{normalize_series, parse_catalog_issue, parse_series_and_volume};
use crate::types::{ComicRecord, FailureReason, RecordStatus};

/// CLZ exports put Value in column I; that position wins over name lookup
/// when its header cell actually says "Value".
const VALUE_COLUMN_INDEX: usize = 8;
const VALUE_COLUMN_NAME: &str = "Value";

/// Names of the two required columns, configurable per export schema
#[derive(Debug, Clone)]
pub struct CatalogColumns {
    pub series: String,
    pub issue: String,
}

impl Default for CatalogColumns {
    fn default() -> Self {
        CatalogColumns {
            series: "Series".to_string(),
            issue: "Issue Nr".to_string(),
        }
    }
}

/// Parsed catalog export: original header plus canonical records
#[derive(Debug)]
pub struct CatalogExport {
    pub header: Vec<String>,
    pub comics: Vec<ComicRecord>,
}

/// Load and parse a catalog CSV from disk (UTF-8, BOM tolerated)
pub fn load_catalog_csv(path: &Path, columns: &CatalogColumns) -> Result<CatalogExport> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog CSV: {}", path.display()))?;
    parse_catalog(&content, columns)
        .with_context(|| format!("Failed to parse catalog CSV: {}", path.display()))
}

/// Parse catalog CSV content already read into memory
pub fn parse_catalog(content: &str, columns: &CatalogColumns) -> Result<CatalogExport> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = reader.records();
    let header: Vec<String> = match rows.next() {
        Some(record) => record?.iter().map(|c| c.to_string()).collect(),
        None => bail!("Catalog CSV has no header row"),
    };

    let col_index: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect();

    for required in [&columns.series, &columns.issue] {
        if !col_index.contains_key(required.as_str()) {
            bail!("Catalog CSV missing required column: {}", required);
        }
    }

    let mut comics: Vec<ComicRecord> = Vec::new();

    for record in rows {
        let record = record?;
        let row: Vec<String> = record.iter().map(|c| c.to_string()).collect();

        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let cell = |name: &str| -> String {
            col_index
                .get(name)
                .and_then(|&i| row.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let series_raw = cell(&columns.series);
        let issue_raw = cell(&columns.issue);

        let (series_clean, volume) = parse_series_and_volume(&series_raw);
        let series_norm = normalize_series(&series_clean);

        let variant = cell("Variant").to_uppercase();
        let value = fixed_position_value(&header, &row).unwrap_or_else(|| cell("Value"));
        let raw_title = cell("Title");
        let publisher = cell("Publisher");
        let release_year = cell("Release Year");
        let grade = cell("Grade");
        let era = cell("Era");
        let universe = cell("Universe");
        let cover_artist = cell("Cover Artist");
        let characters = cell("Characters");

        let mut comic = ComicRecord {
            id: comics.len() as u32 + 1,
            series_raw: series_clean,
            series_norm,
            volume,
            issue_number: 0,
            issue_suffix: String::new(),
            raw_title,
            source_row: row,
            publisher,
            release_year,
            grade,
            era,
            universe,
            cover_artist,
            characters,
            value,
            status: RecordStatus::Pending,
            failure_reason: None,
            allocated_image_ids: Vec::new(),
            image_url: String::new(),
            unused_image_urls: String::new(),
            title_suffix: String::new(),
        };

        match parse_catalog_issue(&issue_raw) {
            Some((number, suffix)) => {
                comic.issue_number = number;
                // An explicit Variant column wins over the suffix embedded
                // in the issue token.
                comic.issue_suffix = if variant.is_empty() { suffix } else { variant };
            }
            None => {
                comic.status = RecordStatus::Failed;
                comic.failure_reason = Some(FailureReason::UnparseableIssue);
            }
        }

        comics.push(comic);
    }

    Ok(CatalogExport { header, comics })
}

/// Strict index-based Value read, only honored when the header at that
/// position actually carries the expected label.
fn fixed_position_value(header: &[String], row: &[String]) -> Option<String> {
    if header.get(VALUE_COLUMN_INDEX)?.trim() != VALUE_COLUMN_NAME {
        return None;
    }
    let value = row.get(VALUE_COLUMN_INDEX)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_columns() -> CatalogColumns {
        CatalogColumns::default()
    }

    #[test]
    fn test_parse_basic_rows() {
        let csv = "Series,Issue Nr,Title\nBatman, Vol. 2,12A,Death of the Family\nChew,3,\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        // Note: the unquoted comma splits "Batman, Vol. 2" across two cells,
        // so only the quoted form carries the volume.
        assert_eq!(export.comics.len(), 2);

        let quoted = "Series,Issue Nr,Title\n\"Batman, Vol. 2\",12A,Death of the Family\n";
        let export = parse_catalog(quoted, &default_columns()).unwrap();
        let comic = &export.comics[0];
        assert_eq!(comic.series_raw, "Batman");
        assert_eq!(comic.series_norm, "batman");
        assert_eq!(comic.volume, 2);
        assert_eq!(comic.issue_number, 12);
        assert_eq!(comic.issue_suffix, "A");
        assert_eq!(comic.raw_title, "Death of the Family");
        assert_eq!(comic.status, RecordStatus::Pending);
    }

    #[test]
    fn test_bom_is_tolerated() {
        let csv = "\u{feff}Series,Issue Nr\nChew,3\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        assert_eq!(export.header[0], "Series");
        assert_eq!(export.comics.len(), 1);
    }

    #[test]
    fn test_missing_required_column_fails_fast() {
        let err = parse_catalog("Series,Grade\nChew,9.8\n", &default_columns()).unwrap_err();
        assert!(err.to_string().contains("Issue Nr"));
    }

    #[test]
    fn test_blank_rows_skipped() {
        let csv = "Series,Issue Nr\nChew,3\n,\n  , \nSaga,1\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        assert_eq!(export.comics.len(), 2);
        assert_eq!(export.comics[1].id, 2);
        assert_eq!(export.comics[1].series_raw, "Saga");
    }

    #[test]
    fn test_unparseable_issue_fails_with_row_preserved() {
        let csv = "Series,Issue Nr,Grade\nChew,,9.8\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        let comic = &export.comics[0];
        assert_eq!(comic.status, RecordStatus::Failed);
        assert_eq!(comic.failure_reason, Some(FailureReason::UnparseableIssue));
        assert_eq!(comic.source_row, vec!["Chew", "", "9.8"]);
    }

    #[test]
    fn test_variant_column_overrides_issue_suffix() {
        let csv = "Series,Issue Nr,Variant\nChew,3a,c\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        assert_eq!(export.comics[0].issue_suffix, "C");

        let csv = "Series,Issue Nr,Variant\nChew,3a,\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        assert_eq!(export.comics[0].issue_suffix, "A");
    }

    #[test]
    fn test_value_prefers_fixed_position() {
        // Column index 8 is named Value; a second Value-ish lookup by name
        // would find the same cell, but the positional read must win even
        // when another column claims the name first.
        let header = "Series,Issue Nr,A,B,C,D,E,F,Value";
        let csv = format!("{}\nChew,3,,,,,,,4.50\n", header);
        let export = parse_catalog(&csv, &default_columns()).unwrap();
        assert_eq!(export.comics[0].value, "4.50");
    }

    #[test]
    fn test_value_falls_back_to_name_lookup() {
        // Value column present but not at the fixed position
        let csv = "Series,Issue Nr,Value\nChew,3,2.25\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        assert_eq!(export.comics[0].value, "2.25");
    }

    #[test]
    fn test_missing_optional_columns_yield_empty() {
        let csv = "Series,Issue Nr\nChew,3\n";
        let export = parse_catalog(csv, &default_columns()).unwrap();
        let comic = &export.comics[0];
        assert!(comic.publisher.is_empty());
        assert!(comic.grade.is_empty());
        assert!(comic.value.is_empty());
    }

    #[test]
    fn test_configured_column_names() {
        let columns = CatalogColumns {
            series: "Title".to_string(),
            issue: "Number".to_string(),
        };
        let csv = "Title,Number\nChew,3\n";
        let export = parse_catalog(csv, &columns).unwrap();
        assert_eq!(export.comics[0].series_raw, "Chew");
        assert_eq!(export.comics[0].issue_number, 3);
    }
}
