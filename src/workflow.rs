//! End-to-end workflows: catalog + images in, CSVs + report out.
//!
//! The build workflow pairs hosted image URLs with catalog records under
//! the grouped variant-safety rules; the local match workflow runs the
//! strict allocator over a directory of image files. Both leave every
//! input row with exactly one terminal status and return the aggregate
//! counters for display.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::allocate::{allocate_images, group_by_key, select_for_group};
use crate::catalog::{load_catalog_csv, CatalogColumns};
use crate::images::{index_images, parse_hosted_url, scan_image_dir};
use crate::types::{
    ComicRecord, FailureDetail, FailureReason, HostedImage, MatchKey, RecordStatus, WorkflowReport,
};
use crate::writer::{write_failure_csv, write_listing_csv, ListingTemplate};

pub const LISTING_CSV_NAME: &str = "ebay_ready.csv";
pub const FAILED_CSV_NAME: &str = "failed.csv";
pub const REPORT_JSON_NAME: &str = "report.json";

/// Configuration for the listing build workflow
#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub catalog_csv: PathBuf,
    pub template_csv: PathBuf,
    pub urls_file: PathBuf,
    pub output_dir: PathBuf,
    pub min_start_price: Option<f64>,
    pub columns: CatalogColumns,
}

/// Partitioned outcome of pairing records with hosted images
#[derive(Debug)]
pub struct ListingOutcome {
    pub matched: Vec<ComicRecord>,
    pub failed: Vec<ComicRecord>,
    pub images_parsed: usize,
    pub unused_images: usize,
}

/// Pair catalog records with hosted image URLs.
///
/// Records arriving FAILED pass through untouched. Pending records are
/// grouped by consecutive match key and each group either matches as a
/// whole or fails as a whole; partitions come back in input order.
pub fn build_listing_rows(comics: &[ComicRecord], hosted_urls: &[String]) -> ListingOutcome {
    let mut images_by_key: HashMap<MatchKey, Vec<HostedImage>> = HashMap::new();
    for url in hosted_urls {
        if let Some((key, image)) = parse_hosted_url(url) {
            images_by_key.entry(key).or_default().push(image);
        }
    }
    for images in images_by_key.values_mut() {
        images.sort_by(|a, b| (&a.variant, &a.url).cmp(&(&b.variant, &b.url)));
    }
    let images_parsed: usize = images_by_key.values().map(Vec::len).sum();

    let mut outcomes: HashMap<u32, ComicRecord> = HashMap::new();
    let mut used_urls: HashSet<String> = HashSet::new();

    let mut pending: Vec<ComicRecord> = Vec::new();
    for comic in comics {
        if comic.status == RecordStatus::Failed {
            outcomes.insert(comic.id, comic.clone());
        } else {
            pending.push(comic.clone());
        }
    }

    for (key, group) in group_by_key(&pending) {
        let empty: Vec<HostedImage> = Vec::new();
        let images = images_by_key.get(&key).unwrap_or(&empty);

        match select_for_group(images, group.len()) {
            Some(selected) => {
                let multi_variant_group = group.len() > 1;
                for (comic, image) in group.iter().zip(selected) {
                    used_urls.insert(image.url.clone());
                    let suffix = if multi_variant_group && !image.variant.is_empty() {
                        format!("Cvr {}", image.variant)
                    } else {
                        String::new()
                    };
                    outcomes.insert(comic.id, comic.with_image(&image.url, &suffix));
                }
            }
            None => {
                let unused: Vec<&str> = images
                    .iter()
                    .filter(|img| !used_urls.contains(&img.url))
                    .map(|img| img.url.as_str())
                    .collect();
                let unused = unused.join("|");
                for comic in &group {
                    outcomes.insert(
                        comic.id,
                        comic.with_failure(FailureReason::NoSafeVariantMatch, &unused),
                    );
                }
            }
        }
    }

    let mut matched = Vec::new();
    let mut failed = Vec::new();
    for comic in comics {
        // Every input row has exactly one terminal outcome
        let outcome = outcomes.remove(&comic.id).unwrap_or_else(|| comic.clone());
        match outcome.status {
            RecordStatus::Matched => matched.push(outcome),
            _ => failed.push(outcome),
        }
    }

    let unused_images = if hosted_urls.is_empty() {
        0
    } else {
        hosted_urls.len().saturating_sub(used_urls.len())
    };

    ListingOutcome {
        matched,
        failed,
        images_parsed,
        unused_images,
    }
}

/// Run the full listing build: parse, allocate, write both CSVs and the
/// JSON report. Configuration errors abort before any output exists.
pub fn run_listing_workflow(config: &ListingConfig) -> Result<WorkflowReport> {
    let template = ListingTemplate::load(&config.template_csv)?;
    let export = load_catalog_csv(&config.catalog_csv, &config.columns)?;
    let hosted_urls = load_hosted_urls(&config.urls_file)?;

    let outcome = build_listing_rows(&export.comics, &hosted_urls);

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    write_listing_csv(
        &config.output_dir.join(LISTING_CSV_NAME),
        &template,
        &outcome.matched,
        config.min_start_price,
    )?;
    write_failure_csv(
        &config.output_dir.join(FAILED_CSV_NAME),
        &export.header,
        &outcome.failed,
    )?;

    let report = WorkflowReport {
        generated_at: Utc::now().to_rfc3339(),
        total_rows: export.comics.len(),
        images_parsed: outcome.images_parsed,
        matched: outcome.matched.len(),
        failed: outcome.failed.len(),
        unused_images: outcome.unused_images,
        failures: failure_details(&outcome.failed),
    };
    write_report(&config.output_dir.join(REPORT_JSON_NAME), &report)?;

    Ok(report)
}

/// Run the strict local-image allocation and write the failure CSV plus
/// report into the output directory.
pub fn run_local_match(
    catalog_csv: &Path,
    images_dir: &Path,
    output_dir: &Path,
    columns: &CatalogColumns,
) -> Result<WorkflowReport> {
    let export = load_catalog_csv(catalog_csv, columns)?;
    let paths = scan_image_dir(images_dir)?;
    let assets = index_images(&paths);
    let images_parsed = assets.len();

    let result = allocate_images(&export.comics, assets);

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    write_failure_csv(&output_dir.join(FAILED_CSV_NAME), &export.header, &result.failed)?;

    let unused_images = result.images.iter().filter(|img| !img.used).count();
    let report = WorkflowReport {
        generated_at: Utc::now().to_rfc3339(),
        total_rows: export.comics.len(),
        images_parsed,
        matched: result.matched.len(),
        failed: result.failed.len(),
        unused_images,
        failures: failure_details(&result.failed),
    };
    write_report(&output_dir.join(REPORT_JSON_NAME), &report)?;

    Ok(report)
}

fn failure_details(failed: &[ComicRecord]) -> Vec<FailureDetail> {
    failed
        .iter()
        .map(|comic| FailureDetail {
            record_id: comic.id,
            reason: comic.failure_code().to_string(),
            unused_image_urls: comic.unused_image_urls.clone(),
        })
        .collect()
}

fn write_report(path: &Path, report: &WorkflowReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}

/// Read hosted image URLs from a text file (one per line, `#` comments)
/// or a JSON file (array of URLs, or object keyed by image id whose
/// values are URLs or arrays of URLs).
pub fn load_hosted_urls(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hosted URL list: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        parse_urls_json(&content)
            .with_context(|| format!("Failed to parse hosted URL JSON: {}", path.display()))
    } else {
        Ok(parse_urls_text(&content))
    }
}

fn parse_urls_text(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn parse_urls_json(content: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let mut urls = Vec::new();

    let mut push = |v: &serde_json::Value| {
        if let Some(s) = v.as_str() {
            if !s.trim().is_empty() {
                urls.push(s.trim().to_string());
            }
        }
    };

    match &value {
        serde_json::Value::Array(items) => {
            for item in items {
                push(item);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                match item {
                    serde_json::Value::Array(inner) => {
                        for v in inner {
                            push(v);
                        }
                    }
                    other => push(other),
                }
            }
        }
        _ => bail!("Hosted URL JSON must be an array or an object"),
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_catalog;
    use crate::writer::{build_title, custom_label};

    fn columns() -> CatalogColumns {
        CatalogColumns::default()
    }

    #[test]
    fn test_build_listing_rows_end_to_end() {
        let csv = "Series,Issue Nr,Release Year\n\"Batman, Vol. 2\",12A,2012\n";
        let export = parse_catalog(csv, &columns()).unwrap();
        let urls = vec!["https://cdn.example.com/Batman_V2_12A.webp".to_string()];

        let outcome = build_listing_rows(&export.comics, &urls);
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.failed.len(), 0);
        assert_eq!(outcome.images_parsed, 1);
        assert_eq!(outcome.unused_images, 0);

        let matched = &outcome.matched[0];
        assert_eq!(matched.status, RecordStatus::Matched);
        assert_eq!(matched.series_norm, "batman");
        assert_eq!(matched.volume, 2);
        assert_eq!(matched.issue_number, 12);
        assert_eq!(matched.image_url, "https://cdn.example.com/Batman_V2_12A.webp");
        assert_eq!(custom_label(matched), "batman_v2_0012A");
        assert_eq!(build_title(matched), "Batman Vol. 2 #12 Cvr A (2012)");
    }

    #[test]
    fn test_build_listing_rows_unparseable_issue_passes_through() {
        let csv = "Series,Issue Nr\nChew,\n";
        let export = parse_catalog(csv, &columns()).unwrap();
        let urls = vec!["https://cdn.example.com/Chew_1.webp".to_string()];

        let outcome = build_listing_rows(&export.comics, &urls);
        assert_eq!(outcome.matched.len(), 0);
        assert_eq!(outcome.failed.len(), 1);
        let failed = &outcome.failed[0];
        assert_eq!(failed.failure_reason, Some(FailureReason::UnparseableIssue));
        assert_eq!(failed.source_row, vec!["Chew", ""]);
    }

    #[test]
    fn test_build_listing_rows_no_images_for_key() {
        let csv = "Series,Issue Nr\nChew,3\n";
        let export = parse_catalog(csv, &columns()).unwrap();

        let outcome = build_listing_rows(&export.comics, &[]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(
            outcome.failed[0].failure_reason,
            Some(FailureReason::NoSafeVariantMatch)
        );
        assert_eq!(outcome.unused_images, 0);
    }

    #[test]
    fn test_build_listing_rows_ambiguous_variants() {
        let csv = "Series,Issue Nr,Variant\nX,5,A\nX,5,B\n";
        let export = parse_catalog(csv, &columns()).unwrap();
        let urls = vec![
            "https://cdn.example.com/X_5A.jpg".to_string(),
            "https://cdn.example.com/X_5A.png".to_string(),
        ];

        let outcome = build_listing_rows(&export.comics, &urls);
        assert_eq!(outcome.matched.len(), 0);
        assert_eq!(outcome.failed.len(), 2);
        for failed in &outcome.failed {
            assert_eq!(
                failed.failure_reason,
                Some(FailureReason::NoSafeVariantMatch)
            );
            assert_eq!(
                failed.unused_image_urls,
                "https://cdn.example.com/X_5A.jpg|https://cdn.example.com/X_5A.png"
            );
        }
        assert_eq!(outcome.unused_images, 2);
    }

    #[test]
    fn test_build_listing_rows_variant_group() {
        let csv = "Series,Issue Nr,Variant\nX,5,A\nX,5,B\n";
        let export = parse_catalog(csv, &columns()).unwrap();
        let urls = vec![
            "https://cdn.example.com/X_5B.jpg".to_string(),
            "https://cdn.example.com/X_5A.jpg".to_string(),
        ];

        let outcome = build_listing_rows(&export.comics, &urls);
        assert_eq!(outcome.matched.len(), 2);
        // Candidates sort by variant, so cover A pairs with the first record
        assert_eq!(
            outcome.matched[0].image_url,
            "https://cdn.example.com/X_5A.jpg"
        );
        assert_eq!(outcome.matched[0].title_suffix, "Cvr A");
        assert_eq!(
            outcome.matched[1].image_url,
            "https://cdn.example.com/X_5B.jpg"
        );
        assert_eq!(outcome.matched[1].title_suffix, "Cvr B");
    }

    #[test]
    fn test_build_listing_rows_single_record_no_cvr_suffix() {
        let csv = "Series,Issue Nr\nChew,3\n";
        let export = parse_catalog(csv, &columns()).unwrap();
        let urls = vec!["https://cdn.example.com/Chew_3A.jpg".to_string()];

        let outcome = build_listing_rows(&export.comics, &urls);
        assert_eq!(outcome.matched.len(), 1);
        // Lone-record groups don't get an allocation suffix
        assert_eq!(outcome.matched[0].title_suffix, "");
    }

    #[test]
    fn test_parse_urls_text() {
        let urls = parse_urls_text("https://a/X_1.jpg\n\n# comment\n  https://b/X_2.jpg  \n");
        assert_eq!(urls, vec!["https://a/X_1.jpg", "https://b/X_2.jpg"]);
    }

    #[test]
    fn test_parse_urls_json_array() {
        let urls = parse_urls_json(r#"["https://a/X_1.jpg", "https://b/X_2.jpg"]"#).unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_parse_urls_json_object() {
        let urls = parse_urls_json(
            r#"{"img-1": "https://a/X_1.jpg", "img-2": ["https://b/X_2.jpg", "https://c/X_3.jpg"]}"#,
        )
        .unwrap();
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn test_parse_urls_json_rejects_scalars() {
        assert!(parse_urls_json(r#""https://a/X_1.jpg""#).is_err());
    }
}
