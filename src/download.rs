//! Staged cover-image download.
//!
//! Boundary collaborator: reads a scrape export CSV and downloads each
//! cover into `<output>/<SeriesFolder>/<filename>`. The core never calls
//! this; it exists so a caller can stage local images for the strict
//! allocator. Progress is reported per item through a callback so any
//! front end can render it.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ComicListerDownloader/1.0)";
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

static FILENAME_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());
static SERIES_VOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)vol\.?\s*(\d+)").unwrap());
static SERIES_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

/// Per-item progress callback: (current, total, label)
pub type ProgressFn<'a> = &'a dyn Fn(usize, usize, &str);

/// One row of a scrape export: where to fetch a cover and what it is
#[derive(Debug, Clone)]
pub struct DownloadItem {
    pub series: String,
    pub issue: String,
    pub image_url: String,
}

#[derive(Debug, Default)]
pub struct DownloadOutcome {
    pub downloaded: usize,
    pub skipped: usize,
}

/// Load download items from a scrape export CSV
pub fn load_download_items(path: &Path) -> Result<Vec<DownloadItem>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scrape export: {}", path.display()))?;
    parse_download_items(&content)
        .with_context(|| format!("Failed to parse scrape export: {}", path.display()))
}

/// Parse scrape export content: header row with `Series`, `Issue`,
/// `Image URL` columns
pub fn parse_download_items(content: &str) -> Result<Vec<DownloadItem>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = reader.records();
    let header: Vec<String> = match rows.next() {
        Some(record) => record?.iter().map(|c| c.trim().to_string()).collect(),
        None => bail!("Scrape export has no header row"),
    };

    let col = |name: &str| header.iter().position(|h| h == name);
    let series_idx = match col("Series") {
        Some(i) => i,
        None => bail!("Scrape export missing required column: Series"),
    };
    let url_idx = match col("Image URL") {
        Some(i) => i,
        None => bail!("Scrape export missing required column: Image URL"),
    };
    let issue_idx = col("Issue");

    let mut items = Vec::new();
    for record in rows {
        let record = record?;
        let cell = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
        let series = cell(series_idx);
        let image_url = cell(url_idx);
        let issue = issue_idx.map(cell).unwrap_or_default();
        if series.is_empty() && issue.is_empty() && image_url.is_empty() {
            continue;
        }
        items.push(DownloadItem {
            series,
            issue,
            image_url,
        });
    }

    Ok(items)
}

/// Download every item into `<output_dir>/<SeriesFolder>/<filename>`.
///
/// Rows without a URL and files that already exist are skipped; download
/// errors are reported and counted as skips, never fatal.
pub fn download_images(
    items: &[DownloadItem],
    output_dir: &Path,
    progress: Option<ProgressFn>,
) -> Result<DownloadOutcome> {
    fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create download directory: {}", output_dir.display())
    })?;

    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .build()?;

    let total = items.len();
    let mut outcome = DownloadOutcome::default();

    for (idx, item) in items.iter().enumerate() {
        let label = {
            let l = format!("{} {}", item.series, item.issue);
            let l = l.trim().to_string();
            if l.is_empty() {
                "Unknown".to_string()
            } else {
                l
            }
        };
        if let Some(progress) = progress {
            progress(idx + 1, total, &label);
        }

        if item.image_url.is_empty() {
            outcome.skipped += 1;
            continue;
        }

        let series_dir = output_dir.join(build_series_folder_name(&item.series));
        fs::create_dir_all(&series_dir).with_context(|| {
            format!("Failed to create series directory: {}", series_dir.display())
        })?;

        let dest = series_dir.join(build_staged_filename(
            &item.series,
            &item.issue,
            &item.image_url,
        ));
        if dest.exists() {
            outcome.skipped += 1;
            continue;
        }

        match fetch(&client, &item.image_url) {
            Ok(bytes) => {
                fs::write(&dest, bytes)
                    .with_context(|| format!("Failed to write image: {}", dest.display()))?;
                outcome.downloaded += 1;
            }
            Err(e) => {
                eprintln!("  Error downloading {}: {}", label, e);
                outcome.skipped += 1;
            }
        }
    }

    Ok(outcome)
}

fn fetch(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send()?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

/// Reduce text to a filename-safe token: `[A-Za-z0-9]` runs joined by
/// underscores, leading `#` dropped, `Unknown` when nothing survives
pub fn sanitize_for_filename(text: &str) -> String {
    let text = text.trim().trim_start_matches('#');
    let cleaned = FILENAME_SEP_RE.replace_all(text, "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "Unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Split a series string into its base name and an optional folder tag:
/// a `V<n>` volume tag when a volume phrase is present, else a year tag.
fn parse_series_tag(series: &str) -> (String, Option<String>) {
    if let Some(caps) = SERIES_VOL_RE.captures(series) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let base = sanitize_for_filename(&series[..start]);
        return (base, Some(format!("V{}", &caps[1])));
    }
    if let Some(caps) = SERIES_YEAR_RE.captures(series) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let base = sanitize_for_filename(&series[..start]);
        return (base, Some(caps[1].to_string()));
    }
    (sanitize_for_filename(series), None)
}

/// Folder name for staged covers of one series:
/// `Wolverine, Vol. 1` -> `Wolverine_V1`; `Batman (2016)` -> `Batman_2016`
pub fn build_series_folder_name(series: &str) -> String {
    let series = if series.is_empty() { "Unknown" } else { series };
    match parse_series_tag(series) {
        (base, Some(tag)) => format!("{}_{}", base, tag),
        (base, None) => base,
    }
}

/// Staged filename: series base, folder tag, issue token, extension from
/// the URL
pub fn build_staged_filename(series: &str, issue: &str, image_url: &str) -> String {
    let series = if series.is_empty() { "Unknown" } else { series };
    let issue = if issue.is_empty() { "NoIssue" } else { issue };

    let (base, tag) = parse_series_tag(series);
    let issue_clean = sanitize_for_filename(issue);
    let ext = extension_from_url(image_url);

    let mut parts = vec![base];
    if let Some(tag) = tag {
        parts.push(tag);
    }
    parts.push(issue_clean);

    format!("{}.{}", parts.join("_"), ext)
}

/// File extension from a URL's last path segment; `jpg` when absent or
/// implausible
pub fn extension_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, ext)) = segment.rsplit_once('.') {
        if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_lowercase();
        }
    }
    "jpg".to_string()
}
