//! Canonical data model shared by the matching and CSV-building pipeline

use serde::Serialize;
use std::collections::HashMap;

/// Lifecycle status of a catalog record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Matched,
    Failed,
}

/// Machine-readable reason a record was routed to the failed partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The issue column held no parseable issue number
    UnparseableIssue,
    /// Strict allocation found no unused image for the record's key
    NoMatchingImage,
    /// Grouped allocation could not pick images without variant ambiguity
    NoSafeVariantMatch,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::UnparseableIssue => "UNPARSEABLE_ISSUE",
            FailureReason::NoMatchingImage => "NO_MATCHING_IMAGE",
            FailureReason::NoSafeVariantMatch => "NO_SAFE_VARIANT_MATCH",
        }
    }
}

/// Strict join key between catalog records and image assets.
///
/// The issue suffix (cover variant letter) is deliberately excluded;
/// variants are disambiguated after key matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub series_norm: String,
    pub volume: u32,
    pub issue_number: u32,
}

/// One row of catalog metadata from a CLZ export.
///
/// Status transitions are copy-on-write: `with_image`, `with_failure` and
/// `with_allocated_image` return new values, so a record can never be
/// aliased across the matched and failed partitions.
#[derive(Debug, Clone)]
pub struct ComicRecord {
    /// 1-based sequence number in input order
    pub id: u32,
    /// Series text with the volume phrase stripped (display form)
    pub series_raw: String,
    /// Normalized match key component, always derived from `series_raw`
    pub series_norm: String,
    pub volume: u32,
    pub issue_number: u32,
    /// Cover variant letter(s), upper-cased; not part of the match key
    pub issue_suffix: String,
    /// Story title from the catalog's Title column
    pub raw_title: String,
    /// Original CSV row, preserved verbatim for failure reporting
    pub source_row: Vec<String>,

    // Optional CLZ metadata consumed by the listing writer
    pub publisher: String,
    pub release_year: String,
    pub grade: String,
    pub era: String,
    pub universe: String,
    pub cover_artist: String,
    pub characters: String,
    pub value: String,

    pub status: RecordStatus,
    pub failure_reason: Option<FailureReason>,
    /// Image asset ids assigned by the strict allocator
    pub allocated_image_ids: Vec<String>,
    /// Hosted image URL assigned by the grouped allocator
    pub image_url: String,
    /// Pipe-delimited unused candidate URLs, diagnostic only
    pub unused_image_urls: String,
    /// Display title suffix, e.g. "Cvr B" in multi-variant groups
    pub title_suffix: String,
}

impl ComicRecord {
    pub fn match_key(&self) -> MatchKey {
        MatchKey {
            series_norm: self.series_norm.clone(),
            volume: self.volume,
            issue_number: self.issue_number,
        }
    }

    /// Return a copy marked MATCHED with a hosted image URL
    pub fn with_image(&self, image_url: &str, title_suffix: &str) -> ComicRecord {
        ComicRecord {
            status: RecordStatus::Matched,
            image_url: image_url.to_string(),
            title_suffix: title_suffix.to_string(),
            ..self.clone()
        }
    }

    /// Return a copy marked MATCHED with a local image asset id attached
    pub fn with_allocated_image(&self, image_id: &str) -> ComicRecord {
        let mut ids = self.allocated_image_ids.clone();
        ids.push(image_id.to_string());
        ComicRecord {
            status: RecordStatus::Matched,
            allocated_image_ids: ids,
            ..self.clone()
        }
    }

    /// Return a copy marked FAILED with failure metadata
    pub fn with_failure(&self, reason: FailureReason, unused_urls: &str) -> ComicRecord {
        ComicRecord {
            status: RecordStatus::Failed,
            failure_reason: Some(reason),
            unused_image_urls: unused_urls.to_string(),
            ..self.clone()
        }
    }

    /// Reason code written to the failure CSV
    pub fn failure_code(&self) -> &'static str {
        self.failure_reason.map(|r| r.as_str()).unwrap_or("UNKNOWN")
    }
}

/// One physical or hosted cover image
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub id: String,
    pub filename: String,
    pub path: String,

    pub series_norm: String,
    pub volume: u32,
    pub issue_number: u32,
    pub issue_suffix: String,

    /// Flips false -> true exactly once, only inside the allocator
    pub used: bool,
}

impl ImageAsset {
    pub fn match_key(&self) -> MatchKey {
        MatchKey {
            series_norm: self.series_norm.clone(),
            volume: self.volume,
            issue_number: self.issue_number,
        }
    }
}

/// Hosted cover image candidate used by the grouped allocator
#[derive(Debug, Clone)]
pub struct HostedImage {
    pub url: String,
    /// Variant letter(s) parsed from the filename, upper-cased
    pub variant: String,
}

/// Output of the strict allocator: partitions plus audit ledgers
#[derive(Debug)]
pub struct AllocationResult {
    pub matched: Vec<ComicRecord>,
    pub failed: Vec<ComicRecord>,
    /// image asset id -> record id
    pub ledger_image_to_comic: HashMap<String, u32>,
    /// record id -> image asset ids
    pub ledger_comic_to_images: HashMap<u32, Vec<String>>,
    /// All assets, with `used` flags reflecting the allocation
    pub images: Vec<ImageAsset>,
}

/// Per-failure detail carried into the workflow report
#[derive(Debug, Clone, Serialize)]
pub struct FailureDetail {
    pub record_id: u32,
    pub reason: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unused_image_urls: String,
}

/// Aggregate counters for one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    /// UTC timestamp in RFC 3339 format
    pub generated_at: String,
    pub total_rows: usize,
    pub images_parsed: usize,
    pub matched: usize,
    pub failed: usize,
    pub unused_images: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureDetail>,
}
