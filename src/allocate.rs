//! Image allocation.
//!
//! Two modes share the strict match key:
//! - `allocate_images`: first-unused assignment of local assets, one per
//!   record, with audit ledgers;
//! - `select_for_group`: variant-safe selection of hosted candidates for a
//!   run of records sharing a key. Ambiguity is never silently resolved.

use std::collections::HashMap;

use crate::types::{
    AllocationResult, ComicRecord, FailureReason, HostedImage, ImageAsset, MatchKey, RecordStatus,
};

/// Assign at most one unused asset to each record under strict key match.
///
/// Buckets are sorted by (suffix, lowercased filename) so repeated runs
/// over the same inputs produce identical assignments. Records that arrive
/// already FAILED pass through untouched.
pub fn allocate_images(comics: &[ComicRecord], mut images: Vec<ImageAsset>) -> AllocationResult {
    let mut buckets: HashMap<MatchKey, Vec<usize>> = HashMap::new();
    for (idx, img) in images.iter().enumerate() {
        buckets.entry(img.match_key()).or_default().push(idx);
    }
    for indices in buckets.values_mut() {
        indices.sort_by(|&a, &b| {
            let ka = (&images[a].issue_suffix, images[a].filename.to_lowercase());
            let kb = (&images[b].issue_suffix, images[b].filename.to_lowercase());
            ka.cmp(&kb)
        });
    }

    let mut matched: Vec<ComicRecord> = Vec::new();
    let mut failed: Vec<ComicRecord> = Vec::new();
    let mut ledger_image_to_comic: HashMap<String, u32> = HashMap::new();
    let mut ledger_comic_to_images: HashMap<u32, Vec<String>> = HashMap::new();

    for comic in comics {
        if comic.status == RecordStatus::Failed {
            failed.push(comic.clone());
            continue;
        }

        let chosen = buckets
            .get(&comic.match_key())
            .and_then(|indices| indices.iter().find(|&&i| !images[i].used).copied());

        match chosen {
            Some(idx) => {
                images[idx].used = true;
                let image_id = images[idx].id.clone();
                ledger_image_to_comic.insert(image_id.clone(), comic.id);
                ledger_comic_to_images
                    .entry(comic.id)
                    .or_default()
                    .push(image_id.clone());
                matched.push(comic.with_allocated_image(&image_id));
            }
            None => {
                failed.push(comic.with_failure(FailureReason::NoMatchingImage, ""));
            }
        }
    }

    AllocationResult {
        matched,
        failed,
        ledger_image_to_comic,
        ledger_comic_to_images,
        images,
    }
}

/// Group records into consecutive runs sharing the same match key.
///
/// The export orders variants of one issue adjacently, so runs are the
/// group unit; an interleaved export simply yields smaller groups.
pub fn group_by_key(comics: &[ComicRecord]) -> Vec<(MatchKey, Vec<ComicRecord>)> {
    let mut groups: Vec<(MatchKey, Vec<ComicRecord>)> = Vec::new();
    for comic in comics {
        let key = comic.match_key();
        match groups.last_mut() {
            Some((last_key, members)) if *last_key == key => members.push(comic.clone()),
            _ => groups.push((key, vec![comic.clone()])),
        }
    }
    groups
}

/// Pick images for a group of `group_size` records, or None if no safe
/// assignment exists.
///
/// Candidates must already be sorted deterministically. Rules:
/// - one record: a lone image wins; otherwise exactly one image tagged
///   with the primary variant "A" wins;
/// - N records: the first N candidates must all carry distinct, non-empty
///   variant tags, and fewer than N candidates is a failure.
pub fn select_for_group<'a>(
    images: &'a [HostedImage],
    group_size: usize,
) -> Option<Vec<&'a HostedImage>> {
    if group_size == 0 || images.is_empty() {
        return None;
    }

    if group_size == 1 {
        if images.len() == 1 {
            return Some(vec![&images[0]]);
        }
        let primary: Vec<&HostedImage> =
            images.iter().filter(|img| img.variant == "A").collect();
        if primary.len() == 1 {
            return Some(primary);
        }
        return None;
    }

    if images.len() < group_size {
        return None;
    }

    let selected: Vec<&HostedImage> = images.iter().take(group_size).collect();
    let mut seen: Vec<&str> = Vec::new();
    for img in &selected {
        if img.variant.is_empty() {
            return None;
        }
        if seen.contains(&img.variant.as_str()) {
            return None;
        }
        seen.push(&img.variant);
    }

    Some(selected)
}
