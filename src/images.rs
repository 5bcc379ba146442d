//! Image asset indexing.
//!
//! Turns local file paths and hosted URLs into canonical assets keyed on
//! the same (series, volume, issue) shape the catalog parser produces.
//! Anything that fails the filename grammar is excluded, not an error.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::parse_image_filename;
use crate::types::{HostedImage, ImageAsset, MatchKey};

/// File extensions considered cover images when scanning a directory
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Index a list of local image paths into assets.
///
/// Ids are sequential in input order so repeated runs over the same list
/// produce identical ledgers.
pub fn index_images<P: AsRef<Path>>(paths: &[P]) -> Vec<ImageAsset> {
    let mut assets = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let parsed = match parse_image_filename(&filename) {
            Some(p) => p,
            None => continue,
        };
        let (series_norm, volume, issue_number, issue_suffix) = parsed;
        assets.push(ImageAsset {
            id: format!("img-{}", assets.len() + 1),
            filename,
            path: path.display().to_string(),
            series_norm,
            volume,
            issue_number,
            issue_suffix,
            used: false,
        });
    }
    assets
}

/// List image files directly inside a directory, sorted by filename
pub fn scan_image_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read image directory: {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
        })
        .collect();

    paths.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
    Ok(paths)
}

/// Parse a hosted image URL into its match key and candidate form.
///
/// Takes the last path segment, percent-decodes it, strips the vendor's
/// `-vi` stem suffix, then applies the filename grammar. Returns None for
/// anything that doesn't satisfy it.
pub fn parse_hosted_url(url: &str) -> Option<(MatchKey, HostedImage)> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    // Query and fragment never carry the filename
    let path_part = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path_part.rsplit('/').next().unwrap_or("");
    if segment.is_empty() {
        return None;
    }

    let filename = strip_vendor_suffix(&percent_decode(segment));
    let (series_norm, volume, issue_number, issue_suffix) = parse_image_filename(&filename)?;

    let key = MatchKey {
        series_norm,
        volume,
        issue_number,
    };
    let image = HostedImage {
        url: url.to_string(),
        variant: issue_suffix,
    };
    Some((key, image))
}

/// Drop a trailing `-vi` stem token some image hosts append, keeping the
/// extension: `Batman_V2_12A-vi.webp` -> `Batman_V2_12A.webp`
fn strip_vendor_suffix(filename: &str) -> String {
    let (stem, ext) = match filename.rfind('.') {
        Some(i) => (&filename[..i], &filename[i..]),
        None => (filename, ""),
    };
    if stem.to_lowercase().ends_with("-vi") {
        format!("{}{}", &stem[..stem.len() - 3], ext)
    } else {
        filename.to_string()
    }
}

/// Minimal percent-decoding for URL path segments
fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_images_skips_unparseable() {
        let paths = ["covers/Batman_V2_12A.webp", "covers/notes.txt", "covers/readme_cover.png"];
        let assets = index_images(&paths);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, "img-1");
        assert_eq!(assets[0].filename, "Batman_V2_12A.webp");
        assert_eq!(assets[0].path, "covers/Batman_V2_12A.webp");
        assert_eq!(assets[0].series_norm, "batman");
        assert_eq!(assets[0].volume, 2);
        assert_eq!(assets[0].issue_number, 12);
        assert_eq!(assets[0].issue_suffix, "A");
        assert!(!assets[0].used);
    }

    #[test]
    fn test_index_images_sequential_ids() {
        let paths = ["Chew_1.png", "Chew_2.png", "bogus", "Chew_3.png"];
        let assets = index_images(&paths);
        let ids: Vec<&str> = assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["img-1", "img-2", "img-3"]);
    }

    #[test]
    fn test_parse_hosted_url() {
        let (key, image) =
            parse_hosted_url("https://img.example.com/covers/Batman_V2_12A.webp?w=1600").unwrap();
        assert_eq!(key.series_norm, "batman");
        assert_eq!(key.volume, 2);
        assert_eq!(key.issue_number, 12);
        assert_eq!(image.variant, "A");
        assert_eq!(
            image.url,
            "https://img.example.com/covers/Batman_V2_12A.webp?w=1600"
        );
    }

    #[test]
    fn test_parse_hosted_url_percent_decoding() {
        let (key, _) =
            parse_hosted_url("https://cdn.example.com/Spider%20Man_V1_5.png").unwrap();
        assert_eq!(key.series_norm, "spider man");
        assert_eq!(key.issue_number, 5);
    }

    #[test]
    fn test_parse_hosted_url_strips_vendor_suffix() {
        let (key, image) =
            parse_hosted_url("https://cdn.example.com/Chew_19A-vi.webp").unwrap();
        assert_eq!(key.series_norm, "chew");
        assert_eq!(key.issue_number, 19);
        assert_eq!(image.variant, "A");
    }

    #[test]
    fn test_parse_hosted_url_rejects_junk() {
        assert!(parse_hosted_url("").is_none());
        assert!(parse_hosted_url("https://cdn.example.com/").is_none());
        assert!(parse_hosted_url("https://cdn.example.com/logo.png").is_none());
    }

    #[test]
    fn test_strip_vendor_suffix_no_extension() {
        assert_eq!(strip_vendor_suffix("Chew_19A-vi"), "Chew_19A");
        assert_eq!(strip_vendor_suffix("Chew_19A"), "Chew_19A");
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%2Fpath"), "/path");
    }
}
