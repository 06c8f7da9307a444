//! Format catalogue and classifier.
//!
//! Classification is an ordered rule list evaluated top to bottom:
//!
//! 1. sniff the byte sample for an update feed (it must re-enter the
//!    dispatcher as a feed, not be unpacked);
//! 2. sniff the byte sample for an HTML error page;
//! 3. match the file name or URL suffix against the catalogue;
//! 4. consult the declared content type;
//! 5. recognize a raw Mach-O binary by its magic number.
//!
//! Anything left over is [`Format::Unknown`]; the dispatcher then probes the
//! unpackers themselves in image, archive, package order.

use serde::{Deserialize, Serialize};

/// Broad artifact kinds in the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Disk image (dmg, iso).
    DiskImage,
    /// Compressed archive.
    Archive,
    /// Installer package.
    Package,
}

/// Suffix catalogue. Longer suffixes come first so `.tar.gz` wins over `.gz`.
pub const CATALOGUE: &[(&str, FormatKind)] = &[
    ("tar.gz", FormatKind::Archive),
    ("tar.bz2", FormatKind::Archive),
    ("tar.xz", FormatKind::Archive),
    ("tbz2", FormatKind::Archive),
    ("dmg", FormatKind::DiskImage),
    ("iso", FormatKind::DiskImage),
    ("zip", FormatKind::Archive),
    ("tgz", FormatKind::Archive),
    ("tbz", FormatKind::Archive),
    ("txz", FormatKind::Archive),
    ("tar", FormatKind::Archive),
    ("7z", FormatKind::Archive),
    ("mpkg", FormatKind::Package),
    ("pkg", FormatKind::Package),
];

/// Declared content types that map onto a catalogue entry.
const MIME_TABLE: &[(&str, FormatKind, &str)] = &[
    ("application/x-apple-diskimage", FormatKind::DiskImage, "dmg"),
    ("application/x-diskcopy", FormatKind::DiskImage, "dmg"),
    ("application/zip", FormatKind::Archive, "zip"),
    ("application/x-zip-compressed", FormatKind::Archive, "zip"),
    ("application/x-gzip", FormatKind::Archive, "tgz"),
    ("application/gzip", FormatKind::Archive, "tgz"),
    ("application/x-tar", FormatKind::Archive, "tar"),
    ("application/x-bzip2", FormatKind::Archive, "tbz"),
    ("application/x-xz", FormatKind::Archive, "txz"),
    ("application/x-7z-compressed", FormatKind::Archive, "7z"),
    ("application/vnd.apple.installer+xml", FormatKind::Package, "pkg"),
    ("application/x-newton-compatible-pkg", FormatKind::Package, "pkg"),
];

const FEED_MIME_TYPES: &[&str] = &["application/rss+xml", "application/xml", "text/xml"];

/// How many leading bytes are considered when sniffing.
pub const SNIFF_LEN: usize = 2048;

/// Outcome of classifying an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// A catalogue entry and the suffix that identified it.
    Known(FormatKind, &'static str),
    /// An uncompressed Mach-O executable.
    Binary,
    /// An update feed document.
    Feed,
    /// An HTML page where a binary was expected.
    ErrorPage,
    /// Nothing matched.
    Unknown,
}

/// Look up a file name or URL in the suffix catalogue.
#[must_use]
pub fn kind_for_suffix(name: &str) -> Option<(FormatKind, &'static str)> {
    let name = strip_query(name).trim_end_matches('/').to_ascii_lowercase();
    CATALOGUE.iter().find_map(|(suffix, kind)| {
        let dotted = name.strip_suffix(suffix)?;
        dotted.ends_with('.').then_some((*kind, *suffix))
    })
}

/// Classify an artifact from its name, declared content type and leading bytes.
#[must_use]
pub fn classify(name: &str, content_type: Option<&str>, sample: Option<&[u8]>) -> Format {
    if let Some(sample) = sample {
        if looks_like_feed(sample) {
            return Format::Feed;
        }
        if looks_like_html(sample) {
            return Format::ErrorPage;
        }
    }

    if let Some((kind, suffix)) = kind_for_suffix(name) {
        return Format::Known(kind, suffix);
    }

    if let Some(content_type) = content_type {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if let Some((_, kind, suffix)) = MIME_TABLE.iter().find(|(m, _, _)| *m == mime) {
            return Format::Known(*kind, suffix);
        }
        if sample.is_none() && FEED_MIME_TYPES.contains(&mime.as_str()) {
            return Format::Feed;
        }
    }

    if sample.is_some_and(is_mach_o) {
        return Format::Binary;
    }

    Format::Unknown
}

/// Whether the leading bytes carry an RSS or Sparkle namespace marker.
#[must_use]
pub fn looks_like_feed(sample: &[u8]) -> bool {
    let head = sniff_text(sample);
    head.contains("<rss") || head.contains("xmlns:sparkle") || head.contains("<sparkle:")
}

/// Whether the leading bytes look like an HTML document.
#[must_use]
pub fn looks_like_html(sample: &[u8]) -> bool {
    let head = sniff_text(sample);
    head.contains("<!doctype html") || head.contains("<html")
}

/// Identify an archive or installer package by its magic number.
///
/// Used once an unnamed payload has opened, to record the format it really
/// has. Disk images carry their signature in a trailer and are not sniffed.
#[must_use]
pub fn sniff_suffix(sample: &[u8]) -> Option<(FormatKind, &'static str)> {
    let found = match sample {
        [b'P', b'K', 0x03, 0x04, ..] => (FormatKind::Archive, "zip"),
        [0x1F, 0x8B, ..] => (FormatKind::Archive, "tgz"),
        [b'B', b'Z', b'h', ..] => (FormatKind::Archive, "tbz"),
        [0xFD, b'7', b'z', b'X', b'Z', 0x00, ..] => (FormatKind::Archive, "txz"),
        [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C, ..] => (FormatKind::Archive, "7z"),
        [b'x', b'a', b'r', b'!', ..] => (FormatKind::Package, "pkg"),
        _ if sample.get(257..262) == Some(&b"ustar"[..]) => (FormatKind::Archive, "tar"),
        _ => return None,
    };
    Some(found)
}

fn is_mach_o(sample: &[u8]) -> bool {
    matches!(
        sample.get(..4),
        Some(
            [0xFE, 0xED, 0xFA, 0xCE | 0xCF]
                | [0xCE | 0xCF, 0xFA, 0xED, 0xFE]
                | [0xCA, 0xFE, 0xBA, 0xBE]
        )
    )
}

fn sniff_text(sample: &[u8]) -> String {
    let end = sample.len().min(SNIFF_LEN);
    String::from_utf8_lossy(&sample[..end]).to_ascii_lowercase()
}

fn strip_query(name: &str) -> &str {
    let end = name.find(['?', '#']).unwrap_or(name.len());
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_catalogue() {
        assert_eq!(
            kind_for_suffix("https://example.com/App-1.2.dmg?token=abc"),
            Some((FormatKind::DiskImage, "dmg"))
        );
        assert_eq!(
            kind_for_suffix("example-1.0.TAR.GZ"),
            Some((FormatKind::Archive, "tar.gz"))
        );
        assert_eq!(
            kind_for_suffix("Installer.mpkg"),
            Some((FormatKind::Package, "mpkg"))
        );
        assert_eq!(kind_for_suffix("https://example.com/download"), None);
        // A bare suffix without a dot is not a match
        assert_eq!(kind_for_suffix("dmg"), None);
    }

    #[test]
    fn test_sniff_suffix_by_magic() {
        assert_eq!(sniff_suffix(b"PK\x03\x04rest"), Some((FormatKind::Archive, "zip")));
        assert_eq!(sniff_suffix(&[0x1F, 0x8B, 0x08, 0x00]), Some((FormatKind::Archive, "tgz")));
        assert_eq!(sniff_suffix(b"BZh91AY"), Some((FormatKind::Archive, "tbz")));
        assert_eq!(
            sniff_suffix(&[0xFD, b'7', b'z', b'X', b'Z', 0x00, 0x00]),
            Some((FormatKind::Archive, "txz"))
        );
        assert_eq!(sniff_suffix(b"xar!\x00\x1c"), Some((FormatKind::Package, "pkg")));

        let mut tar = vec![0u8; 512];
        tar[257..262].copy_from_slice(b"ustar");
        assert_eq!(sniff_suffix(&tar), Some((FormatKind::Archive, "tar")));

        assert_eq!(sniff_suffix(b"koly"), None);
        assert_eq!(sniff_suffix(b""), None);
    }

    #[test]
    fn test_suffix_beats_content_type() {
        assert_eq!(
            classify("App.zip", Some("application/x-apple-diskimage"), None),
            Format::Known(FormatKind::Archive, "zip")
        );
    }

    #[test]
    fn test_content_type_used_without_suffix() {
        assert_eq!(
            classify(
                "https://example.com/latest",
                Some("application/x-apple-diskimage; charset=binary"),
                None
            ),
            Format::Known(FormatKind::DiskImage, "dmg")
        );
        assert_eq!(
            classify("https://example.com/latest", Some("application/octet-stream"), None),
            Format::Unknown
        );
    }

    #[test]
    fn test_feed_sniffing_reclassifies_download() {
        let feed = br#"<?xml version="1.0"?><rss xmlns:sparkle="http://www.andymatuschak.org/xml-namespaces/sparkle" version="2.0">"#;
        assert_eq!(
            classify("https://example.com/App.zip", None, Some(feed)),
            Format::Feed
        );
    }

    #[test]
    fn test_html_error_page() {
        let page = b"<!DOCTYPE html><html><body>Not Found</body></html>";
        assert_eq!(
            classify("https://example.com/App.dmg", Some("text/html"), Some(page)),
            Format::ErrorPage
        );
    }

    #[test]
    fn test_mach_o_binary() {
        let sample = [0xCF, 0xFA, 0xED, 0xFE, 0x07, 0x00];
        assert_eq!(classify("tool", None, Some(&sample)), Format::Binary);
    }

    #[test]
    fn test_unknown_bytes() {
        assert_eq!(classify("blob", None, Some(b"PK\x03\x04")), Format::Unknown);
    }
}
