//! Version comparison and version-key selection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use crate::{Error, Result};

static STRICT_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*$").ok());

/// Info.plist keys that can carry a release version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionKey {
    /// `CFBundleShortVersionString`, the marketing version.
    #[serde(rename = "CFBundleShortVersionString")]
    ShortVersionString,
    /// `CFBundleVersion`, the build number.
    #[serde(rename = "CFBundleVersion")]
    BundleVersion,
}

impl VersionKey {
    /// The Info.plist key name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortVersionString => "CFBundleShortVersionString",
            Self::BundleVersion => "CFBundleVersion",
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The version key chosen for a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChoice {
    /// Which key was chosen.
    pub key: VersionKey,
    /// Its value.
    pub value: String,
    /// Whether the value is not a plain dotted number.
    pub loose: bool,
}

/// Whether `value` is a plain dotted number such as `1.2.10`.
#[must_use]
pub fn is_strict(value: &str) -> bool {
    STRICT_VERSION
        .as_ref()
        .is_some_and(|re| re.is_match(value.trim()))
}

/// Pick the Info.plist key to read versions from.
///
/// Rules are evaluated in order; when both keys are strict the short version
/// string wins.
///
/// # Errors
///
/// Returns [`Error::MissingFact`] when neither key carries a value.
pub fn choose_version_key(short: Option<&str>, build: Option<&str>) -> Result<VersionChoice> {
    let short = short.map(str::trim).filter(|s| !s.is_empty());
    let build = build.map(str::trim).filter(|s| !s.is_empty());

    let choice = |key, value: &str, loose| VersionChoice {
        key,
        value: value.to_string(),
        loose,
    };

    match (short, build) {
        (Some(s), Some(b)) => match (is_strict(s), is_strict(b)) {
            (true, _) => Ok(choice(VersionKey::ShortVersionString, s, false)),
            (false, true) => Ok(choice(VersionKey::BundleVersion, b, false)),
            (false, false) => Ok(choice(VersionKey::ShortVersionString, s, true)),
        },
        (Some(s), None) => Ok(choice(VersionKey::ShortVersionString, s, !is_strict(s))),
        (None, Some(b)) => Ok(choice(VersionKey::BundleVersion, b, !is_strict(b))),
        (None, None) => Err(Error::MissingFact {
            fact: "a version key",
        }),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn segments(value: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits: Option<bool> = None;

    for (i, c) in value.char_indices() {
        if !c.is_alphanumeric() {
            if let Some(d) = digits.take() {
                out.push(segment(&value[start..i], d));
            }
            start = i + c.len_utf8();
            continue;
        }
        let is_digit = c.is_ascii_digit();
        match digits {
            Some(d) if d == is_digit => {}
            Some(d) => {
                out.push(segment(&value[start..i], d));
                start = i;
                digits = Some(is_digit);
            }
            None => {
                start = i;
                digits = Some(is_digit);
            }
        }
    }
    if let Some(d) = digits {
        out.push(segment(&value[start..], d));
    }
    out
}

fn segment(s: &str, digits: bool) -> Segment<'_> {
    if digits {
        Segment::Number(s)
    } else {
        Segment::Text(s)
    }
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two version-like strings naturally.
///
/// Digit runs compare numerically, text runs case-insensitively, and a
/// number sorts after text at the same position. A version with extra
/// trailing components is greater (`1.2.1 > 1.2`).
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Segment::Number(x), Segment::Number(y)) => cmp_numeric(x, y),
            (Segment::Text(x), Segment::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_strict() {
        assert!(is_strict("1"));
        assert!(is_strict("1.2.10"));
        assert!(!is_strict("1.2b3"));
        assert!(!is_strict("v1.2"));
        assert!(!is_strict(""));
    }

    #[test]
    fn test_both_strict_prefers_short_version() {
        let choice = choose_version_key(Some("2.4.1"), Some("2401")).unwrap();
        assert_eq!(choice.key, VersionKey::ShortVersionString);
        assert_eq!(choice.value, "2.4.1");
        assert!(!choice.loose);
    }

    #[test]
    fn test_only_build_strict() {
        let choice = choose_version_key(Some("2.4 beta"), Some("2401")).unwrap();
        assert_eq!(choice.key, VersionKey::BundleVersion);
    }

    #[test]
    fn test_neither_strict_falls_back_to_short_version() {
        let choice = choose_version_key(Some("2.4b"), Some("r2401")).unwrap();
        assert_eq!(choice.key, VersionKey::ShortVersionString);
        assert!(choice.loose);
    }

    #[test]
    fn test_single_key() {
        let choice = choose_version_key(None, Some("42")).unwrap();
        assert_eq!(choice.key, VersionKey::BundleVersion);
        let choice = choose_version_key(Some(" 1.0 "), Some("")).unwrap();
        assert_eq!(choice.key, VersionKey::ShortVersionString);
        assert_eq!(choice.value, "1.0");
    }

    #[test]
    fn test_no_version_is_an_error() {
        assert!(matches!(
            choose_version_key(None, None),
            Err(Error::MissingFact { .. })
        ));
    }

    #[test]
    fn test_natural_cmp_numbers() {
        assert_eq!(natural_cmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(natural_cmp("30", "4"), Ordering::Greater);
        assert_eq!(natural_cmp("1.2", "1.2.1"), Ordering::Less);
        assert_eq!(natural_cmp("1.02", "1.2"), Ordering::Equal);
    }

    #[test]
    fn test_natural_cmp_mixed() {
        assert_eq!(natural_cmp("1.0b2", "1.0b10"), Ordering::Less);
        assert_eq!(natural_cmp("1.0.1", "1.0b"), Ordering::Greater);
        assert_eq!(
            natural_cmp(
                "https://example.com/App-2.0.zip",
                "https://example.com/App-10.0.zip"
            ),
            Ordering::Less
        );
    }
}
