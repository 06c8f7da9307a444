//! Artifact kinds flowing through the resolution pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::format::{self, FormatKind};
use crate::{Error, Result};

/// Hosting providers with a metadata API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// github.com
    GitHub,
    /// bitbucket.org
    Bitbucket,
    /// sourceforge.net
    SourceForge,
}

impl ProviderKind {
    /// Provider name used in logs and registry lookups.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Bitbucket => "bitbucket",
            Self::SourceForge => "sourceforge",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Once-per-run inspection steps; the states of the visited set.
///
/// Download URLs are deliberately absent: they are deduplicated by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "provider")]
pub enum Inspection {
    /// Application bundle metadata.
    Bundle,
    /// Archive extraction.
    Archive,
    /// Disk image mount.
    DiskImage,
    /// Installer package expansion.
    Package,
    /// Update feed parsing.
    SparkleFeed,
    /// Forge or project-host API lookup.
    Provider(ProviderKind),
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundle => f.write_str("bundle"),
            Self::Archive => f.write_str("archive"),
            Self::DiskImage => f.write_str("disk image"),
            Self::Package => f.write_str("package"),
            Self::SparkleFeed => f.write_str("sparkle feed"),
            Self::Provider(kind) => write!(f, "{kind} project"),
        }
    }
}

/// Something to inspect next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// A URL whose meaning is not known yet.
    Url(String),
    /// A URL known to point at a downloadable payload.
    Download(String),
    /// An update feed, optionally already downloaded.
    Feed {
        /// Feed URL
        url: String,
        /// Local copy of the feed document
        local: Option<PathBuf>,
    },
    /// An application bundle on disk.
    Bundle(PathBuf),
    /// An archive on disk.
    Archive(PathBuf),
    /// A disk image on disk.
    DiskImage(PathBuf),
    /// An installer package on disk.
    Package(PathBuf),
}

impl Subject {
    /// Classify a raw input string.
    ///
    /// # Errors
    ///
    /// Returns an error when a local path does not exist or the input has no
    /// recognized shape.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("ftp://")
        {
            return Ok(Self::Url(trimmed.to_string()));
        }

        let path = match trimmed.strip_prefix("file://") {
            Some(rest) => PathBuf::from(percent_decode(rest)),
            None => PathBuf::from(trimmed),
        };
        Self::from_path(&path)
    }

    /// Classify a local path by its suffix.
    ///
    /// # Errors
    ///
    /// Returns an error when the path does not exist or has no recognized suffix.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy().trim_end_matches('/').to_ascii_lowercase();
        let subject = if name.ends_with(".app") {
            Self::Bundle(path.to_path_buf())
        } else {
            match format::kind_for_suffix(&name) {
                Some((FormatKind::Archive, _)) => Self::Archive(path.to_path_buf()),
                Some((FormatKind::DiskImage, _)) => Self::DiskImage(path.to_path_buf()),
                Some((FormatKind::Package, _)) => Self::Package(path.to_path_buf()),
                _ => return Err(Error::invalid_input(path.display().to_string())),
            }
        };

        if !path.exists() {
            return Err(Error::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(subject)
    }

    /// Short label for logging.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Url(url) | Self::Download(url) | Self::Feed { url, .. } => url.clone(),
            Self::Bundle(path) | Self::Archive(path) | Self::DiskImage(path) | Self::Package(path) => {
                path.display().to_string()
            }
        }
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
