//! Project provider trait for forge and project-host adapters.
//!
//! Each adapter turns one provider's URL shapes into a [`ProjectId`], then
//! answers two questions about the project: what it is ([`ProjectMetadata`])
//! and where its newest release can be downloaded ([`LatestRelease`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;
use crate::artifact::ProviderKind;
use crate::fetch::FetchClient;

/// Asset suffixes in the order a release asset is preferred.
pub const ASSET_FORMAT_PRIORITY: &[&str] = &[
    "dmg", "zip", "pkg", "tbz", "tgz", "tar.gz", "tar.bz2", "txz", "mpkg",
];

/// Normalized identity of a hosted project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId {
    /// Hosting provider.
    pub provider: ProviderKind,
    /// Owning user or team; project hosts without owners leave this empty.
    pub owner: Option<String>,
    /// Project or repository name.
    pub name: String,
}

impl ProjectId {
    /// Identity with an owner, e.g. a forge repository.
    #[must_use]
    pub fn owned(provider: ProviderKind, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider,
            owner: Some(owner.into()),
            name: name.into(),
        }
    }

    /// Identity without an owner, e.g. a project-host project.
    #[must_use]
    pub fn unowned(provider: ProviderKind, name: impl Into<String>) -> Self {
        Self {
            provider,
            owner: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{owner}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// What a provider knows about a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Display name.
    pub name: Option<String>,
    /// One-line description.
    pub description: Option<String>,
    /// Whether the project is private.
    pub is_private: bool,
    /// Whether the project is a fork of another.
    pub is_fork: bool,
    /// Developer or organization name.
    pub developer: Option<String>,
    /// Project homepage.
    pub homepage: Option<String>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Download URL.
    pub url: String,
}

impl ReleaseAsset {
    /// Create an asset.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// The newest downloadable release of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestRelease {
    /// Where to download it.
    pub download_url: String,
    /// Format suffix of the chosen asset, e.g. `dmg`.
    pub download_format: String,
    /// Name of the chosen asset.
    pub asset_name: String,
    /// More than one asset has the chosen format; a name filter is needed.
    pub needs_asset_filter: bool,
    /// Release version or tag, when the provider reports one.
    pub version: Option<String>,
}

impl LatestRelease {
    /// Pick the preferred asset of a release.
    ///
    /// Returns `None` when no asset carries a recognized format suffix.
    #[must_use]
    pub fn from_assets(assets: &[ReleaseAsset], version: Option<String>) -> Option<Self> {
        let (index, format, needs_asset_filter) = select_asset(assets)?;
        let asset = &assets[index];
        Some(Self {
            download_url: asset.url.clone(),
            download_format: format.to_string(),
            asset_name: asset.name.clone(),
            needs_asset_filter,
            version,
        })
    }
}

fn asset_format(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    ASSET_FORMAT_PRIORITY.iter().copied().find(|format| {
        lower
            .strip_suffix(format)
            .is_some_and(|stem| stem.ends_with('.'))
    })
}

/// Choose an asset by [`ASSET_FORMAT_PRIORITY`].
///
/// Returns the index of the first asset in the best available format, that
/// format, and whether several assets share it.
#[must_use]
pub fn select_asset(assets: &[ReleaseAsset]) -> Option<(usize, &'static str, bool)> {
    let formats: Vec<Option<&'static str>> = assets.iter().map(|a| asset_format(&a.name)).collect();

    ASSET_FORMAT_PRIORITY.iter().find_map(|wanted| {
        let mut matching = formats
            .iter()
            .enumerate()
            .filter(|(_, format)| **format == Some(*wanted))
            .map(|(i, _)| i);
        let first = matching.next()?;
        Some((first, *wanted, matching.next().is_some()))
    })
}

/// Host and path segments of a web URL, enough for identity matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts<'a> {
    /// Lowercased host without port or credentials.
    pub host: String,
    /// Non-empty path segments, query and fragment removed.
    pub segments: Vec<&'a str>,
}

impl<'a> UrlParts<'a> {
    /// Split an `http(s)://` or `ftp://` URL. Other schemes yield `None`.
    #[must_use]
    pub fn parse(url: &'a str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        if !["http", "https", "ftp"].contains(&scheme.to_ascii_lowercase().as_str()) {
            return None;
        }
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit('@').next().unwrap_or(authority);
        let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        Some(Self {
            host,
            segments: path.split('/').filter(|s| !s.is_empty()).collect(),
        })
    }

    /// Path segment at `index`.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&'a str> {
        self.segments.get(index).copied()
    }

    /// Whether the host is `domain` or one of its subdomains.
    #[must_use]
    pub fn host_is(&self, domain: &str) -> bool {
        self.host == domain
            || self
                .host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Strip a trailing `.git` from a repository name.
#[must_use]
pub fn trim_git_suffix(name: &str) -> &str {
    name.strip_suffix(".git").unwrap_or(name)
}

/// Inputs for one provider call.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// The project being asked about.
    pub project: &'a ProjectId,
    /// HTTP client.
    pub client: &'a FetchClient,
    /// Optional bearer token for the provider's API.
    pub token: Option<&'a str>,
}

/// A forge or project-host adapter.
///
/// # Example
///
/// ```ignore
/// let provider = GitHubProvider::new();
/// if let Some(project) = provider.parse_identity("https://github.com/owner/app") {
///     let request = ProviderRequest { project: &project, client: &client, token: None };
///     let release = provider.fetch_latest_release(&request).await?;
/// }
/// ```
#[async_trait]
pub trait ProjectProvider: Send + Sync {
    /// Which provider this adapter speaks for.
    fn kind(&self) -> ProviderKind;

    /// Normalize any of the provider's URL shapes to a project identity.
    fn parse_identity(&self, url: &str) -> Option<ProjectId>;

    /// Fetch project metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the response is malformed.
    async fn fetch_metadata(&self, request: &ProviderRequest<'_>) -> Result<ProjectMetadata>;

    /// Fetch the newest release with a recognizable asset.
    ///
    /// Returns `Ok(None)` when the project has no release or no asset in a
    /// recognized format.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the response is malformed.
    async fn fetch_latest_release(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<Option<LatestRelease>>;
}
