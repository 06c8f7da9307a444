//! Bitbucket forge adapter for appsleuth.
//!
//! Reads repository metadata and the repository's downloads area from the
//! Bitbucket 2.0 API. Bitbucket has no release objects; the downloads list
//! stands in for release assets.

use appsleuth_core::providers::{
    LatestRelease, ProjectId, ProjectMetadata, ProjectProvider, ProviderRequest, ReleaseAsset,
    UrlParts, trim_git_suffix,
};
use appsleuth_core::{Error, ProviderKind, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::{debug, info};

/// Public Bitbucket API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.bitbucket.org";

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    parent: Option<IgnoredAny>,
    owner: Option<Owner>,
    #[serde(default)]
    website: Option<String>,
    links: Option<RepositoryLinks>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryLinks {
    html: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Downloads {
    #[serde(default)]
    values: Vec<Download>,
}

#[derive(Debug, Deserialize)]
struct Download {
    name: String,
    links: DownloadLinks,
}

#[derive(Debug, Deserialize)]
struct DownloadLinks {
    #[serde(rename = "self")]
    self_link: Link,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Bitbucket repositories and downloads.
#[derive(Debug, Clone)]
pub struct BitbucketProvider {
    api_base: String,
}

impl Default for BitbucketProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BitbucketProvider {
    /// Create an adapter talking to the public API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Create an adapter talking to another API endpoint.
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn repository_url(&self, project: &ProjectId) -> Result<String> {
        let owner = project
            .owner
            .as_deref()
            .ok_or_else(|| Error::provider("bitbucket", format!("{project} has no owner")))?;
        Ok(format!("{}/2.0/repositories/{owner}/{}", self.api_base, project.name))
    }
}

#[async_trait]
impl ProjectProvider for BitbucketProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bitbucket
    }

    fn parse_identity(&self, url: &str) -> Option<ProjectId> {
        let parts = UrlParts::parse(url)?;
        let (owner, repo) = match parts.host.as_str() {
            "bitbucket.org" | "www.bitbucket.org" => (parts.segment(0)?, parts.segment(1)?),
            "api.bitbucket.org"
                if parts.segment(0) == Some("2.0") && parts.segment(1) == Some("repositories") =>
            {
                (parts.segment(2)?, parts.segment(3)?)
            }
            _ => return None,
        };
        let repo = trim_git_suffix(repo);
        if repo.is_empty() {
            return None;
        }
        Some(ProjectId::owned(ProviderKind::Bitbucket, owner, repo))
    }

    async fn fetch_metadata(&self, request: &ProviderRequest<'_>) -> Result<ProjectMetadata> {
        let url = self.repository_url(request.project)?;
        debug!(%url, "Fetching Bitbucket repository");
        let repo: Repository = request
            .client
            .get_json(&url, request.token)
            .await
            .map_err(|e| Error::provider("bitbucket", e.to_string()))?;

        info!(project = %request.project, "Fetched Bitbucket repository metadata");
        Ok(ProjectMetadata {
            name: Some(repo.name),
            description: non_empty(repo.description),
            is_private: repo.is_private,
            is_fork: repo.parent.is_some(),
            developer: repo.owner.and_then(|o| non_empty(o.display_name)),
            homepage: non_empty(repo.website)
                .or_else(|| repo.links.and_then(|l| l.html).map(|h| h.href)),
        })
    }

    async fn fetch_latest_release(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<Option<LatestRelease>> {
        let url = format!("{}/downloads", self.repository_url(request.project)?);
        debug!(%url, "Fetching Bitbucket downloads");
        let downloads: Downloads = request
            .client
            .get_json(&url, request.token)
            .await
            .map_err(|e| Error::provider("bitbucket", e.to_string()))?;

        let assets: Vec<ReleaseAsset> = downloads
            .values
            .into_iter()
            .map(|d| ReleaseAsset::new(d.name, d.links.self_link.href))
            .collect();
        Ok(LatestRelease::from_assets(&assets, None))
    }
}
