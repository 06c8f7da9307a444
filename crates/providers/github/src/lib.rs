//! GitHub forge adapter for appsleuth.
//!
//! Recognizes repository URLs in their web, raw-content, API and pages
//! shapes, and reads repository metadata and the newest published release
//! from the GitHub REST API.

use appsleuth_core::providers::{
    LatestRelease, ProjectId, ProjectMetadata, ProjectProvider, ProviderRequest, ReleaseAsset,
    UrlParts, trim_git_suffix,
};
use appsleuth_core::{Error, ProviderKind, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Public GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// First path segments of github.com that are not repository owners.
const RESERVED_OWNERS: &[&str] = &[
    "about", "apps", "features", "marketplace", "orgs", "settings", "sponsors", "topics",
];

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    description: Option<String>,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    fork: bool,
    homepage: Option<String>,
    html_url: Option<String>,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn provider_error(error: &Error) -> Error {
    match error.status() {
        Some(403 | 429) => Error::provider("github", format!("rate limited or forbidden: {error}")),
        _ => Error::provider("github", error.to_string()),
    }
}

/// GitHub repositories and releases.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    api_base: String,
}

impl Default for GitHubProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubProvider {
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

    fn repo_path(project: &ProjectId) -> Result<String> {
        let owner = project
            .owner
            .as_deref()
            .ok_or_else(|| Error::provider("github", format!("{project} has no owner")))?;
        Ok(format!("repos/{owner}/{}", project.name))
    }

    async fn developer_name(&self, request: &ProviderRequest<'_>, login: &str) -> String {
        let url = format!("{}/users/{login}", self.api_base);
        match request.client.get_json::<User>(&url, request.token).await {
            Ok(user) => non_empty(user.name).unwrap_or(user.login),
            Err(e) => {
                debug!(%login, error = %e, "Falling back to login as developer name");
                login.to_string()
            }
        }
    }
}

#[async_trait]
impl ProjectProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn parse_identity(&self, url: &str) -> Option<ProjectId> {
        let parts = UrlParts::parse(url)?;
        let (owner, repo) = match parts.host.as_str() {
            "github.com" | "www.github.com" => {
                let owner = parts.segment(0)?;
                if RESERVED_OWNERS.contains(&owner) {
                    return None;
                }
                (owner.to_string(), parts.segment(1)?.to_string())
            }
            "raw.githubusercontent.com" => {
                (parts.segment(0)?.to_string(), parts.segment(1)?.to_string())
            }
            "api.github.com" if parts.segment(0) == Some("repos") => {
                (parts.segment(1)?.to_string(), parts.segment(2)?.to_string())
            }
            host => {
                let owner = host.strip_suffix(".github.io")?;
                if owner.is_empty() || owner.contains('.') {
                    return None;
                }
                let repo = parts
                    .segment(0)
                    .map_or_else(|| format!("{owner}.github.io"), str::to_string);
                (owner.to_string(), repo)
            }
        };

        let repo = trim_git_suffix(&repo);
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(ProjectId::owned(ProviderKind::GitHub, owner, repo))
    }

    async fn fetch_metadata(&self, request: &ProviderRequest<'_>) -> Result<ProjectMetadata> {
        let url = format!("{}/{}", self.api_base, Self::repo_path(request.project)?);
        debug!(%url, "Fetching GitHub repository");
        let repo: Repository = request
            .client
            .get_json(&url, request.token)
            .await
            .map_err(|e| provider_error(&e))?;

        let developer = self.developer_name(request, &repo.owner.login).await;
        info!(project = %request.project, "Fetched GitHub repository metadata");
        Ok(ProjectMetadata {
            name: Some(repo.name),
            description: non_empty(repo.description),
            is_private: repo.private,
            is_fork: repo.fork,
            developer: Some(developer),
            homepage: non_empty(repo.homepage).or(repo.html_url),
        })
    }

    async fn fetch_latest_release(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<Option<LatestRelease>> {
        let url = format!("{}/{}/releases", self.api_base, Self::repo_path(request.project)?);
        debug!(%url, "Fetching GitHub releases");
        let releases: Vec<Release> = request
            .client
            .get_json(&url, request.token)
            .await
            .map_err(|e| provider_error(&e))?;

        let Some(release) = releases.into_iter().find(|r| !r.draft && !r.prerelease) else {
            return Ok(None);
        };
        let assets: Vec<ReleaseAsset> = release
            .assets
            .into_iter()
            .map(|a| ReleaseAsset::new(a.name, a.browser_download_url))
            .collect();
        Ok(LatestRelease::from_assets(&assets, Some(release.tag_name)))
    }
}
