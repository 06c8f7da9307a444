//! SourceForge project-host adapter for appsleuth.
//!
//! Projects are identified by their short name (no owner). Metadata comes
//! from the Allura REST API and the newest macOS download from the project's
//! "best release" document.

use appsleuth_core::providers::{
    LatestRelease, ProjectId, ProjectMetadata, ProjectProvider, ProviderRequest, ReleaseAsset,
    UrlParts,
};
use appsleuth_core::{Error, ProviderKind, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Public SourceForge endpoint.
pub const DEFAULT_API_BASE: &str = "https://sourceforge.net";

/// Subdomains of sourceforge.net that are not project names.
const SERVICE_SUBDOMAINS: &[&str] = &["www", "downloads", "master", "sf", "svn", "git", "web"];

#[derive(Debug, Deserialize)]
struct Project {
    name: Option<String>,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    developers: Vec<Developer>,
    #[serde(default)]
    external_homepage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Developer {
    name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BestRelease {
    #[serde(default)]
    platform_releases: PlatformReleases,
}

#[derive(Debug, Default, Deserialize)]
struct PlatformReleases {
    mac: Option<PlatformRelease>,
}

#[derive(Debug, Deserialize)]
struct PlatformRelease {
    url: String,
    filename: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_project_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// SourceForge projects and their best macOS release.
#[derive(Debug, Clone)]
pub struct SourceForgeProvider {
    api_base: String,
}

impl Default for SourceForgeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceForgeProvider {
    /// Create an adapter talking to sourceforge.net.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Create an adapter talking to another endpoint.
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProjectProvider for SourceForgeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SourceForge
    }

    fn parse_identity(&self, url: &str) -> Option<ProjectId> {
        let parts = UrlParts::parse(url)?;
        let name = match parts.host.as_str() {
            "sourceforge.net" | "www.sourceforge.net" => match parts.segment(0)? {
                "projects" | "p" => parts.segment(1)?,
                _ => return None,
            },
            "downloads.sourceforge.net" if parts.segment(0) == Some("project") => parts.segment(1)?,
            host => {
                let subdomain = host.strip_suffix(".sourceforge.net")?;
                if SERVICE_SUBDOMAINS.contains(&subdomain) || subdomain.contains('.') {
                    return None;
                }
                subdomain
            }
        };
        is_project_name(name).then(|| ProjectId::unowned(ProviderKind::SourceForge, name))
    }

    async fn fetch_metadata(&self, request: &ProviderRequest<'_>) -> Result<ProjectMetadata> {
        let url = format!("{}/rest/p/{}", self.api_base, request.project.name);
        debug!(%url, "Fetching SourceForge project");
        let project: Project = request
            .client
            .get_json(&url, None)
            .await
            .map_err(|e| Error::provider("sourceforge", e.to_string()))?;

        info!(project = %request.project, "Fetched SourceForge project metadata");
        let developer = project
            .developers
            .into_iter()
            .next()
            .and_then(|d| non_empty(d.name).or(d.username));
        Ok(ProjectMetadata {
            name: non_empty(project.name),
            description: non_empty(project.short_description),
            is_private: false,
            is_fork: false,
            developer,
            homepage: non_empty(project.external_homepage),
        })
    }

    async fn fetch_latest_release(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<Option<LatestRelease>> {
        let url = format!(
            "{}/projects/{}/best_release.json",
            self.api_base, request.project.name
        );
        debug!(%url, "Fetching SourceForge best release");
        let best: BestRelease = request
            .client
            .get_json(&url, None)
            .await
            .map_err(|e| Error::provider("sourceforge", e.to_string()))?;

        let Some(mac) = best.platform_releases.mac else {
            return Ok(None);
        };
        // filename is a path inside the project's file area
        let name = mac.filename.rsplit('/').next().unwrap_or(&mac.filename);
        Ok(LatestRelease::from_assets(
            &[ReleaseAsset::new(name, mac.url.as_str())],
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(url: &str) -> Option<String> {
        SourceForgeProvider::new()
            .parse_identity(url)
            .map(|id| id.to_string())
    }

    #[test]
    fn test_parse_identity_shapes() {
        let expected = Some("tool".to_string());
        assert_eq!(identity("https://sourceforge.net/projects/tool/"), expected);
        assert_eq!(identity("https://sourceforge.net/projects/tool/files/latest/download"), expected);
        assert_eq!(identity("https://sourceforge.net/p/tool/wiki/Home/"), expected);
        assert_eq!(identity("http://tool.sourceforge.net/"), expected);
        assert_eq!(
            identity("https://downloads.sourceforge.net/project/tool/1.0/Tool-1.0.dmg"),
            expected
        );
    }

    #[test]
    fn test_parse_identity_rejects_service_hosts() {
        assert_eq!(identity("https://sourceforge.net/directory/"), None);
        assert_eq!(identity("https://www.sourceforge.net/"), None);
        assert_eq!(identity("https://downloads.sourceforge.net/"), None);
        assert_eq!(identity("https://sourceforge.io/projects/tool"), None);
    }
}
