//! Per-run configuration and context.
//!
//! A [`RunContext`] is built once per invocation and threaded through every
//! inspector. It owns the scratch directory, the fetch client and the shell
//! command runner; nothing here is global or reused across runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::Result;
use crate::artifact::ProviderKind;
use crate::command::{CommandRunner, SystemRunner};
use crate::fetch::{FetchClient, ReqwestTransport, Transport};

/// Default user agent for outbound requests.
pub const DEFAULT_USER_AGENT: &str = concat!("appsleuth/", env!("CARGO_PKG_VERSION"));

/// Configuration for one resolution run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root under which per-run scratch directories are created.
    pub scratch_root: Option<PathBuf>,
    /// GitHub API token.
    pub github_token: Option<String>,
    /// Bitbucket API token.
    pub bitbucket_token: Option<String>,
    /// Keep the scratch directory after the run.
    pub keep_scratch: bool,
    /// Maximum depth of directory walks inside unpacked trees.
    pub max_walk_depth: usize,
    /// Maximum nesting of installer packages inside packages.
    pub max_nested_packages: usize,
    /// HTTP timeout.
    pub timeout: Duration,
    /// Default user agent.
    pub user_agent: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            github_token: None,
            bitbucket_token: None,
            keep_scratch: false,
            max_walk_depth: 4,
            max_nested_packages: 2,
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl RunConfig {
    /// Create a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read tokens and scratch settings from the environment.
    ///
    /// `GITHUB_TOKEN` takes precedence over `GH_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.github_token = env_value("GITHUB_TOKEN").or_else(|| env_value("GH_TOKEN"));
        config.bitbucket_token = env_value("BITBUCKET_TOKEN");
        config.scratch_root = env_value("APPSLEUTH_SCRATCH_DIR").map(PathBuf::from);
        config.keep_scratch = env_value("APPSLEUTH_KEEP_SCRATCH")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        config
    }

    /// Set the scratch root.
    #[must_use]
    pub fn with_scratch_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(path.into());
        self
    }

    /// Set the GitHub token.
    #[must_use]
    pub fn with_github_token(mut self, token: impl Into<String>) -> Self {
        self.github_token = Some(token.into());
        self
    }

    /// Set the Bitbucket token.
    #[must_use]
    pub fn with_bitbucket_token(mut self, token: impl Into<String>) -> Self {
        self.bitbucket_token = Some(token.into());
        self
    }

    /// Keep the scratch directory after the run.
    #[must_use]
    pub fn with_keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }

    /// Set the maximum directory walk depth.
    #[must_use]
    pub fn with_max_walk_depth(mut self, depth: usize) -> Self {
        self.max_walk_depth = depth;
        self
    }

    /// Set the maximum nested package depth.
    #[must_use]
    pub fn with_max_nested_packages(mut self, depth: usize) -> Self {
        self.max_nested_packages = depth;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scratch root, defaulting to `<cache>/appsleuth`.
    #[must_use]
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(default_scratch_root)
    }

    /// API token for a provider, if configured.
    #[must_use]
    pub fn token_for(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::GitHub => self.github_token.as_deref(),
            ProviderKind::Bitbucket => self.bitbucket_token.as_deref(),
            ProviderKind::SourceForge => None,
        }
    }
}

/// Get the default scratch root.
#[must_use]
pub fn default_scratch_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("appsleuth")
}

/// Everything one resolution run needs.
pub struct RunContext {
    config: RunConfig,
    scratch: PathBuf,
    client: FetchClient,
    runner: Arc<dyn CommandRunner>,
}

impl RunContext {
    /// Create a context with the network transport and system tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or scratch directory cannot be
    /// created.
    pub fn new(config: RunConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.user_agent, config.timeout)?;
        Self::with_parts(config, Arc::new(transport), Arc::new(SystemRunner))
    }

    /// Create a context with explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created.
    pub fn with_parts(
        config: RunConfig,
        transport: Arc<dyn Transport>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let id = uuid::Uuid::new_v4().simple().to_string();
        let scratch = config
            .scratch_root()
            .join(format!("{stamp}-{}", &id[..8]));
        std::fs::create_dir_all(&scratch)?;
        debug!(scratch = %scratch.display(), "Created scratch directory");

        Ok(Self {
            config,
            scratch,
            client: FetchClient::new(transport),
            runner,
        })
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Per-run scratch directory.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    /// Directory for downloaded artifacts.
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.scratch.join("downloads")
    }

    /// A fresh, empty directory inside the scratch area.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn work_dir(&self, label: &str) -> Result<PathBuf> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.scratch.join("work").join(format!("{label}-{}", &id[..8]));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// HTTP client.
    #[must_use]
    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    /// Shell command runner.
    #[must_use]
    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("scratch", &self.scratch)
            .field("keep_scratch", &self.config.keep_scratch)
            .finish_non_exhaustive()
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if self.config.keep_scratch {
            debug!(scratch = %self.scratch.display(), "Keeping scratch directory");
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.scratch) {
            warn!(scratch = %self.scratch.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::new();
        assert_eq!(config.max_walk_depth, 4);
        assert_eq!(config.max_nested_packages, 2);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("appsleuth/"));
        assert!(config.scratch_root().ends_with("appsleuth"));
    }

    #[test]
    fn test_from_env_prefers_github_token() {
        temp_env::with_vars(
            [
                ("GITHUB_TOKEN", Some("primary")),
                ("GH_TOKEN", Some("secondary")),
                ("BITBUCKET_TOKEN", None),
                ("APPSLEUTH_KEEP_SCRATCH", Some("true")),
            ],
            || {
                let config = RunConfig::from_env();
                assert_eq!(config.token_for(ProviderKind::GitHub), Some("primary"));
                assert_eq!(config.token_for(ProviderKind::Bitbucket), None);
                assert!(config.keep_scratch);
            },
        );
    }

    #[test]
    fn test_from_env_falls_back_to_gh_token() {
        temp_env::with_vars(
            [
                ("GITHUB_TOKEN", Some("")),
                ("GH_TOKEN", Some("secondary")),
                ("APPSLEUTH_KEEP_SCRATCH", None),
            ],
            || {
                let config = RunConfig::from_env();
                assert_eq!(config.github_token.as_deref(), Some("secondary"));
                assert!(!config.keep_scratch);
            },
        );
    }

    #[test]
    fn test_scratch_directory_lifecycle() {
        let root = tempfile::TempDir::new().unwrap();
        let config = RunConfig::new().with_scratch_root(root.path());
        let context = RunContext::new(config).unwrap();

        let scratch = context.scratch_dir().to_path_buf();
        assert!(scratch.starts_with(root.path()));
        assert!(scratch.is_dir());

        let work = context.work_dir("archive").unwrap();
        assert!(work.is_dir());
        assert_ne!(work, context.work_dir("archive").unwrap());

        drop(context);
        assert!(!scratch.exists());
    }

    #[test]
    fn test_keep_scratch() {
        let root = tempfile::TempDir::new().unwrap();
        let config = RunConfig::new()
            .with_scratch_root(root.path())
            .with_keep_scratch(true);
        let context = RunContext::new(config).unwrap();
        let scratch = context.scratch_dir().to_path_buf();
        drop(context);
        assert!(scratch.is_dir());
    }
}
