//! Command-line interface.

use appsleuth_core::{Fact, FactStore, RunConfig};
use clap::{Parser, ValueEnum};
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::tracing::{LogLevel, TracingFormat};

/// Output format for the fact report
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Pretty,
    /// The full fact store as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        };
        write!(f, "{s}")
    }
}

/// Identify downloadable macOS software.
///
/// Takes a download URL, project URL, update feed or local artifact and
/// reports everything it can learn about the application inside.
#[derive(Parser, Debug)]
#[command(name = "appsleuth")]
#[command(about = "Identify downloadable macOS software from a URL or artifact")]
#[command(version)]
pub struct Cli {
    /// URL, `.app` bundle, archive, disk image or installer package
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Report format.
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Log output format.
    #[arg(long, value_enum, default_value = "compact", env = "APPSLEUTH_LOG_FORMAT")]
    pub log_format: TracingFormat,

    /// Logging verbosity level.
    #[arg(short = 'L', long, value_enum, default_value = "warn", env = "APPSLEUTH_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Root directory for per-run scratch space.
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Keep the scratch directory after the run.
    #[arg(long)]
    pub keep_scratch: bool,

    /// GitHub API token.
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

impl Cli {
    /// Run configuration from the environment, overridden by flags.
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::from_env();
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_root(dir);
        }
        if self.keep_scratch {
            config = config.with_keep_scratch(true);
        }
        if let Some(token) = &self.github_token {
            config = config.with_github_token(token);
        }
        config
    }
}

/// Parse command-line arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

fn line(out: &mut String, label: &str, fact: &Fact<String>) {
    if let Some(value) = fact.get() {
        let _ = writeln!(out, "{label:<18} {value}");
    }
}

fn flag(out: &mut String, label: &str, fact: &Fact<bool>) {
    if let Some(value) = fact.get() {
        let _ = writeln!(out, "{label:<18} {}", if *value { "yes" } else { "no" });
    }
}

fn list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{heading}:");
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
}

/// Human-readable summary of a fact store.
#[must_use]
pub fn summary(facts: &FactStore) -> String {
    let mut out = String::new();
    line(&mut out, "Name", &facts.name);
    line(&mut out, "App", &facts.app_name);
    line(&mut out, "Bundle ID", &facts.bundle_id);
    line(&mut out, "Version", &facts.version);
    line(&mut out, "Version key", &facts.version_key);
    line(&mut out, "Minimum OS", &facts.minimum_os_version);
    line(&mut out, "Developer", &facts.developer);
    line(&mut out, "Team ID", &facts.team_id);
    line(&mut out, "Signing reqs", &facts.codesign_reqs);
    line(&mut out, "Description", &facts.description);
    line(&mut out, "Homepage", &facts.homepage);
    line(&mut out, "Download URL", &facts.download_url);
    line(&mut out, "Download format", &facts.download_format);
    line(&mut out, "Download file", &facts.download_filename);
    line(&mut out, "User agent", &facts.user_agent);
    line(&mut out, "Installer package", &facts.pkg_filename);
    line(&mut out, "Sparkle feed", &facts.sparkle_feed);
    flag(&mut out, "Feed has versions", &facts.sparkle_provides_version);
    line(&mut out, "GitHub repo", &facts.github_repo);
    line(&mut out, "Bitbucket repo", &facts.bitbucket_repo);
    line(&mut out, "SourceForge id", &facts.sourceforge_id);
    flag(&mut out, "Asset filter", &facts.asset_filter_required);
    flag(&mut out, "App Store app", &facts.is_store_app);
    line(&mut out, "Icon", &facts.icon_path);

    list(&mut out, "Signing authorities", &facts.codesign_authorities);
    list(&mut out, "Blocking applications", &facts.blocking_applications);
    list(&mut out, "Helper applications", &facts.helper_applications);
    list(&mut out, "Warnings", &facts.warnings);
    list(&mut out, "Reminders", &facts.reminders);
    list(&mut out, "Errors", &facts.errors);
    out
}

/// Render a fact store in the requested format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(facts: &FactStore, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Pretty => Ok(summary(facts)),
        OutputFormat::Json => serde_json::to_string_pretty(facts),
    }
}
