//! The resolution dispatcher.
//!
//! [`Resolver`] routes each [`Subject`] to the inspector for its kind. Every
//! inspector either records facts or hands new subjects back to
//! [`Resolver::dispatch`], which recurses until nothing new turns up. Each
//! inspection kind runs at most once per run (see [`FactStore::begin`]) and
//! downloads are deduplicated by content, so cycles such as a feed whose
//! newest item points back at the feed always terminate.

mod bundle;
mod download;
mod feed;
mod forge;
mod unpack;

use appsleuth_core::providers::{ProviderRegistry, UrlParts};
use appsleuth_core::{Error, FactStore, Inspection, Result, RunContext, Subject};
use appsleuth_provider_bitbucket::BitbucketProvider;
use appsleuth_provider_github::GitHubProvider;
use appsleuth_provider_sourceforge::SourceForgeProvider;
use appsleuth_unpack::{ArchiveUnpacker, DiskImageUnpacker, PackageUnpacker};
use async_recursion::async_recursion;
use tracing::{debug, info, instrument};

/// Hosts that serve App Store listings rather than downloads.
const STORE_HOSTS: &[&str] = &["apps.apple.com", "itunes.apple.com"];

/// The default project providers.
#[must_use]
pub fn default_providers() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(GitHubProvider::new());
    registry.register(BitbucketProvider::new());
    registry.register(SourceForgeProvider::new());
    registry
}

/// Drives one resolution run.
#[derive(Debug)]
pub struct Resolver {
    ctx: RunContext,
    providers: ProviderRegistry,
}

impl Resolver {
    /// Create a resolver with the default project providers.
    #[must_use]
    pub fn new(ctx: RunContext) -> Self {
        Self::with_providers(ctx, default_providers())
    }

    /// Create a resolver with an explicit provider registry.
    #[must_use]
    pub fn with_providers(ctx: RunContext, providers: ProviderRegistry) -> Self {
        Self { ctx, providers }
    }

    /// The run context.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Resolve `input` into a fresh fact store.
    ///
    /// # Errors
    ///
    /// Returns the first hard error; see [`Resolver::resolve_into`].
    pub async fn resolve(&self, input: &str) -> Result<FactStore> {
        let mut facts = FactStore::new();
        self.resolve_into(&mut facts, input).await?;
        Ok(facts)
    }

    /// Resolve `input`, accumulating into `facts`.
    ///
    /// Hard errors are recorded in `facts.errors` as well as returned, so the
    /// partial facts remain useful to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error when the input is not recognized, is an App Store
    /// listing, cannot be downloaded, or has no recognizable format.
    #[instrument(skip(self, facts))]
    pub async fn resolve_into(&self, facts: &mut FactStore, input: &str) -> Result<()> {
        let outcome = self.resolve_subject(facts, input).await;
        if let Err(e) = &outcome {
            facts.error(e.to_string());
        }
        info!(
            warnings = facts.warnings.len(),
            errors = facts.errors.len(),
            inspections = facts.inspections().count(),
            "Resolution finished"
        );
        outcome
    }

    async fn resolve_subject(&self, facts: &mut FactStore, input: &str) -> Result<()> {
        let subject = Subject::parse(input)?;
        let guard = unpacked_guard(&subject);
        let label = subject.label();
        self.dispatch(facts, subject).await?;

        // A local artifact that no unpacker could open is a format error,
        // not an empty result.
        match guard {
            Some(kind) if !facts.has_inspected(kind) => Err(Error::unsupported_format(label)),
            _ => Ok(()),
        }
    }

    /// Route one subject to its inspector.
    #[async_recursion]
    async fn dispatch(&self, facts: &mut FactStore, subject: Subject) -> Result<()> {
        debug!(subject = %subject.label(), "Dispatching");
        match subject {
            Subject::Url(url) => self.route_url(facts, &url).await,
            Subject::Download(url) => self.inspect_download(facts, &url).await,
            Subject::Feed { url, local } => self.inspect_feed(facts, &url, local.as_deref()).await,
            Subject::Bundle(path) => self.inspect_bundle(facts, &path).await,
            Subject::Archive(path) => self.inspect_unpacked(facts, &ArchiveUnpacker, &path).await,
            Subject::DiskImage(path) => self.inspect_unpacked(facts, &DiskImageUnpacker, &path).await,
            Subject::Package(path) => {
                if let Some(name) = path.file_name() {
                    facts
                        .pkg_filename
                        .set_if_absent(name.to_string_lossy().into_owned());
                }
                self.inspect_unpacked(facts, &PackageUnpacker, &path).await
            }
        }
    }

    async fn route_url(&self, facts: &mut FactStore, url: &str) -> Result<()> {
        if is_store_url(url) {
            return Err(Error::StoreUrl {
                url: url.to_string(),
            });
        }

        if let Some((provider, project)) = self.providers.find_for_url(url) {
            debug!(%url, provider = provider.kind().name(), %project, "URL belongs to a project host");
            // A direct link to a feed or asset on the host still gets inspected
            if let Some(direct) = direct_subject(url) {
                self.dispatch(facts, direct).await?;
            }
            return self.inspect_project(facts, provider.clone(), project).await;
        }

        let subject = direct_subject(url).unwrap_or_else(|| Subject::Download(url.to_string()));
        self.dispatch(facts, subject).await
    }
}

/// Feed or download subject for a URL whose shape says what it is.
fn direct_subject(url: &str) -> Option<Subject> {
    if is_feed_url(url) {
        Some(Subject::Feed {
            url: url.to_string(),
            local: None,
        })
    } else if appsleuth_core::format::kind_for_suffix(url).is_some() {
        Some(Subject::Download(url.to_string()))
    } else {
        None
    }
}

fn unpacked_guard(subject: &Subject) -> Option<Inspection> {
    match subject {
        Subject::Archive(_) => Some(Inspection::Archive),
        Subject::DiskImage(_) => Some(Inspection::DiskImage),
        Subject::Package(_) => Some(Inspection::Package),
        _ => None,
    }
}

/// Whether a URL points at an App Store listing.
#[must_use]
pub fn is_store_url(url: &str) -> bool {
    UrlParts::parse(url).is_some_and(|parts| STORE_HOSTS.contains(&parts.host.as_str()))
}

/// Whether a URL looks like an update feed by its path alone.
#[must_use]
pub fn is_feed_url(url: &str) -> bool {
    let Some(parts) = UrlParts::parse(url) else {
        return false;
    };
    let last = parts.segments.last().map(|s| s.to_ascii_lowercase()).unwrap_or_default();
    last.ends_with(".xml")
        || last.ends_with(".rss")
        || parts
            .segments
            .iter()
            .any(|s| s.to_ascii_lowercase().contains("appcast"))
}

/// Last path segment of a URL, if it is non-empty.
fn url_file_name(url: &str) -> Option<&str> {
    UrlParts::parse(url)?.segments.last().copied()
}
