//! The fact store: everything learned about the subject software in one run.
//!
//! Scalar facts follow "first writer wins" semantics through
//! [`Fact::set_if_absent`]. Only bundle metadata is allowed to use
//! [`Fact::overwrite`], since an application's own Info.plist is the most
//! reliable source for its name and identifier.
//!
//! The store also owns the visited set. An [`Inspection`] is inserted before
//! the matching inspector runs and is only ever removed by an unpacker that
//! failed to open its input, so a parent "guess the next format" loop can
//! tell which guess matched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::artifact::Inspection;

/// A single scalar fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fact<T>(Option<T>);

impl<T> Default for Fact<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Fact<T> {
    /// Current value, if any writer has set one.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    /// Whether a value has been recorded.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Record `value` only when no value exists yet.
    ///
    /// Returns `true` when the value was stored.
    pub fn set_if_absent(&mut self, value: T) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(value);
        true
    }

    /// Replace any existing value. Reserved for authoritative sources.
    pub fn overwrite(&mut self, value: T) {
        self.0 = Some(value);
    }
}

impl Fact<String> {
    /// Borrow the value as a string slice.
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Accumulator of facts for one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactStore {
    /// Name of the primary application bundle (file stem).
    pub app_name: Fact<String>,
    /// Canonical software name.
    pub name: Fact<String>,
    /// Bundle identifier.
    pub bundle_id: Fact<String>,
    /// Info.plist key carrying the release version.
    pub version_key: Fact<String>,
    /// Value of the chosen version key at inspection time.
    pub version: Fact<String>,
    /// Designated code-signing requirement.
    pub codesign_reqs: Fact<String>,
    /// Developer name.
    pub developer: Fact<String>,
    /// Code-signing team identifier.
    pub team_id: Fact<String>,
    /// Location of the application icon.
    pub icon_path: Fact<String>,
    /// URL to download the software from.
    pub download_url: Fact<String>,
    /// Format suffix of the download (dmg, zip, pkg, ...).
    pub download_format: Fact<String>,
    /// File name of the download.
    pub download_filename: Fact<String>,
    /// User agent required by the download host.
    pub user_agent: Fact<String>,
    /// Short description of the software.
    pub description: Fact<String>,
    /// Project homepage.
    pub homepage: Fact<String>,
    /// Sparkle update feed URL.
    pub sparkle_feed: Fact<String>,
    /// Whether the update feed carries version information.
    pub sparkle_provides_version: Fact<bool>,
    /// Minimum supported OS version.
    pub minimum_os_version: Fact<String>,
    /// GitHub `owner/repo`.
    pub github_repo: Fact<String>,
    /// Bitbucket `owner/repo`.
    pub bitbucket_repo: Fact<String>,
    /// SourceForge project id.
    pub sourceforge_id: Fact<String>,
    /// File name of an installer package found inside another artifact.
    pub pkg_filename: Fact<String>,
    /// Whether a release asset name filter is needed downstream.
    pub asset_filter_required: Fact<bool>,
    /// Whether the application was distributed through the App Store.
    pub is_store_app: Fact<bool>,

    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Advice for whoever finishes the recipe.
    pub reminders: Vec<String>,
    /// Fatal problems.
    pub errors: Vec<String>,
    /// Applications that must not be running during installation.
    pub blocking_applications: Vec<String>,
    /// Helper applications found next to the primary app.
    pub helper_applications: Vec<String>,
    /// Code-signing authority chain of the primary app.
    pub codesign_authorities: Vec<String>,

    /// Inspections already performed in this run.
    inspections: BTreeSet<Inspection>,
    /// SHA-256 digests of downloads already inspected.
    download_digests: BTreeSet<String>,
}

impl FactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "Resolution warning");
        push_unique(&mut self.warnings, message);
    }

    /// Record a reminder.
    pub fn remind(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(%message, "Resolution reminder");
        push_unique(&mut self.reminders, message);
    }

    /// Record a hard error.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record an application that blocks installation.
    pub fn add_blocking_application(&mut self, name: impl Into<String>) {
        push_unique(&mut self.blocking_applications, name.into());
    }

    /// Record a helper application.
    pub fn add_helper_application(&mut self, name: impl Into<String>) {
        push_unique(&mut self.helper_applications, name.into());
    }

    /// Record a code-signing authority.
    pub fn add_codesign_authority(&mut self, authority: impl Into<String>) {
        push_unique(&mut self.codesign_authorities, authority.into());
    }

    /// Mark an inspection as performed.
    ///
    /// Returns `false` when it already ran, in which case the caller must
    /// not run it again.
    pub fn begin(&mut self, inspection: Inspection) -> bool {
        self.inspections.insert(inspection)
    }

    /// Withdraw a guard after an unpacker failed to open its input.
    pub fn withdraw(&mut self, inspection: Inspection) {
        self.inspections.remove(&inspection);
    }

    /// Whether an inspection has already run.
    #[must_use]
    pub fn has_inspected(&self, inspection: Inspection) -> bool {
        self.inspections.contains(&inspection)
    }

    /// Inspections performed so far, in a stable order.
    pub fn inspections(&self) -> impl Iterator<Item = Inspection> + '_ {
        self.inspections.iter().copied()
    }

    /// Record the digest of a downloaded payload.
    ///
    /// Returns `false` when the same bytes were already inspected.
    pub fn record_download(&mut self, digest: impl Into<String>) -> bool {
        self.download_digests.insert(digest.into())
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
