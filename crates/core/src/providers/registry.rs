//! Project provider registry.
//!
//! Providers are registered once per run and looked up by asking each one
//! whether it recognizes a URL.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::provider::{ProjectId, ProjectProvider};
use crate::artifact::ProviderKind;

/// Registry of project providers.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Providers indexed by kind, iterated in a stable order.
    providers: BTreeMap<ProviderKind, Arc<dyn ProjectProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider.
    ///
    /// If a provider of the same kind already exists, it is replaced.
    pub fn register<P: ProjectProvider + 'static>(&mut self, provider: P) {
        self.register_arc(Arc::new(provider));
    }

    /// Register a provider wrapped in Arc.
    pub fn register_arc(&mut self, provider: Arc<dyn ProjectProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Find the provider that recognizes `url`, with the parsed identity.
    #[must_use]
    pub fn find_for_url(&self, url: &str) -> Option<(&Arc<dyn ProjectProvider>, ProjectId)> {
        self.providers
            .values()
            .find_map(|p| p.parse_identity(url).map(|id| (p, id)))
    }

    /// Get all provider names.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().map(|k| k.name()).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
