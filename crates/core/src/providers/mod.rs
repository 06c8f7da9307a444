//! Forge and project-host provider abstraction.

mod provider;
mod registry;

pub use provider::{
    ASSET_FORMAT_PRIORITY, LatestRelease, ProjectId, ProjectMetadata, ProjectProvider,
    ProviderRequest, ReleaseAsset, UrlParts, select_asset, trim_git_suffix,
};
pub use registry::ProviderRegistry;
