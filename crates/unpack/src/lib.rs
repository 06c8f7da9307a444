//! Unpackers for appsleuth
//!
//! This crate knows how to open each artifact kind into a filesystem tree and
//! enumerate what is inside it:
//! - [`ArchiveUnpacker`] for zip, tar and friends
//! - [`DiskImageUnpacker`] for dmg and iso images
//! - [`PackageUnpacker`] for flat and bundle installer packages
//!
//! The [`bundle`] module reads application bundle metadata.
//!
//! Every unpacker follows the same two-step protocol: [`Unpacker::open`]
//! produces a [`WorkingTree`], [`Unpacker::find_artifacts`] enumerates it, and
//! [`WorkingTree::release`] always runs afterwards, whatever happened in
//! between.

pub mod archive;
pub mod bundle;
pub mod disk_image;
pub mod package;
pub mod walk;

use appsleuth_core::{Inspection, Result, RunContext, Subject};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use archive::ArchiveUnpacker;
pub use disk_image::{DiskImageUnpacker, MountGuard};
pub use package::PackageUnpacker;

/// An opened artifact.
#[derive(Debug)]
pub struct WorkingTree {
    root: PathBuf,
    mount: Option<MountGuard>,
}

impl WorkingTree {
    /// A tree backed by a plain directory.
    #[must_use]
    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mount: None,
        }
    }

    /// A tree backed by a mounted volume.
    #[must_use]
    pub fn mounted(mount: MountGuard) -> Self {
        Self {
            root: mount.mount_point().to_path_buf(),
            mount: Some(mount),
        }
    }

    /// Root of the tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Release any resources held by the tree (detach mounted volumes).
    pub async fn release(mut self, ctx: &RunContext) {
        if let Some(mount) = self.mount.take() {
            mount.detach(ctx.runner()).await;
        }
    }
}

/// What an unpacker found inside a working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Things to inspect next; the primary application comes first.
    pub artifacts: Vec<Subject>,
    /// Non-primary applications that must be closed before installing.
    pub blocking_applications: Vec<String>,
    /// Helper applications recorded for information only.
    pub helper_applications: Vec<String>,
    /// Tentative bundle identifier from package metadata.
    pub bundle_id_hint: Option<String>,
    /// Soft warnings raised while enumerating.
    pub warnings: Vec<String>,
}

/// Opens one artifact kind and enumerates its contents.
#[async_trait]
pub trait Unpacker: Send + Sync {
    /// The visited-set state guarding this unpacker.
    fn kind(&self) -> Inspection;

    /// Open the artifact at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the artifact is not of this unpacker's kind or
    /// the underlying tool fails; the caller treats that as "format did not
    /// match".
    async fn open(&self, ctx: &RunContext, path: &Path) -> Result<WorkingTree>;

    /// Enumerate applications and nested artifacts in an opened tree.
    ///
    /// # Errors
    ///
    /// Returns an error when the tree cannot be read.
    async fn find_artifacts(&self, ctx: &RunContext, tree: &WorkingTree) -> Result<Discovery>;
}
