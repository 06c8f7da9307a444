//! Disk image unpacker.
//!
//! Images are attached read-only with `hdiutil`. The mount is owned by a
//! [`MountGuard`]; [`WorkingTree::release`] detaches it, and dropping an
//! undetached guard detaches it synchronously as a last resort.

use appsleuth_core::command::{CommandRunner, args};
use appsleuth_core::format::{FormatKind, kind_for_suffix};
use appsleuth_core::{Error, Inspection, Result, RunContext, Subject};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Discovery, Unpacker, WorkingTree, walk};

/// Answer to a license agreement prompt.
const AGREE: &[u8] = b"Y\n";

#[derive(Debug, Deserialize)]
struct AttachOutput {
    #[serde(rename = "system-entities", default)]
    system_entities: Vec<SystemEntity>,
}

#[derive(Debug, Deserialize)]
struct SystemEntity {
    #[serde(rename = "mount-point")]
    mount_point: Option<PathBuf>,
}

/// Strip anything before the plist payload, such as license text.
#[must_use]
pub fn trim_to_plist(output: &[u8]) -> &[u8] {
    output
        .windows(5)
        .position(|w| w == b"<?xml")
        .map_or(output, |start| &output[start..])
}

/// Mount point reported by `hdiutil attach -plist`.
///
/// # Errors
///
/// Returns an error when the output is not a plist or names no mount point.
pub fn parse_attach_output(output: &[u8]) -> Result<PathBuf> {
    let parsed: AttachOutput = plist::from_bytes(trim_to_plist(output))
        .map_err(|e| Error::parse("hdiutil output", e.to_string()))?;
    parsed
        .system_entities
        .into_iter()
        .find_map(|entity| entity.mount_point)
        .ok_or_else(|| Error::parse("hdiutil output", "no mount point"))
}

/// An attached disk image volume.
#[derive(Debug)]
pub struct MountGuard {
    mount_point: PathBuf,
    detached: bool,
}

impl MountGuard {
    /// Take ownership of a mounted volume.
    #[must_use]
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            detached: false,
        }
    }

    /// Where the volume is mounted.
    #[must_use]
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Detach the volume. Failures are logged, never raised.
    pub async fn detach(mut self, runner: &dyn CommandRunner) {
        self.detached = true;
        let mount = self.mount_point.to_string_lossy().into_owned();
        match runner
            .run("hdiutil", &args(["detach", "-force", mount.as_str()]), None)
            .await
        {
            Ok(output) if output.success() => debug!(%mount, "Detached disk image"),
            Ok(output) => warn!(%mount, stderr = %output.stderr_text().trim(), "Failed to detach disk image"),
            Err(e) => warn!(%mount, error = %e, "Failed to detach disk image"),
        }
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        warn!(mount = %self.mount_point.display(), "Detaching disk image from drop");
        if let Err(e) = std::process::Command::new("hdiutil")
            .args(["detach", "-force"])
            .arg(&self.mount_point)
            .output()
        {
            warn!(error = %e, "Failed to run hdiutil detach");
        }
    }
}

/// Mounts disk images and enumerates their volumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskImageUnpacker;

#[async_trait]
impl Unpacker for DiskImageUnpacker {
    fn kind(&self) -> Inspection {
        Inspection::DiskImage
    }

    async fn open(&self, ctx: &RunContext, path: &Path) -> Result<WorkingTree> {
        let mount_root = ctx.work_dir("mount")?;
        let root = mount_root.to_string_lossy().into_owned();
        let image = path.to_string_lossy().into_owned();
        let attach_args = args([
            "attach",
            "-plist",
            "-nobrowse",
            "-readonly",
            "-noverify",
            "-noautoopen",
            "-mountrandom",
            root.as_str(),
            image.as_str(),
        ]);

        let output = ctx
            .runner()
            .run("hdiutil", &attach_args, Some(AGREE))
            .await
            .map_err(|e| Error::unpack("disk image", path, e.to_string()))?;
        if !output.success() {
            return Err(Error::unpack(
                "disk image",
                path,
                output.stderr_text().trim().to_string(),
            ));
        }

        let mount_point = parse_attach_output(&output.stdout)
            .map_err(|e| Error::unpack("disk image", path, e.to_string()))?;
        info!(image = %path.display(), mount = %mount_point.display(), "Mounted disk image");
        Ok(WorkingTree::mounted(MountGuard::new(mount_point)))
    }

    async fn find_artifacts(&self, ctx: &RunContext, tree: &WorkingTree) -> Result<Discovery> {
        let depth = ctx.config().max_walk_depth;
        let mut discovery = Discovery::default();

        let apps = walk::find_bundles(tree.root(), depth);
        if !apps.is_empty() {
            walk::select_applications(apps, &mut discovery);
            return Ok(discovery);
        }

        for path in walk::find_with_suffix(tree.root(), depth, &["pkg", "mpkg"]) {
            if let Some((FormatKind::Package, _)) = kind_for_suffix(&path.to_string_lossy()) {
                discovery.artifacts.push(Subject::Package(path));
            }
        }
        if discovery.artifacts.is_empty() {
            discovery
                .warnings
                .push("No application or installer found on the disk image".to_string());
        }
        Ok(discovery)
    }
}
