//! Application bundle inspection.

use std::path::Path;

use appsleuth_core::version::choose_version_key;
use appsleuth_core::{FactStore, Inspection, Result, Subject};
use appsleuth_unpack::bundle::{BundleInfo, convert_icon, looks_like_installer, read_info, read_signature};
use tracing::{debug, info};

use super::Resolver;

const STORE_REMINDER: &str = "This app was distributed through the Mac App Store; \
     a recipe should normally not repackage it";

impl Resolver {
    /// Read the primary application bundle.
    ///
    /// Bundle facts are authoritative: name and bundle identifier replace
    /// guesses recorded by earlier inspectors.
    pub(super) async fn inspect_bundle(&self, facts: &mut FactStore, path: &Path) -> Result<()> {
        if !facts.begin(Inspection::Bundle) {
            debug!(path = %path.display(), "Bundle already inspected");
            return Ok(());
        }
        let info = read_info(path)?;
        info!(name = %info.name, bundle_id = ?info.bundle_id, "Read application bundle");

        let stem = path
            .file_stem()
            .map_or_else(|| info.name.clone(), |s| s.to_string_lossy().into_owned());
        facts.app_name.overwrite(stem.clone());
        facts.name.overwrite(info.name.clone());
        if let Some(bundle_id) = &info.bundle_id {
            facts.bundle_id.overwrite(bundle_id.clone());
        }

        let choice = choose_version_key(info.short_version.as_deref(), info.bundle_version.as_deref())?;
        if choice.loose {
            facts.warn(format!(
                "{} value {} is not a plain dotted version",
                choice.key.as_str(),
                choice.value
            ));
        }
        facts.version_key.set_if_absent(choice.key.as_str().to_string());
        facts.version.set_if_absent(choice.value);

        if let Some(minimum_os) = &info.minimum_os {
            facts.minimum_os_version.set_if_absent(minimum_os.clone());
        }

        self.record_icon(facts, &info).await;

        if looks_like_installer(&info.name) || looks_like_installer(&stem) {
            facts.warn(format!(
                "{} looks like an installer rather than the application itself",
                info.name
            ));
        }

        if info.has_store_receipt {
            facts.is_store_app.set_if_absent(true);
            facts.remind(STORE_REMINDER);
        }

        self.record_signature(facts, &info).await;

        if let Some(feed) = info.feed_url {
            facts.sparkle_feed.set_if_absent(feed.clone());
            self.dispatch(facts, Subject::Feed { url: feed, local: None })
                .await?;
        }
        Ok(())
    }

    async fn record_icon(&self, facts: &mut FactStore, info: &BundleInfo) {
        let Some(icns) = info.icon_file.as_deref().filter(|p| p.is_file()) else {
            debug!(bundle = %info.path.display(), "Bundle has no icon file");
            return;
        };

        let png = self.ctx.scratch_dir().join("icon.png");
        match convert_icon(self.ctx.runner(), icns, &png).await {
            Ok(png) => {
                facts.icon_path.set_if_absent(png.display().to_string());
            }
            // The bundle may sit on a volume that is detached once inspection
            // ends; keep a copy of the original icon in scratch
            Err(e) => {
                facts.warn(format!("Could not convert the application icon: {e}"));
                let copy = self.ctx.scratch_dir().join("icon.icns");
                match tokio::fs::copy(icns, &copy).await {
                    Ok(_) => {
                        facts.icon_path.set_if_absent(copy.display().to_string());
                    }
                    Err(e) => facts.warn(format!("Could not copy the application icon: {e}")),
                }
            }
        }
    }

    async fn record_signature(&self, facts: &mut FactStore, info: &BundleInfo) {
        match read_signature(self.ctx.runner(), &info.path).await {
            Ok(Some(signature)) => {
                for authority in signature.authorities {
                    facts.add_codesign_authority(authority);
                }
                if let Some(requirement) = signature.designated_requirement {
                    facts.codesign_reqs.set_if_absent(requirement);
                }
                if let Some(developer) = signature.developer {
                    facts.developer.set_if_absent(developer);
                }
                if let Some(team_id) = signature.team_id {
                    facts.team_id.set_if_absent(team_id);
                }
            }
            Ok(None) => facts.warn(format!("{} is not code signed", info.name)),
            Err(e) => facts.warn(format!("Could not read the code signature of {}: {e}", info.name)),
        }
    }
}
