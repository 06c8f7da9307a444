//! Archive, disk image and installer package inspection.

use std::path::Path;

use appsleuth_core::{FactStore, Result};
use appsleuth_unpack::{Discovery, Unpacker};
use tracing::{debug, info};

use super::Resolver;

impl Resolver {
    /// Open an artifact with `unpacker` and inspect what it holds.
    ///
    /// The unpacker's own kind guards the step. When the unpacker cannot open
    /// the input the guard is withdrawn again; callers probing an unknown
    /// format read that as "not this kind".
    pub(super) async fn inspect_unpacked(
        &self,
        facts: &mut FactStore,
        unpacker: &dyn Unpacker,
        path: &Path,
    ) -> Result<()> {
        let kind = unpacker.kind();
        if !facts.begin(kind) {
            debug!(%kind, path = %path.display(), "Already inspected");
            return Ok(());
        }

        let tree = match unpacker.open(&self.ctx, path).await {
            Ok(tree) => tree,
            Err(e) => {
                info!(%kind, path = %path.display(), error = %e, "Could not open artifact");
                facts.withdraw(kind);
                return Ok(());
            }
        };

        let found = unpacker.find_artifacts(&self.ctx, &tree).await;
        let outcome = match found {
            Ok(discovery) => self.apply_discovery(facts, discovery).await,
            Err(e) => {
                info!(%kind, path = %path.display(), error = %e, "Could not read artifact contents");
                facts.withdraw(kind);
                Ok(())
            }
        };

        // Mounted volumes stay attached while nested artifacts are inspected
        tree.release(&self.ctx).await;
        outcome
    }

    async fn apply_discovery(&self, facts: &mut FactStore, discovery: Discovery) -> Result<()> {
        for name in discovery.blocking_applications {
            facts.add_blocking_application(name);
        }
        for name in discovery.helper_applications {
            facts.add_helper_application(name);
        }
        if let Some(bundle_id) = discovery.bundle_id_hint {
            facts.bundle_id.set_if_absent(bundle_id);
        }
        for warning in discovery.warnings {
            facts.warn(warning);
        }

        for artifact in discovery.artifacts {
            self.dispatch(facts, artifact).await?;
        }
        Ok(())
    }
}
