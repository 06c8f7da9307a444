//! Project-host inspection.

use std::sync::Arc;

use appsleuth_core::providers::{ProjectId, ProjectProvider, ProviderRequest};
use appsleuth_core::{FactStore, Inspection, ProviderKind, Result, Subject};
use tracing::{debug, info};

use super::Resolver;

fn record_identity(facts: &mut FactStore, project: &ProjectId) {
    let identity = project.to_string();
    match project.provider {
        ProviderKind::GitHub => facts.github_repo.set_if_absent(identity),
        ProviderKind::Bitbucket => facts.bitbucket_repo.set_if_absent(identity),
        ProviderKind::SourceForge => facts.sourceforge_id.set_if_absent(identity),
    };
}

impl Resolver {
    /// Ask a project host for metadata and its newest release.
    ///
    /// Provider failures are warnings: the project URL alone is not enough to
    /// fail the run.
    pub(super) async fn inspect_project(
        &self,
        facts: &mut FactStore,
        provider: Arc<dyn ProjectProvider>,
        project: ProjectId,
    ) -> Result<()> {
        let kind = provider.kind();
        if !facts.begin(Inspection::Provider(kind)) {
            debug!(%project, "Project already inspected");
            return Ok(());
        }
        record_identity(facts, &project);

        let request = ProviderRequest {
            project: &project,
            client: self.ctx.client(),
            token: self.ctx.config().token_for(kind),
        };

        let metadata = match provider.fetch_metadata(&request).await {
            Ok(metadata) => metadata,
            Err(e) => {
                facts.warn(format!("Could not read {kind} project {project}: {e}"));
                return Ok(());
            }
        };
        info!(%project, "Read project metadata");

        if metadata.is_private {
            facts.warn(format!("{project} is a private repository"));
        }
        if metadata.is_fork {
            facts.warn(format!("{project} is a fork; the upstream project may be the better source"));
        }
        match metadata.description {
            Some(description) => {
                facts.description.set_if_absent(description);
            }
            None => facts.warn(format!("{project} has no description")),
        }
        if let Some(developer) = metadata.developer {
            facts.developer.set_if_absent(developer);
        }
        if let Some(homepage) = metadata.homepage {
            facts.homepage.set_if_absent(homepage);
        }
        if let Some(name) = metadata.name {
            facts.name.set_if_absent(name);
        }

        let release = match provider.fetch_latest_release(&request).await {
            Ok(Some(release)) => release,
            Ok(None) => {
                facts.warn(format!("{project} has no release asset in a known format"));
                return Ok(());
            }
            Err(e) => {
                facts.warn(format!("Could not read releases of {project}: {e}"));
                return Ok(());
            }
        };

        if release.needs_asset_filter {
            facts.asset_filter_required.set_if_absent(true);
            facts.warn(format!(
                "{project} publishes several {} assets; a name filter is needed to pick {}",
                release.download_format, release.asset_name
            ));
        }
        if facts.download_url.is_set() {
            debug!(%project, "Download already known; not following release asset");
            return Ok(());
        }
        facts
            .download_format
            .set_if_absent(release.download_format.clone());
        self.dispatch(facts, Subject::Download(release.download_url))
            .await
    }
}
