//! Update feed inspection.

use std::path::Path;

use appsleuth_core::{FactStore, Inspection, Result, Subject};
use appsleuth_provider_sparkle::load_feed;
use tracing::{debug, info};

use super::Resolver;

impl Resolver {
    pub(super) async fn inspect_feed(
        &self,
        facts: &mut FactStore,
        url: &str,
        local: Option<&Path>,
    ) -> Result<()> {
        if !facts.begin(Inspection::SparkleFeed) {
            debug!(%url, "Update feed already inspected");
            return Ok(());
        }
        facts.sparkle_feed.set_if_absent(url.to_string());

        let user_agent = facts.user_agent.as_deref().map(str::to_string);
        let feed = match load_feed(self.ctx.client(), url, local, user_agent.as_deref()).await {
            Ok(feed) => feed,
            Err(e) => {
                facts.warn(format!("Could not read update feed {url}: {e}"));
                return Ok(());
            }
        };

        let Some(latest) = feed.latest() else {
            facts.warn(format!("Update feed {url} lists no downloadable items"));
            return Ok(());
        };
        info!(%url, latest = %latest.url, "Chose newest feed item");

        facts.sparkle_provides_version.set_if_absent(latest.has_version());
        if !latest.has_version() {
            facts.warn(format!("Update feed {url} carries no version information"));
        }
        if let Some(minimum_os) = &latest.minimum_os {
            facts.minimum_os_version.set_if_absent(minimum_os.clone());
        }

        if facts.download_url.is_set() {
            return Ok(());
        }
        let next = Subject::Download(latest.url.clone());
        self.dispatch(facts, next).await
    }
}
