//! appsleuth: identify downloadable macOS software
//!
//! Given a download URL, a project page on a forge or project host, an update
//! feed, or a local artifact, [`Resolver`] follows every lead it finds
//! (downloads, archives, disk images, installer packages, application bundles,
//! update feeds, project APIs) and accumulates what it learns in a
//! [`FactStore`].
//!
//! ```ignore
//! let ctx = RunContext::new(RunConfig::from_env())?;
//! let facts = Resolver::new(ctx).resolve("https://example.com/App.dmg").await?;
//! println!("{:?}", facts.bundle_id.get());
//! ```

pub mod cli;
pub mod resolve;
pub mod tracing;

pub use appsleuth_core::{Error, FactStore, Result, RunConfig, RunContext};
pub use resolve::Resolver;
