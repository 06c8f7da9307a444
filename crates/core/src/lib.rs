//! Core types for appsleuth
//!
//! This crate holds everything the resolution pipeline shares:
//! - [`FactStore`], the accumulator of everything learned about a piece of software
//! - [`Subject`] and [`Inspection`], the artifacts and visited-set states
//! - the [`format`] catalogue and classifier
//! - [`version`] comparison and version-key choice
//! - [`select::most_likely`] for picking the primary application
//! - the [`fetch`] client and the [`providers`] abstraction
//! - [`RunContext`], the per-run scratch area and collaborators

pub mod artifact;
pub mod command;
pub mod context;
mod error;
pub mod facts;
pub mod fetch;
pub mod format;
pub mod providers;
pub mod select;
pub mod version;

pub use artifact::{Inspection, ProviderKind, Subject};
pub use context::{RunConfig, RunContext};
pub use error::{Error, Result};
pub use facts::{Fact, FactStore};
