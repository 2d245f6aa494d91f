//! Retention pruning for document datastores.
//!
//! Collections are matched to a retention policy by name prefix. Records
//! whose timestamp falls before `now - retention days` are counted, reported,
//! and on live runs deleted, after which the datastore is compacted.

pub mod config;
pub mod datastore;
pub mod error;
pub mod observability;
pub mod policy;
pub mod prune;

pub use error::{PruneError, PruneResult};
pub use prune::{PruneReport, PruneSummary, RunConfig, prune, prune_at};
