//! Datastore capability used by the pruner.
//!
//! The pruner never talks to a database directly. It is handed a
//! [`Datastore`], which exposes exactly the four operations a retention run
//! needs: enumerate collections, count matching records, delete matching
//! records, and compact the storage afterwards.
//!
//! Backends:
//! - [`memory::MemoryDatastore`]: in-process documents, records every call
//! - `sqlite::SqliteDatastore`: one table per collection, JSON `doc` column
//! - `postgres::PostgresDatastore`: one table per collection, JSONB `doc` column

mod error;
pub mod memory;
#[cfg(feature = "database-postgres")]
pub mod postgres;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(test)]
pub mod tests;

use std::fmt;

use async_trait::async_trait;
pub use error::{DatastoreError, DatastoreResult};
use serde::Serialize;

use crate::config::DatabaseConfig;

#[async_trait]
pub trait Datastore: Send + Sync {
    /// List collection names in the datastore's own enumeration order.
    async fn list_collections(&self) -> DatastoreResult<Vec<String>>;

    /// Count records in `collection` matching `predicate`.
    async fn count(&self, collection: &str, predicate: &Predicate) -> DatastoreResult<u64>;

    /// Delete every record in `collection` matching `predicate`.
    ///
    /// Returns the number of records removed.
    async fn delete(&self, collection: &str, predicate: &Predicate) -> DatastoreResult<u64>;

    /// Reclaim space freed by deletions. May block for a long time.
    async fn compact(&self) -> DatastoreResult<()>;
}

/// Record filter: `field < cutoff`.
///
/// Only numeric field values can match. Records where the field is missing,
/// null, or not a number are never selected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Predicate {
    pub field: &'static str,
    pub cutoff: f64,
}

impl Predicate {
    pub fn older_than(field: &'static str, cutoff: f64) -> Self {
        Self { field, cutoff }
    }

    /// Evaluate the predicate against a JSON document.
    pub fn matches(&self, doc: &serde_json::Value) -> bool {
        doc.get(self.field)
            .and_then(serde_json::Value::as_f64)
            .is_some_and(|value| value < self.cutoff)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} < {}", self.field, self.cutoff)
    }
}

/// Quote a collection name for use as an SQL identifier.
#[cfg_attr(
    not(any(feature = "database-sqlite", feature = "database-postgres")),
    allow(dead_code)
)]
pub(crate) fn quote_ident(name: &str) -> DatastoreResult<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(DatastoreError::InvalidIdentifier(format!("{name:?}")));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Open the datastore described by `config`.
///
/// Any failure to reach the backend is reported as
/// [`DatastoreError::Connectivity`].
pub async fn connect(config: &DatabaseConfig) -> DatastoreResult<Box<dyn Datastore>> {
    match config {
        DatabaseConfig::None => Err(DatastoreError::NotConfigured),
        #[cfg(feature = "database-sqlite")]
        DatabaseConfig::Sqlite(cfg) => {
            let store = sqlite::SqliteDatastore::connect(cfg).await?;
            Ok(Box::new(store))
        }
        #[cfg(feature = "database-postgres")]
        DatabaseConfig::Postgres(cfg) => {
            let store = postgres::PostgresDatastore::connect(cfg).await?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod predicate_tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_predicate_matches_numbers_below_cutoff() {
        let predicate = Predicate::older_than("time", 1000.0);
        assert!(predicate.matches(&json!({"time": 999})));
        assert!(predicate.matches(&json!({"time": 999.5})));
        assert!(!predicate.matches(&json!({"time": 1000})));
        assert!(!predicate.matches(&json!({"time": 1001})));
    }

    #[test]
    fn test_predicate_ignores_non_numeric_values() {
        let predicate = Predicate::older_than("last_seen", 1000.0);
        assert!(!predicate.matches(&json!({})));
        assert!(!predicate.matches(&json!({"last_seen": null})));
        assert!(!predicate.matches(&json!({"last_seen": "500"})));
        assert!(!predicate.matches(&json!({"last_seen": [1]})));
        assert!(!predicate.matches(&json!({"other": 1})));
    }

    #[test]
    fn test_predicate_display() {
        let predicate = Predicate::older_than("assoc_time", 1_697_408_000.5);
        assert_eq!(predicate.to_string(), "assoc_time < 1697408000.5");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("stat_5minutes").unwrap(), "\"stat_5minutes\"");
        assert_eq!(quote_ident("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(matches!(
            quote_ident(""),
            Err(DatastoreError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            quote_ident("a\0b"),
            Err(DatastoreError::InvalidIdentifier(_))
        ));
    }
}
