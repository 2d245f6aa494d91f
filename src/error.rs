use thiserror::Error;

use crate::datastore::DatastoreError;

/// Errors that abort a prune run.
#[derive(Debug, Error)]
pub enum PruneError {
    /// Invalid run configuration. Raised before any collection is touched.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    /// A datastore operation on one collection failed mid-run.
    #[error("Failed to {operation} collection {collection}: {source}")]
    Collection {
        collection: String,
        operation: &'static str,
        #[source]
        source: DatastoreError,
    },

    /// A report line could not be written.
    #[error("Failed to write report: {0}")]
    Output(#[from] std::io::Error),
}

impl PruneError {
    pub(crate) fn collection(
        collection: &str,
        operation: &'static str,
    ) -> impl FnOnce(DatastoreError) -> Self {
        move |source| PruneError::Collection {
            collection: collection.to_string(),
            operation,
            source,
        }
    }

    /// The underlying datastore error, if this failure came from the datastore.
    pub fn datastore_error(&self) -> Option<&DatastoreError> {
        match self {
            PruneError::Datastore(e) | PruneError::Collection { source: e, .. } => Some(e),
            PruneError::Configuration(_) | PruneError::Output(_) => None,
        }
    }
}

pub type PruneResult<T> = Result<T, PruneError>;
