use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("Datastore not configured")]
    NotConfigured,

    #[error("Cannot connect to datastore: {0}")]
    Connectivity(String),

    #[error("Datastore query failed: {0}")]
    Query(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DatastoreError {
    /// Whether the datastore could not be reached at all, as opposed to a
    /// failure of an individual operation.
    pub fn is_connectivity(&self) -> bool {
        match self {
            DatastoreError::NotConfigured | DatastoreError::Connectivity(_) => true,
            #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
            DatastoreError::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Configuration(_)
            ),
            _ => false,
        }
    }
}

pub type DatastoreResult<T> = Result<T, DatastoreError>;
