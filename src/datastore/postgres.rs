use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};

use super::{Datastore, DatastoreError, DatastoreResult, Predicate, quote_ident};
use crate::config::PostgresConfig;

/// PostgreSQL-backed document store.
///
/// Every ordinary table in the connection's current schema is a collection.
/// Documents live in a `doc` column of type `jsonb`.
pub struct PostgresDatastore {
    pool: PgPool,
}

impl PostgresDatastore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &PostgresConfig) -> DatastoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            // The URL may carry credentials, so it stays out of the message.
            .map_err(|e| DatastoreError::Connectivity(e.to_string()))?;

        tracing::debug!("Connected to PostgreSQL datastore");
        Ok(Self::new(pool))
    }

    /// WHERE clause selecting numeric `field` values below the cutoff.
    /// Binds: `$1` field name, `$2` cutoff.
    ///
    /// The CASE guards the cast so non-numeric values yield NULL instead of
    /// a cast error.
    fn where_clause() -> &'static str {
        "(CASE WHEN jsonb_typeof(doc -> $1::text) = 'number' \
         THEN (doc ->> $1::text)::double precision END) < $2::double precision"
    }
}

#[async_trait]
impl Datastore for PostgresDatastore {
    async fn list_collections(&self) -> DatastoreResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT c.relname::text
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind = 'r' AND n.nspname = current_schema()
            ORDER BY c.oid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    async fn count(&self, collection: &str, predicate: &Predicate) -> DatastoreResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(collection)?,
            Self::where_clause()
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(predicate.field)
            .bind(predicate.cutoff)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn delete(&self, collection: &str, predicate: &Predicate) -> DatastoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(collection)?,
            Self::where_clause()
        );

        let result = sqlx::query(&sql)
            .bind(predicate.field)
            .bind(predicate.cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn compact(&self) -> DatastoreResult<()> {
        // VACUUM refuses to run inside a transaction block, so it goes over
        // the simple query protocol.
        sqlx::raw_sql("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
