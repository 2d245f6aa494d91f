use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use super::{Datastore, DatastoreError, DatastoreResult, Predicate, quote_ident};
use crate::config::SqliteConfig;

/// SQLite-backed document store.
///
/// Every user table is a collection. Documents are JSON text in a `doc`
/// column.
pub struct SqliteDatastore {
    pool: SqlitePool,
}

impl SqliteDatastore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &SqliteConfig) -> DatastoreResult<Self> {
        let options = if config.path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DatastoreError::Connectivity(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(config.create_if_missing)
        };
        let options = options.busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DatastoreError::Connectivity(format!("{}: {}", config.path, e)))?;

        tracing::debug!(path = %config.path, "Opened SQLite datastore");
        Ok(Self::new(pool))
    }

    /// WHERE clause selecting numeric `field` values below the cutoff.
    /// Binds: `?1` JSON path, `?2` cutoff.
    fn where_clause() -> &'static str {
        "json_type(doc, ?1) IN ('integer', 'real') AND json_extract(doc, ?1) < ?2"
    }
}

fn json_path(predicate: &Predicate) -> String {
    format!("$.{}", predicate.field)
}

#[async_trait]
impl Datastore for SqliteDatastore {
    async fn list_collections(&self) -> DatastoreResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
            ORDER BY rowid
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
            .bind(json_path(predicate))
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
            .bind(json_path(predicate))
            .bind(predicate.cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn compact(&self) -> DatastoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_missing_file_is_connectivity_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig {
            path: dir.path().join("absent.db").display().to_string(),
            create_if_missing: false,
            busy_timeout_ms: 100,
        };

        let err = match SqliteDatastore::connect(&config).await {
            Ok(_) => panic!("connecting to a missing file should fail"),
            Err(e) => e,
        };
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_connect_on_disk_and_compact() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig {
            path: dir.path().join("ace.db").display().to_string(),
            create_if_missing: true,
            busy_timeout_ms: 1000,
        };

        let store = SqliteDatastore::connect(&config).await.unwrap();
        sqlx::query("CREATE TABLE stat_daily (id INTEGER PRIMARY KEY, doc TEXT NOT NULL)")
            .execute(&store.pool)
            .await
            .unwrap();

        assert_eq!(store.list_collections().await.unwrap(), vec!["stat_daily"]);
        store.compact().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_on_missing_collection_is_query_error() {
        let config = SqliteConfig {
            path: ":memory:".into(),
            create_if_missing: false,
            busy_timeout_ms: 1000,
        };
        let store = SqliteDatastore::connect(&config).await.unwrap();

        let err = store
            .count("stat_missing", &Predicate::older_than("time", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::Sqlx(_)));
        assert!(!err.is_connectivity());
    }
}
