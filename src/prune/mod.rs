//! Retention run orchestration.
//!
//! A run:
//! 1. Enumerates collections once, in the datastore's order
//! 2. Fixes the reference time, so every collection shares one cutoff
//! 3. Counts expired records per policy collection and reports the count
//! 4. On live runs, deletes those records right after reporting
//! 5. On live runs, compacts the datastore once every collection is done
//!
//! Any datastore failure aborts the run. Reports already emitted stay
//! emitted, and compaction is skipped.

mod compactor;
mod executor;
mod report;

use chrono::{DateTime, Utc};
pub use compactor::Compactor;
pub use executor::PruneExecutor;
pub use report::{LineSink, PruneReport, PruneSummary, ReportSink};

use crate::{
    config::RetentionConfig,
    datastore::Datastore,
    error::{PruneError, PruneResult},
};

/// Validated parameters for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    retention_days: u32,
    dry_run: bool,
}

impl RunConfig {
    /// `retention_days` must be a positive whole number of days.
    pub fn new(retention_days: i64, dry_run: bool) -> PruneResult<Self> {
        if retention_days <= 0 {
            return Err(PruneError::Configuration(format!(
                "retention days must be greater than zero, got {retention_days}"
            )));
        }
        let retention_days = u32::try_from(retention_days).map_err(|_| {
            PruneError::Configuration(format!(
                "retention days is too large: {retention_days}"
            ))
        })?;
        Ok(Self {
            retention_days,
            dry_run,
        })
    }

    pub fn from_retention(config: &RetentionConfig) -> PruneResult<Self> {
        Self::new(config.days, config.dry_run)
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Run retention against `store` using the current time.
pub async fn prune(
    store: &dyn Datastore,
    config: RunConfig,
    sink: &mut dyn ReportSink,
) -> PruneResult<PruneSummary> {
    let collections = store.list_collections().await?;
    let now = Utc::now();
    prune_at(store, config, &collections, now, sink).await
}

/// Run retention over an already enumerated set of collections at a fixed
/// reference time.
pub async fn prune_at(
    store: &dyn Datastore,
    config: RunConfig,
    collections: &[String],
    now: DateTime<Utc>,
    sink: &mut dyn ReportSink,
) -> PruneResult<PruneSummary> {
    let dry_run_msg = if config.dry_run() { " (DRY RUN)" } else { "" };

    tracing::info!(
        collections = collections.len(),
        retention_days = config.retention_days(),
        now = %now.to_rfc3339(),
        "Starting prune run{}",
        dry_run_msg
    );

    let mut summary = PruneExecutor::new(store, config)
        .run(collections, now, sink)
        .await?;

    if !config.dry_run() {
        Compactor::new(store).compact().await?;
        summary.compacted = true;
    }

    if summary.has_deletions() || summary.total_matched() > 0 {
        tracing::info!(
            matched = summary.total_matched(),
            deleted = summary.deleted,
            compacted = summary.compacted,
            "Prune run complete{}",
            dry_run_msg
        );
    } else {
        tracing::debug!("Prune run complete, no records to delete");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::datastore::{
        DatastoreError,
        memory::{DatastoreCall, MemoryDatastore, Operation},
    };

    const NOW_MILLIS: i64 = 1_700_000_000_000;
    const DAY_MILLIS: i64 = 86_400_000;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(NOW_MILLIS).unwrap()
    }

    /// One record per policy collection on each side of a 30-day cutoff
    /// taken at `now_ms`.
    fn store_at(now_ms: i64) -> MemoryDatastore {
        let old_ms = now_ms - 31 * DAY_MILLIS;
        let fresh_ms = now_ms - 29 * DAY_MILLIS;
        MemoryDatastore::new()
            .with_collection(
                "stat_a",
                [json!({"time": old_ms}), json!({"time": fresh_ms})],
            )
            .with_collection("config", [json!({"time": old_ms})])
            .with_collection(
                "user_b",
                [
                    json!({"last_seen": old_ms as f64 / 1000.0}),
                    json!({"last_seen": fresh_ms as f64 / 1000.0}),
                ],
            )
    }

    fn store() -> MemoryDatastore {
        store_at(Utc::now().timestamp_millis())
    }

    #[test]
    fn test_run_config_rejects_non_positive_days() {
        assert!(matches!(
            RunConfig::new(0, true),
            Err(PruneError::Configuration(_))
        ));
        assert!(matches!(
            RunConfig::new(-5, false),
            Err(PruneError::Configuration(_))
        ));
        assert!(matches!(
            RunConfig::new(i64::from(u32::MAX) + 1, true),
            Err(PruneError::Configuration(_))
        ));
        let config = RunConfig::new(30, false).unwrap();
        assert_eq!(config.retention_days(), 30);
        assert!(!config.dry_run());
    }

    #[test]
    fn test_run_config_from_retention_defaults() {
        let config = RunConfig::from_retention(&RetentionConfig::default()).unwrap();
        assert_eq!(config.retention_days(), 30);
        assert!(config.dry_run());
    }

    #[tokio::test]
    async fn test_dry_run_lists_and_counts_only() {
        let store = store();
        let mut sink = Vec::new();

        let summary = prune(&store, RunConfig::new(30, true).unwrap(), &mut sink)
            .await
            .unwrap();

        assert!(!summary.compacted);
        assert_eq!(summary.deleted, 0);
        assert_eq!(
            sink.iter()
                .map(|r| (r.collection.as_str(), r.matched_count))
                .collect::<Vec<_>>(),
            vec![("stat_a", 1), ("user_b", 1)]
        );

        let operations: Vec<_> = store.calls().await.iter().map(|c| c.operation()).collect();
        assert_eq!(
            operations,
            vec![Operation::ListCollections, Operation::Count, Operation::Count]
        );
    }

    #[tokio::test]
    async fn test_live_run_compacts_once_at_end() {
        let store = store();
        let mut sink = Vec::new();

        let summary = prune(&store, RunConfig::new(30, false).unwrap(), &mut sink)
            .await
            .unwrap();

        assert!(summary.compacted);
        assert_eq!(summary.deleted, 2);

        let calls = store.calls().await;
        assert_eq!(calls.first(), Some(&DatastoreCall::ListCollections));
        assert_eq!(calls.last(), Some(&DatastoreCall::Compact));
        assert_eq!(
            calls
                .iter()
                .filter(|c| c.operation() == Operation::Compact)
                .count(),
            1
        );
        assert_eq!(
            calls
                .iter()
                .filter(|c| c.operation() == Operation::Delete)
                .filter_map(DatastoreCall::collection)
                .collect::<Vec<_>>(),
            vec!["stat_a", "user_b"]
        );
        assert_eq!(store.len("config").await, 1);
    }

    #[tokio::test]
    async fn test_live_run_compacts_even_when_nothing_matched() {
        let store = MemoryDatastore::new().with_collection("event", Vec::<serde_json::Value>::new());
        let summary = prune(&store, RunConfig::new(30, false).unwrap(), &mut Vec::new())
            .await
            .unwrap();

        assert!(summary.compacted);
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].matched_count, 0);
        // The delete is still issued for the empty collection.
        let operations: Vec<_> = store.calls().await.iter().map(|c| c.operation()).collect();
        assert_eq!(
            operations,
            vec![
                Operation::ListCollections,
                Operation::Count,
                Operation::Delete,
                Operation::Compact
            ]
        );
    }

    #[tokio::test]
    async fn test_prune_at_uses_fixed_reference_time() {
        let store = store_at(NOW_MILLIS);
        let collections = vec!["stat_a".to_string(), "user_b".to_string()];
        // One day later the fresh records are still inside the window.
        let later = now() + chrono::Duration::days(1);

        let summary = prune_at(
            &store,
            RunConfig::new(30, true).unwrap(),
            &collections,
            later,
            &mut Vec::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.total_matched(), 2);

        // Two days later they are not.
        let much_later = now() + chrono::Duration::days(2);
        let summary = prune_at(
            &store,
            RunConfig::new(30, true).unwrap(),
            &collections,
            much_later,
            &mut Vec::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.total_matched(), 4);
    }

    #[tokio::test]
    async fn test_live_run_is_idempotent() {
        let store = store();
        let config = RunConfig::new(30, false).unwrap();

        let first = prune(&store, config, &mut Vec::new()).await.unwrap();
        assert_eq!(first.deleted, 2);

        let second = prune(&store, config, &mut Vec::new()).await.unwrap();
        assert_eq!(second.deleted, 0);
        assert!(second.reports.iter().all(|r| r.matched_count == 0));
        assert!(second.compacted);
    }

    #[tokio::test]
    async fn test_delete_failure_skips_compaction() {
        let store = store().fail_on(Operation::Delete, Some("user_b"));
        let mut sink = Vec::new();

        let err = prune(&store, RunConfig::new(30, false).unwrap(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, PruneError::Collection { operation: "delete", .. }));
        assert_eq!(sink.len(), 2);
        assert!(
            store
                .calls()
                .await
                .iter()
                .all(|c| c.operation() != Operation::Compact)
        );
    }

    #[tokio::test]
    async fn test_list_failure_aborts_before_counting() {
        let store = store().fail_on(Operation::ListCollections, None);
        let mut sink = Vec::new();

        let err = prune(&store, RunConfig::new(30, false).unwrap(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PruneError::Datastore(DatastoreError::Query(_))
        ));
        assert!(sink.is_empty());
        assert_eq!(store.calls().await, vec![DatastoreCall::ListCollections]);
    }

    #[tokio::test]
    async fn test_compaction_failure_is_reported() {
        let store = store().fail_on(Operation::Compact, None);
        let mut sink = Vec::new();

        let err = prune(&store, RunConfig::new(30, false).unwrap(), &mut sink)
            .await
            .unwrap_err();

        assert!(err.datastore_error().is_some());
        // Deletions happened before compaction was attempted.
        assert_eq!(store.len("stat_a").await, 1);
        assert_eq!(sink.len(), 2);
    }
}
