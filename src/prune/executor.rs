//! Per-collection count-then-delete loop.

use chrono::{DateTime, Utc};

use super::{PruneReport, PruneSummary, ReportSink, RunConfig};
use crate::{
    datastore::{Datastore, Predicate},
    error::{PruneError, PruneResult},
    policy::{self, Cutoffs},
};

/// Applies retention policies to a sequence of collections.
pub struct PruneExecutor<'a> {
    store: &'a dyn Datastore,
    config: RunConfig,
}

impl<'a> PruneExecutor<'a> {
    pub fn new(store: &'a dyn Datastore, config: RunConfig) -> Self {
        Self { store, config }
    }

    /// Process `collections` in the given order against the cutoff derived
    /// from `now`.
    ///
    /// Collections without a policy are skipped without touching the
    /// datastore. For the rest, the matched count is emitted to `sink` first;
    /// on live runs the same predicate is then deleted. The first datastore
    /// error aborts the run.
    pub async fn run(
        &self,
        collections: &[String],
        now: DateTime<Utc>,
        sink: &mut dyn ReportSink,
    ) -> PruneResult<PruneSummary> {
        let cutoffs = Cutoffs::at(now, self.config.retention_days());
        let dry_run = self.config.dry_run();
        let mut summary = PruneSummary::default();

        for name in collections {
            let Some(policy) = policy::resolve(name) else {
                tracing::trace!(collection = %name, "No retention policy, skipping");
                continue;
            };

            let predicate = Predicate::older_than(policy.timestamp_field, policy.cutoff(&cutoffs));
            tracing::debug!(
                collection = %name,
                policy = %policy,
                predicate = %predicate,
                "Counting expired records"
            );

            let matched = self
                .store
                .count(name, &predicate)
                .await
                .map_err(PruneError::collection(name, "count"))?;

            let report = PruneReport {
                collection: name.clone(),
                matched_count: matched,
                dry_run,
            };
            sink.emit(&report)?;
            summary.reports.push(report);

            if dry_run {
                continue;
            }

            let deleted = self
                .store
                .delete(name, &predicate)
                .await
                .map_err(PruneError::collection(name, "delete"))?;

            if deleted != matched {
                tracing::warn!(
                    collection = %name,
                    matched = matched,
                    deleted = deleted,
                    "Deleted count differs from matched count"
                );
            } else if deleted > 0 {
                tracing::info!(collection = %name, deleted = deleted, "Deleted expired records");
            }

            summary.deleted += deleted;
        }

        Ok(summary)
    }
}
