use std::time::Instant;

use crate::{datastore::Datastore, error::PruneResult};

/// Runs the storage compaction pass after live deletions.
pub struct Compactor<'a> {
    store: &'a dyn Datastore,
}

impl<'a> Compactor<'a> {
    pub fn new(store: &'a dyn Datastore) -> Self {
        Self { store }
    }

    /// Compact the whole datastore. Can take a long time on large stores.
    pub async fn compact(&self) -> PruneResult<()> {
        tracing::info!("Compacting datastore");
        let started = Instant::now();

        self.store.compact().await?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compaction finished"
        );
        Ok(())
    }
}
