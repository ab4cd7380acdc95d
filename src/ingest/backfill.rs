//! # Timestamp Backfill
//!
//! Records are inserted without a block time. A backfill pass looks up the
//! block of every unresolved record, one request at a time, and writes the
//! timestamp onto all records of that block.

use crate::chain::ChainClient;
use crate::storage::{LedgerFilter, Storage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    /// Unresolved records found when the pass started
    pub snapshot_len: usize,
    pub lookups: usize,
    pub resolved_blocks: usize,
    pub updated_records: usize,
    pub failed_lookups: usize,
}

/// Runs one backfill pass over the records unresolved at call time.
pub async fn backfill_timestamps(
    storage: &Storage,
    client: &dyn ChainClient,
) -> Result<BackfillReport, anyhow::Error> {
    let open = storage.find_token_events(&LedgerFilter::unresolved())?;
    let mut report = BackfillReport {
        snapshot_len: open.len(),
        ..Default::default()
    };
    // A block is looked up at most once per pass, whatever the outcome.
    let mut attempted = HashSet::new();

    for record in &open {
        let block_number = record.block_number;
        if !attempted.insert(block_number) {
            continue;
        }

        report.lookups += 1;
        match client.get_block(block_number).await {
            Ok(block) => match storage.set_block_timestamp(block_number, block.timestamp) {
                Ok(updated) => {
                    report.resolved_blocks += 1;
                    report.updated_records += updated;
                }
                Err(e) => {
                    report.failed_lookups += 1;
                    log::warn!("Backfill: storing timestamp of block {} failed: {}", block_number, e);
                }
            },
            Err(e) => {
                report.failed_lookups += 1;
                log::debug!("Backfill: block {} lookup failed: {}", block_number, e);
            }
        }
    }

    if report.snapshot_len > 0 {
        log::info!(
            "Backfill pass done: {} blocks resolved, {} records updated, {} lookups failed",
            report.resolved_blocks,
            report.updated_records,
            report.failed_lookups
        );
    }
    Ok(report)
}

/// Starts a backfill pass on its own task; the caller never waits for the lookups.
pub fn spawn_timestamp_backfill(
    storage: Arc<Storage>,
    client: Arc<dyn ChainClient>,
) -> JoinHandle<Option<BackfillReport>> {
    tokio::spawn(async move {
        match backfill_timestamps(&storage, client.as_ref()).await {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("Backfill pass aborted: {}", e);
                None
            }
        }
    })
}

/// Spawns a task that runs a backfill pass every `interval`.
///
/// Passes never overlap: the next one starts after the previous has finished.
pub fn spawn_backfill_loop(
    storage: Arc<Storage>,
    client: Arc<dyn ChainClient>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Backfill loop: Started (every {:?})", interval);
        loop {
            if let Err(e) = backfill_timestamps(&storage, client.as_ref()).await {
                log::error!("Backfill pass aborted: {}", e);
            }
            tokio::time::sleep(interval).await;
        }
    })
}
