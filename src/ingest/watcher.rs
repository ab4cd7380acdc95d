//! # Token Event Watcher
//!
//! One live subscription per tracked token. Every delivered event goes through
//! the normalizer into the ledger; delivery errors are dropped.

use crate::chain::ChainClient;
use crate::ingest::normalizer::sync_event;
use crate::storage::Storage;
use crate::utils::constants::SYNC_DISABLED_BLOCK;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Subscribes to all events of each tracked token from `start_block` onwards.
///
/// Returns one task per distinct token. Nothing is started when `start_block`
/// is the "sync disabled" sentinel.
pub fn start_watching(
    storage: Arc<Storage>,
    client: Arc<dyn ChainClient>,
    tracked_tokens: &[String],
    start_block: u64,
) -> Vec<JoinHandle<()>> {
    if start_block == SYNC_DISABLED_BLOCK {
        log::info!("Event sync disabled, not watching token events");
        return Vec::new();
    }
    log::info!("Filtering token events from block {}", start_block);

    let mut seen: Vec<&String> = Vec::new();
    let mut handles = Vec::new();
    for token_id in tracked_tokens {
        if seen.contains(&token_id) {
            continue;
        }
        seen.push(token_id);
        handles.push(spawn_token_watcher(
            storage.clone(),
            client.clone(),
            token_id.clone(),
            start_block,
        ));
    }
    handles
}

fn spawn_token_watcher(
    storage: Arc<Storage>,
    client: Arc<dyn ChainClient>,
    token_id: String,
    start_block: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let token = match client.get_token(&token_id).await {
            Ok(token) => token,
            Err(e) => {
                log::error!("Watcher[{}]: token lookup failed: {}", token_id, e);
                return;
            }
        };

        let mut events = match token.all_events(start_block).await {
            Ok(events) => events,
            Err(e) => {
                log::error!("Watcher[{}]: subscription failed: {}", token_id, e);
                return;
            }
        };
        log::info!(
            "Watcher[{}]: subscribed to {} from block {}",
            token_id,
            token.address(),
            start_block
        );

        while let Some(delivery) = events.next().await {
            match delivery {
                Ok(event) => {
                    if let Err(e) = sync_event(&storage, &token_id, &event) {
                        log::error!(
                            "Watcher[{}]: storing event of tx {} failed: {}",
                            token_id,
                            event.transaction_hash,
                            e
                        );
                    }
                }
                Err(e) => log::debug!("Watcher[{}]: dropped event delivery: {}", token_id, e),
            }
        }

        log::info!("Watcher[{}]: subscription closed", token_id);
    })
}
