use crate::chain::{ChainClient, PendingTransaction, Receipt, TxKind};
use crate::storage::Storage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A pending transaction together with the receipt that retired it.
#[derive(Debug, Clone)]
pub struct TrackedOutcome {
    pub pending: PendingTransaction,
    pub receipt: Receipt,
}

/// Registry of submitted transactions waiting for a receipt.
///
/// Entries are persisted so they survive a restart. Once a receipt arrives the
/// entry is removed and an outcome is published; there is no other signal.
#[derive(Clone)]
pub struct TransactionTracker {
    pub pending_txs: Arc<Mutex<HashMap<String, PendingTransaction>>>,
    pub storage: Arc<Storage>,
    outcomes: mpsc::UnboundedSender<TrackedOutcome>,
}

impl TransactionTracker {
    pub fn new(storage: Arc<Storage>) -> (Self, mpsc::UnboundedReceiver<TrackedOutcome>) {
        let (outcomes, receiver) = mpsc::unbounded_channel();
        let tracker = TransactionTracker {
            pending_txs: Arc::new(Mutex::new(HashMap::new())),
            storage,
            outcomes,
        };
        (tracker, receiver)
    }

    pub fn load_from_db(&self) -> Result<usize, String> {
        match self.storage.get_all_pending_txs() {
            Ok(txs) => {
                let mut pool = self.pending_txs.lock().unwrap();
                let count = txs.len();
                for tx in txs {
                    pool.insert(tx.tx_hash.clone(), tx);
                }
                Ok(count)
            }
            Err(e) => Err(format!("Failed to load pending transactions from DB: {}", e)),
        }
    }

    /// Registers a submitted transaction.
    ///
    /// Only one transaction per kind is tracked; an older one of the same kind is superseded.
    pub fn register(&self, tx: PendingTransaction) -> Result<(), anyhow::Error> {
        let mut pool = self.pending_txs.lock().unwrap();

        let superseded: Vec<String> = pool
            .values()
            .filter(|p| p.kind == tx.kind && p.tx_hash != tx.tx_hash)
            .map(|p| p.tx_hash.clone())
            .collect();
        for hash in superseded {
            log::warn!("Superseding pending {} transaction {}", tx.kind, hash);
            pool.remove(&hash);
            if let Err(e) = self.storage.remove_pending_tx(&hash) {
                log::warn!("Failed to remove persisted pending transaction {}: {}", hash, e);
            }
        }

        self.storage.save_pending_tx(&tx)?;
        log::info!("Tracking {} transaction {}", tx.kind, tx.tx_hash);
        pool.insert(tx.tx_hash.clone(), tx);
        Ok(())
    }

    /// Retires the transaction `receipt` belongs to and publishes the outcome.
    ///
    /// Returns false for receipts of transactions that are not tracked.
    pub fn observe_receipt(&self, receipt: Receipt) -> bool {
        let pending = {
            let mut pool = self.pending_txs.lock().unwrap();
            pool.remove(&receipt.transaction_hash)
        };
        let Some(pending) = pending else {
            return false;
        };

        if let Err(e) = self.storage.remove_pending_tx(&pending.tx_hash) {
            log::warn!(
                "Failed to remove persisted pending transaction {}: {}",
                pending.tx_hash,
                e
            );
        }
        log::info!(
            "Receipt for {} transaction {} ({} logs)",
            pending.kind,
            pending.tx_hash,
            receipt.logs.len()
        );
        if self.outcomes.send(TrackedOutcome { pending, receipt }).is_err() {
            log::warn!("No observer for transaction outcomes");
        }
        true
    }

    pub fn get_pending_transactions(&self) -> Vec<PendingTransaction> {
        let pool = self.pending_txs.lock().unwrap();
        pool.values().cloned().collect()
    }

    pub fn pending_of_kind(&self, kind: TxKind) -> Option<PendingTransaction> {
        let pool = self.pending_txs.lock().unwrap();
        pool.values().find(|p| p.kind == kind).cloned()
    }

    pub fn len(&self) -> usize {
        let pool = self.pending_txs.lock().unwrap();
        pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asks the node once for the receipt of every pending transaction.
    pub async fn poll_receipts(&self, client: &dyn ChainClient) -> usize {
        let hashes: Vec<String> = {
            let pool = self.pending_txs.lock().unwrap();
            pool.keys().cloned().collect()
        };

        let mut retired = 0;
        for hash in hashes {
            match client.get_receipt(&hash).await {
                Ok(Some(receipt)) => {
                    if self.observe_receipt(receipt) {
                        retired += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => log::debug!("Receipt lookup for {} failed: {}", hash, e),
            }
        }
        retired
    }
}

/// Spawns the task polling receipts of pending transactions every `interval`.
pub fn spawn_receipt_poller(
    tracker: TransactionTracker,
    client: Arc<dyn ChainClient>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Receipt poller: Started (every {:?})", interval);
        loop {
            if !tracker.is_empty() {
                tracker.poll_receipts(client.as_ref()).await;
            }
            tokio::time::sleep(interval).await;
        }
    })
}
