//! In-memory chain used by the tests. Records every call it receives.

use crate::chain::{
    BlockInfo, BrokerContract, ChainClient, ChainError, ChainResult, EventStream, RawEvent,
    Receipt, TokenContract, TxHash,
};
use async_trait::async_trait;
use futures::StreamExt;
use num_bigint::BigUint;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockChain {
    pub blocks: Mutex<HashMap<u64, u64>>,
    pub block_calls: Mutex<Vec<u64>>,
    pub tokens: Mutex<HashMap<String, Arc<MockToken>>>,
    pub token_lookups: Mutex<Vec<String>>,
    pub receipts: Mutex<HashMap<String, Receipt>>,
    pub brokers: Mutex<HashMap<String, Arc<MockBroker>>>,
    pub clear_error: Mutex<Option<ChainError>>,
    tx_counter: Arc<AtomicU64>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(MockChain::default())
    }

    pub fn add_block(&self, number: u64, timestamp: u64) {
        self.blocks.lock().unwrap().insert(number, timestamp);
    }

    pub fn add_token(&self, token_id: &str, address: &str) -> Arc<MockToken> {
        let token = Arc::new(MockToken {
            address: address.to_string(),
            events: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            brokers_created: AtomicU64::new(0),
            tx_counter: self.tx_counter.clone(),
        });
        self.tokens
            .lock()
            .unwrap()
            .insert(token_id.to_string(), token.clone());
        token
    }

    pub fn add_receipt(&self, receipt: Receipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash.clone(), receipt);
    }

    pub fn broker(&self, address: &str) -> Option<Arc<MockBroker>> {
        self.brokers.lock().unwrap().get(address).cloned()
    }

    pub fn block_calls(&self) -> Vec<u64> {
        self.block_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_block(&self, number: u64) -> ChainResult<BlockInfo> {
        self.block_calls.lock().unwrap().push(number);
        // Let other tasks run, like a real round trip would.
        tokio::task::yield_now().await;
        match self.blocks.lock().unwrap().get(&number) {
            Some(timestamp) => Ok(BlockInfo {
                number,
                timestamp: *timestamp,
            }),
            None => Err(ChainError::NotFound(format!("block {}", number))),
        }
    }

    async fn get_token(&self, token_id: &str) -> ChainResult<Arc<dyn TokenContract>> {
        self.token_lookups.lock().unwrap().push(token_id.to_string());
        match self.tokens.lock().unwrap().get(token_id) {
            Some(token) => Ok(token.clone() as Arc<dyn TokenContract>),
            None => Err(ChainError::NotFound(format!("token {}", token_id))),
        }
    }

    fn broker_at(&self, address: &str) -> Arc<dyn BrokerContract> {
        let mut brokers = self.brokers.lock().unwrap();
        let broker = brokers
            .entry(address.to_string())
            .or_insert_with(|| {
                Arc::new(MockBroker {
                    address: address.to_string(),
                    clears: AtomicU64::new(0),
                    error: self.clear_error.lock().unwrap().take(),
                    tx_counter: self.tx_counter.clone(),
                })
            })
            .clone();
        broker
    }

    async fn get_receipt(&self, tx_hash: &str) -> ChainResult<Option<Receipt>> {
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }
}

pub struct MockToken {
    pub address: String,
    pub events: Mutex<Vec<ChainResult<RawEvent>>>,
    pub subscriptions: Mutex<Vec<u64>>,
    pub transfers: Mutex<Vec<(String, BigUint)>>,
    /// Returned by the next submission instead of a hash
    pub next_error: Mutex<Option<ChainError>>,
    pub brokers_created: AtomicU64,
    tx_counter: Arc<AtomicU64>,
}

impl MockToken {
    pub fn push_event(&self, event: ChainResult<RawEvent>) {
        self.events.lock().unwrap().push(event);
    }

    pub fn fail_next(&self, error: ChainError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    pub fn transfers(&self) -> Vec<(String, BigUint)> {
        self.transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenContract for MockToken {
    fn address(&self) -> &str {
        &self.address
    }

    async fn all_events(&self, from_block: u64) -> ChainResult<EventStream> {
        self.subscriptions.lock().unwrap().push(from_block);
        let events = self.events.lock().unwrap().clone();
        Ok(futures::stream::iter(events).boxed())
    }

    async fn transfer(&self, to: &str, amount: &BigUint) -> ChainResult<TxHash> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        self.transfers
            .lock()
            .unwrap()
            .push((to.to_string(), amount.clone()));
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xtransfer{}", n))
    }

    async fn create_broker(&self) -> ChainResult<TxHash> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        self.brokers_created.fetch_add(1, Ordering::SeqCst);
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xcreate{}", n))
    }
}

pub struct MockBroker {
    pub address: String,
    pub clears: AtomicU64,
    error: Option<ChainError>,
    tx_counter: Arc<AtomicU64>,
}

#[async_trait]
impl BrokerContract for MockBroker {
    async fn clear(&self) -> ChainResult<TxHash> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.clears.fetch_add(1, Ordering::SeqCst);
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xclear{}", n))
    }
}

/// Event as the client decodes it; `args` given as `(name, json)` pairs.
pub fn raw_event(
    name: Option<&str>,
    address: &str,
    block_number: u64,
    tx_hash: &str,
    args: &[(&str, Value)],
) -> RawEvent {
    let mut map = Map::new();
    for (key, value) in args {
        map.insert(key.to_string(), value.clone());
    }
    RawEvent {
        event: name.map(str::to_string),
        address: address.to_string(),
        block_number,
        transaction_hash: tx_hash.to_string(),
        args: map,
    }
}
