//! # Chain Client Boundary
//!
//! The node connection, token contracts and broker contracts as seen by the
//! ledger and the deposit workflow. Wire protocol and ABI encoding live in
//! the implementations, not here.

use crate::chain::{BlockInfo, RawEvent, Receipt};
use async_trait::async_trait;
use futures::stream::BoxStream;
use num_bigint::BigUint;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The wallet refused to sign
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Live event subscription. Ends only when the client drops it.
pub type EventStream = BoxStream<'static, ChainResult<RawEvent>>;

/// Transaction hash returned on submission
pub type TxHash = String;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_block(&self, number: u64) -> ChainResult<BlockInfo>;

    async fn get_token(&self, token_id: &str) -> ChainResult<Arc<dyn TokenContract>>;

    /// Broker contract deployed at `address`.
    fn broker_at(&self, address: &str) -> Arc<dyn BrokerContract>;

    /// `Ok(None)` while the transaction is not mined yet.
    async fn get_receipt(&self, tx_hash: &str) -> ChainResult<Option<Receipt>>;
}

#[async_trait]
pub trait TokenContract: Send + Sync {
    fn address(&self) -> &str;

    /// All events of this contract from `from_block` to latest and onwards.
    async fn all_events(&self, from_block: u64) -> ChainResult<EventStream>;

    async fn transfer(&self, to: &str, amount: &BigUint) -> ChainResult<TxHash>;

    /// Only wrapper tokens create brokers.
    async fn create_broker(&self) -> ChainResult<TxHash> {
        Err(ChainError::Unsupported(format!(
            "{} does not create brokers",
            self.address()
        )))
    }
}

#[async_trait]
pub trait BrokerContract: Send + Sync {
    /// Moves the broker's balance into the wrapper and credits the owner.
    async fn clear(&self) -> ChainResult<TxHash>;
}
