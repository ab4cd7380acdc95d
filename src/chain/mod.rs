//! # Chain Data Structures
//!
//! Token events, receipts, pending transactions and the chain client boundary.

pub mod client;
pub mod event;
#[cfg(test)]
pub mod mock;
pub mod receipt;
pub mod transaction;

pub use client::*;
pub use event::*;
pub use receipt::*;
pub use transaction::*;
