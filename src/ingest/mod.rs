//! # Event Ingestion
//!
//! Watcher → normalizer → ledger, and the timestamp backfill over the ledger.

pub mod backfill;
pub mod normalizer;
pub mod watcher;

pub use backfill::{backfill_timestamps, spawn_backfill_loop, spawn_timestamp_backfill, BackfillReport};
pub use normalizer::{normalize, sync_event};
pub use watcher::start_watching;
