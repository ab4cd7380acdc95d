//! # Token Broker Constants
//!
//! All global constants used by the ledger and the deposit workflow.

// ============================================================================
// Event Sync
// ============================================================================

/// Start block value meaning "event sync disabled"
pub const SYNC_DISABLED_BLOCK: u64 = 0;

/// Seconds between two timestamp backfill passes
pub const DEFAULT_BACKFILL_INTERVAL_SECS: u64 = 15;

/// Tokens whose events are ingested by default
pub const DEFAULT_TRACKED_TOKENS: &[&str] = &["W-ETH", "W-GNT"];

// ============================================================================
// Deposit Workflow
// ============================================================================

/// Token moved into the broker
pub const DEFAULT_DEPOSIT_TOKEN: &str = "GNT";

/// Wrapper token that creates brokers and credits the deposit
pub const DEFAULT_WRAPPER_TOKEN: &str = "W-GNT";

/// Seconds between two receipt polls for pending transactions
pub const DEFAULT_RECEIPT_POLL_INTERVAL_SECS: u64 = 3;

/// How long "Deposit Done!" stays visible before the progress resets
pub const DEFAULT_PROGRESS_RESET_DELAY_SECS: u64 = 10;

pub const PROGRESS_BROKER_CREATED: u8 = 40;
pub const PROGRESS_BROKER_FUNDED: u8 = 75;
pub const PROGRESS_DONE: u8 = 100;

pub const MSG_CREATING_APPROVAL: &str = "Creating Broker... (Waiting for your approval)";
pub const MSG_CREATING_CONFIRMATION: &str =
    "Creating Broker... (waiting for transaction confirmation)";
pub const MSG_TRANSFERRING_APPROVAL: &str = "Transferring to Broker... (Waiting for your approval)";
pub const MSG_TRANSFERRING_CONFIRMATION: &str =
    "Transferring to Broker... (waiting for transaction confirmation)";
pub const MSG_CLEARING_APPROVAL: &str = "Clearing Broker... (Waiting for your approval)";
pub const MSG_CLEARING_CONFIRMATION: &str =
    "Clearing Broker... (waiting for transaction confirmation)";
pub const MSG_DEPOSIT_DONE: &str = "Deposit Done!";

pub const ERR_CREATING_BROKER: &str =
    "Creating Broker went wrong. Please execute the desposit again.";
pub const ERR_TRANSFERRING_TO_BROKER: &str =
    "Transferring to Broker went wrong. Please execute the desposit again.";
pub const ERR_CLEARING_BROKER: &str =
    "Clearing Broker went wrong. Please execute the clearing manually again to get the deposit.";

// ============================================================================
// Storage & API
// ============================================================================

/// Settings key holding the JSON encoded `AppSettings`
pub const SETTINGS_KEY: &str = "app_settings";

/// Settings key holding the id of the deposit attempt in flight
pub const DEPOSIT_ATTEMPT_KEY: &str = "deposit_attempt";

/// Default listen address of the observer API
pub const DEFAULT_API_LISTEN_ADDR: &str = "127.0.0.1:8645";

/// Upper bound on records returned by one `/events` request
pub const MAX_EVENTS_PER_PAGE: usize = 500;
