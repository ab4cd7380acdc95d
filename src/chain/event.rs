//! # Token Events
//!
//! Raw contract events as delivered by the chain client, and the canonical
//! ledger record they are normalized into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A contract event as decoded by the chain client.
///
/// `event` is the event name (`Transfer`, `Deposit`, ...). Payloads that are
/// not events at all come through with `event: None`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub event: Option<String>,
    /// Address of the emitting contract
    #[serde(default)]
    pub address: String,
    pub block_number: u64,
    pub transaction_hash: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl RawEvent {
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// String form of an address-like argument.
    pub fn arg_str(&self, name: &str) -> Option<String> {
        match self.args.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Kind of a ledger record, derived from the lower-cased event name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Transfer,
    Deposit,
    Withdrawal,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Transfer => "transfer",
            EventKind::Deposit => "deposit",
            EventKind::Withdrawal => "withdrawal",
            EventKind::Other(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        let lower = name.to_lowercase();
        match lower.as_str() {
            "transfer" => EventKind::Transfer,
            "deposit" => EventKind::Deposit,
            "withdrawal" => EventKind::Withdrawal,
            _ => EventKind::Other(lower),
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        EventKind::from(name.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One ledger row per on-chain token event. Append-only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenEventRecord {
    pub block_number: u64,
    pub transaction_hash: String,
    /// Block time in seconds, `None` until the backfiller resolves it
    pub timestamp: Option<u64>,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Base-10 amount; never a native number, on-chain values overflow them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

impl TokenEventRecord {
    pub fn block_time(&self) -> Option<DateTime<Utc>> {
        let ts = i64::try_from(self.timestamp?).ok()?;
        DateTime::from_timestamp(ts, 0)
    }
}

/// Header data of a block, as far as the ledger needs it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}
