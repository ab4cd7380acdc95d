//! # Transaction Receipts
//!
//! Receipts as handed over by the chain client once a transaction is mined.

use serde::{Deserialize, Serialize};

/// Structured event data emitted by a contract during execution
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LogEntry {
    #[serde(default)]
    pub address: String,
    /// Indexed fields, 32-byte hex words
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// The chain's confirmation record for a submitted transaction
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    /// A receipt without logs is the only revert signal the workflow trusts.
    pub fn is_reverted(&self) -> bool {
        self.logs.is_empty()
    }

    /// Broker address announced by the wrapper: second topic of the first log.
    pub fn broker_address(&self) -> Option<String> {
        let topic = self.logs.first()?.topics.get(1)?;
        topic_to_address(topic)
    }
}

/// Takes the low 20 bytes of a 32-byte topic word. Shorter values are kept as they are.
pub fn topic_to_address(topic: &str) -> Option<String> {
    let digits = topic
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    if digits.is_empty() || hex::decode(pad_even(digits)).is_err() {
        return None;
    }
    let tail = if digits.len() > 40 {
        &digits[digits.len() - 40..]
    } else {
        digits
    };
    Some(format!("0x{}", tail))
}

fn pad_even(digits: &str) -> String {
    if digits.len() % 2 == 0 {
        digits.to_string()
    } else {
        format!("0{}", digits)
    }
}
