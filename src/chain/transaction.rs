//! # Pending Transactions
//!
//! In-flight on-chain calls of the deposit workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which step of the deposit a transaction belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    CreateBroker,
    TransferToBroker,
    ClearBroker,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::CreateBroker => "create_broker",
            TxKind::TransferToBroker => "transfer_to_broker",
            TxKind::ClearBroker => "clear_broker",
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes the next phase needs. Carried unchanged from phase to phase
/// except for `broker`, which is learnt from the create_broker receipt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DepositContext {
    /// Deposit attempt this transaction was submitted for
    pub attempt: Uuid,
    /// Base-10 amount in the token's smallest unit
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(rename = "type", default = "default_context_type")]
    pub kind: String,
}

fn default_context_type() -> String {
    "deposit".to_string()
}

impl DepositContext {
    pub fn new(attempt: Uuid, amount: String) -> Self {
        DepositContext {
            attempt,
            amount,
            broker: None,
            kind: default_context_type(),
        }
    }

    pub fn with_broker(&self, broker: String) -> Self {
        DepositContext {
            broker: Some(broker),
            ..self.clone()
        }
    }
}

/// One submitted transaction waiting for its receipt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub kind: TxKind,
    pub tx_hash: String,
    pub context: DepositContext,
    pub submitted_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn new(kind: TxKind, tx_hash: String, context: DepositContext) -> Self {
        PendingTransaction {
            kind,
            tx_hash,
            context,
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&TxKind::TransferToBroker).unwrap(),
            "\"transfer_to_broker\""
        );
        assert_eq!(TxKind::ClearBroker.to_string(), "clear_broker");
    }

    #[test]
    fn test_context_keeps_attempt_when_broker_added() {
        let attempt = Uuid::new_v4();
        let ctx = DepositContext::new(attempt, "1000".to_string());
        let next = ctx.with_broker("0xabc".to_string());
        assert_eq!(next.attempt, attempt);
        assert_eq!(next.amount, "1000");
        assert_eq!(next.broker.as_deref(), Some("0xabc"));
        assert_eq!(next.kind, "deposit");
    }
}
