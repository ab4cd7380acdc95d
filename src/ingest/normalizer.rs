//! # Event Normalizer
//!
//! Maps the per-kind shapes of token events onto `TokenEventRecord`.

use crate::chain::{EventKind, RawEvent, TokenEventRecord};
use crate::storage::Storage;
use num_bigint::BigUint;
use serde_json::Value;

/// Builds the ledger record for `event`, or `None` for payloads without an event name.
pub fn normalize(token_id: &str, event: &RawEvent) -> Option<TokenEventRecord> {
    let name = event.event.as_deref()?;
    let kind = EventKind::from(name);

    let (from, to, amount) = match kind {
        EventKind::Transfer => (
            event.arg_str("from"),
            event.arg_str("to"),
            event.arg("value"),
        ),
        EventKind::Deposit => (
            event.arg_str("who"),
            Some(event.address.clone()),
            event.arg("amount"),
        ),
        EventKind::Withdrawal => (
            Some(event.address.clone()),
            event.arg_str("who"),
            event.arg("amount"),
        ),
        EventKind::Other(_) => (None, None, None),
    };

    let amount = amount.and_then(|value| {
        let decimal = amount_to_decimal(value);
        if decimal.is_none() {
            log::warn!(
                "Unreadable amount {} in {} event of tx {}",
                value,
                kind.as_str(),
                event.transaction_hash
            );
        }
        decimal
    });

    Some(TokenEventRecord {
        block_number: event.block_number,
        transaction_hash: event.transaction_hash.clone(),
        timestamp: None,
        token: token_id.to_string(),
        kind,
        from,
        to,
        amount,
    })
}

/// Normalizes `event` and appends it to the ledger.
///
/// Returns the sequence number of the new record, `None` when the payload was skipped.
pub fn sync_event(
    storage: &Storage,
    token_id: &str,
    event: &RawEvent,
) -> Result<Option<u64>, anyhow::Error> {
    let Some(record) = normalize(token_id, event) else {
        return Ok(None);
    };
    let seq = storage.insert_token_event(&record)?;
    log::debug!(
        "Ledger #{}: {} {} in block {}",
        seq,
        token_id,
        record.kind.as_str(),
        record.block_number
    );
    Ok(Some(seq))
}

/// Renders an unsigned integer argument in base 10.
///
/// Accepts decimal strings, `0x` hex strings and JSON integers.
pub fn amount_to_decimal(value: &Value) -> Option<String> {
    let parsed = match value {
        Value::String(s) => parse_biguint(s.trim()),
        // Integer literals keep every digit; floats and negatives do not parse.
        Value::Number(n) => BigUint::parse_bytes(n.to_string().as_bytes(), 10),
        _ => None,
    }?;
    Some(parsed.to_str_radix(10))
}

fn parse_biguint(s: &str) -> Option<BigUint> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        return BigUint::parse_bytes(hex.as_bytes(), 16);
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}
