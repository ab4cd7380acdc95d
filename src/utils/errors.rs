use crate::chain::ChainError;

/// Turns a submission error into the one-line text shown to the user.
pub fn pretty_error(error: &ChainError) -> String {
    match error {
        ChainError::Rejected(_) => {
            "Transaction was rejected. Please approve it in your wallet to continue.".to_string()
        }
        // Node errors already carry a readable message; the variant prefix adds nothing.
        ChainError::Rpc(message) => clean_message(message),
        other => clean_message(&other.to_string()),
    }
}

fn clean_message(raw: &str) -> String {
    let first_line = raw.lines().next().unwrap_or_default().trim();
    let message = first_line
        .strip_prefix("Error:")
        .map(str::trim_start)
        .unwrap_or(first_line);

    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown error".to_string(),
    }
}
