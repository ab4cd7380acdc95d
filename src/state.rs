use crate::deposit::progress::ProgressHandle;
use crate::deposit::tracker::TransactionTracker;
use crate::deposit::DepositHandle;
use crate::storage::Storage;
use crate::utils::constants::{
    DEFAULT_API_LISTEN_ADDR, DEFAULT_BACKFILL_INTERVAL_SECS, DEFAULT_DEPOSIT_TOKEN,
    DEFAULT_PROGRESS_RESET_DELAY_SECS, DEFAULT_RECEIPT_POLL_INTERVAL_SECS, DEFAULT_TRACKED_TOKENS,
    DEFAULT_WRAPPER_TOKEN, SETTINGS_KEY, SYNC_DISABLED_BLOCK,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// First block to ingest events from; 0 disables event sync
    pub start_block: u64,
    pub tracked_tokens: Vec<String>,
    pub deposit_token: String,
    pub wrapper_token: String,
    pub backfill_interval_secs: u64,
    pub receipt_poll_interval_secs: u64,
    pub progress_reset_delay_secs: u64,
    pub api_listen_addr: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            start_block: SYNC_DISABLED_BLOCK,
            tracked_tokens: DEFAULT_TRACKED_TOKENS
                .iter()
                .map(|s: &&str| s.to_string())
                .collect(),
            deposit_token: DEFAULT_DEPOSIT_TOKEN.to_string(),
            wrapper_token: DEFAULT_WRAPPER_TOKEN.to_string(),
            backfill_interval_secs: DEFAULT_BACKFILL_INTERVAL_SECS,
            receipt_poll_interval_secs: DEFAULT_RECEIPT_POLL_INTERVAL_SECS,
            progress_reset_delay_secs: DEFAULT_PROGRESS_RESET_DELAY_SECS,
            api_listen_addr: DEFAULT_API_LISTEN_ADDR.to_string(),
        }
    }
}

impl AppSettings {
    /// Reads the persisted settings, falling back to defaults when missing or unreadable.
    pub fn load(storage: &Storage) -> Self {
        match storage.get_setting(SETTINGS_KEY) {
            Ok(Some(json)) => serde_json::from_str::<AppSettings>(&json).unwrap_or_else(|e| {
                log::warn!("Stored settings unreadable, using defaults: {}", e);
                AppSettings::default()
            }),
            Ok(None) => AppSettings::default(),
            Err(e) => {
                log::error!("Failed to read settings: {}", e);
                AppSettings::default()
            }
        }
    }

    pub fn save(&self, storage: &Storage) -> Result<(), anyhow::Error> {
        let json = serde_json::to_string(self)?;
        storage.save_setting(SETTINGS_KEY, &json)
    }

    /// Tracked token ids with duplicates removed, first occurrence wins.
    pub fn tracked_tokens(&self) -> Vec<String> {
        let mut unique: Vec<String> = Vec::with_capacity(self.tracked_tokens.len());
        for token in &self.tracked_tokens {
            if !unique.contains(token) {
                unique.push(token.clone());
            }
        }
        unique
    }

    pub fn progress_reset_delay(&self) -> Duration {
        Duration::from_secs(self.progress_reset_delay_secs)
    }
}

// Shared state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub tracker: TransactionTracker,
    pub progress: ProgressHandle,
    pub deposits: DepositHandle,
}
