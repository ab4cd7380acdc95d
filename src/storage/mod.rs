use crate::chain::{PendingTransaction, TokenEventRecord};
use redb::{Database, ReadableTable, TableDefinition};
use std::sync::Arc;

const TOKEN_EVENTS_TABLE: TableDefinition<u64, &str> = TableDefinition::new("token_events");
// (block_number, seq) -> ()
const BLOCK_INDEX_TABLE: TableDefinition<(u64, u64), ()> = TableDefinition::new("token_events_by_block");
const PENDING_TABLE: TableDefinition<&str, &str> = TableDefinition::new("pending_transactions");
const SETTINGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Selects ledger records. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub token: Option<String>,
    pub block_number: Option<u64>,
    /// Only records whose timestamp is still unknown
    pub unresolved_only: bool,
    pub limit: Option<usize>,
}

impl LedgerFilter {
    pub fn unresolved() -> Self {
        LedgerFilter {
            unresolved_only: true,
            ..Default::default()
        }
    }

    fn matches(&self, record: &TokenEventRecord) -> bool {
        if self.unresolved_only && record.timestamp.is_some() {
            return false;
        }
        if let Some(token) = &self.token {
            if &record.token != token {
                return false;
            }
        }
        if let Some(block) = self.block_number {
            if record.block_number != block {
                return false;
            }
        }
        true
    }
}

pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    pub fn new(path: &str) -> Result<Self, anyhow::Error> {
        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TOKEN_EVENTS_TABLE)?;
            let _ = write_txn.open_table(BLOCK_INDEX_TABLE)?;
            let _ = write_txn.open_table(PENDING_TABLE)?;
            let _ = write_txn.open_table(SETTINGS_TABLE)?;
        }
        write_txn.commit()?;

        let storage = Storage { db: Arc::new(db) };
        storage.ensure_block_index()?;
        Ok(storage)
    }

    /// Rebuilds the block index when it is out of step with the ledger.
    pub fn ensure_block_index(&self) -> Result<usize, anyhow::Error> {
        {
            let read_txn = self.db.begin_read()?;
            let events = read_txn.open_table(TOKEN_EVENTS_TABLE)?;
            let index = read_txn.open_table(BLOCK_INDEX_TABLE)?;
            if index.len()? == events.len()? {
                return Ok(0);
            }
        }

        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(BLOCK_INDEX_TABLE)?;
        let mut indexed = 0;
        {
            let events = write_txn.open_table(TOKEN_EVENTS_TABLE)?;
            let mut index = write_txn.open_table(BLOCK_INDEX_TABLE)?;
            for item in events.iter()? {
                let (key, value) = item?;
                let record: TokenEventRecord = serde_json::from_str(value.value())?;
                index.insert((record.block_number, key.value()), ())?;
                indexed += 1;
            }
        }
        write_txn.commit()?;
        log::info!("Rebuilt block index over {} ledger records", indexed);
        Ok(indexed)
    }

    /// Appends a record and returns its sequence number.
    pub fn insert_token_event(&self, record: &TokenEventRecord) -> Result<u64, anyhow::Error> {
        let json = serde_json::to_string(record)?;
        let write_txn = self.db.begin_write()?;
        let seq;
        {
            let mut table = write_txn.open_table(TOKEN_EVENTS_TABLE)?;
            let last = match table.iter()?.next_back() {
                Some(res) => Some(res?.0.value()),
                None => None,
            };
            seq = last.map(|k| k + 1).unwrap_or(0);
            table.insert(seq, json.as_str())?;
            let mut index = write_txn.open_table(BLOCK_INDEX_TABLE)?;
            index.insert((record.block_number, seq), ())?;
        }
        write_txn.commit()?;
        Ok(seq)
    }

    /// Records in insertion order.
    pub fn find_token_events(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<TokenEventRecord>, anyhow::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKEN_EVENTS_TABLE)?;
        let mut records = Vec::new();

        if let Some(block) = filter.block_number {
            let index = read_txn.open_table(BLOCK_INDEX_TABLE)?;
            for item in index.range((block, 0)..=(block, u64::MAX))? {
                let (key, _) = item?;
                let (_, seq) = key.value();
                let Some(value) = table.get(seq)? else {
                    continue;
                };
                let record: TokenEventRecord = serde_json::from_str(value.value())?;
                if filter.matches(&record) {
                    records.push(record);
                    if filter.limit.is_some_and(|limit| records.len() >= limit) {
                        break;
                    }
                }
            }
            return Ok(records);
        }

        for item in table.iter()? {
            let (_, value) = item?;
            let record: TokenEventRecord = serde_json::from_str(value.value())?;
            if filter.matches(&record) {
                records.push(record);
                if filter.limit.is_some_and(|limit| records.len() >= limit) {
                    break;
                }
            }
        }
        Ok(records)
    }

    /// Sets the timestamp of every record in `block_number`. Returns how many changed.
    pub fn set_block_timestamp(
        &self,
        block_number: u64,
        timestamp: u64,
    ) -> Result<usize, anyhow::Error> {
        let write_txn = self.db.begin_write()?;
        let mut count = 0;
        {
            let index = write_txn.open_table(BLOCK_INDEX_TABLE)?;
            let mut seqs = Vec::new();
            for item in index.range((block_number, 0)..=(block_number, u64::MAX))? {
                let (key, _) = item?;
                seqs.push(key.value().1);
            }

            let mut table = write_txn.open_table(TOKEN_EVENTS_TABLE)?;
            let mut updates = Vec::new();
            for seq in seqs {
                let Some(value) = table.get(seq)? else {
                    continue;
                };
                let mut record: TokenEventRecord = serde_json::from_str(value.value())?;
                if record.block_number == block_number && record.timestamp != Some(timestamp) {
                    record.timestamp = Some(timestamp);
                    updates.push((seq, serde_json::to_string(&record)?));
                }
            }
            for (key, json) in updates {
                table.insert(key, json.as_str())?;
                count += 1;
            }
        }
        write_txn.commit()?;
        Ok(count)
    }

    pub fn count_token_events(&self) -> Result<u64, anyhow::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKEN_EVENTS_TABLE)?;
        Ok(table.len()?)
    }

    pub fn save_pending_tx(&self, tx: &PendingTransaction) -> Result<(), anyhow::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PENDING_TABLE)?;
            let json = serde_json::to_string(tx)?;
            table.insert(tx.tx_hash.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn remove_pending_tx(&self, tx_hash: &str) -> Result<(), anyhow::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PENDING_TABLE)?;
            table.remove(tx_hash)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_all_pending_txs(&self) -> Result<Vec<PendingTransaction>, anyhow::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;
        let mut txs = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let tx: PendingTransaction = serde_json::from_str(value.value())?;
            txs.push(tx);
        }
        Ok(txs)
    }

    pub fn save_setting(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        let result = table.get(key)?.map(|guard| guard.value().to_string());
        Ok(result)
    }

    pub fn remove_setting(&self, key: &str) -> Result<(), anyhow::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

/// Throw-away database in the temp dir.
#[cfg(test)]
pub fn temp_storage() -> Arc<Storage> {
    let mut path = std::env::temp_dir();
    path.push(format!("token-broker-test-{}.redb", uuid::Uuid::new_v4()));
    Arc::new(Storage::new(path.to_str().unwrap()).unwrap())
}
