//! Bounded, newest-first capture store over the key-value port

use crate::kv::{KeyValuePort, KvError};
use crate::record::CaptureRecord;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] KvError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Store tuning. The cap and grace window are deliberately configuration,
/// not constants.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Key-value entry holding the serialized record array.
    pub storage_key: String,
    /// Maximum number of retained records.
    pub max_records: usize,
    /// How long appends are refused after a clear starts.
    pub clear_grace: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: "captures.v1".to_string(),
            max_records: 100,
            clear_grace: Duration::from_secs(2),
        }
    }
}

/// Result of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    /// A clear is in progress; the record was not accepted.
    SuppressedByClear,
}

/// Ordered capture collection, newest first, capped at
/// [`StoreConfig::max_records`].
///
/// Writes are read-merge-write over the key-value port and are not atomic
/// across the two I/O calls; overlapping writers settle last-write-wins.
/// Every operation keeps an in-memory mirror of the last known state so a
/// broken backend degrades the session instead of ending it: mutations still
/// land in the mirror and the backend error is surfaced as recoverable.
pub struct CaptureStore {
    kv: Arc<dyn KeyValuePort>,
    config: StoreConfig,
    mirror: Mutex<Vec<CaptureRecord>>,
    clearing_until: Mutex<Option<Instant>>,
}

impl CaptureStore {
    pub fn new(kv: Arc<dyn KeyValuePort>, config: StoreConfig) -> Self {
        Self {
            kv,
            config,
            mirror: Mutex::new(Vec::new()),
            clearing_until: Mutex::new(None),
        }
    }

    pub fn with_defaults(kv: Arc<dyn KeyValuePort>) -> Self {
        Self::new(kv, StoreConfig::default())
    }

    /// All records, newest first. Falls back to the mirror when the backend
    /// cannot be read.
    pub async fn list(&self) -> Vec<CaptureRecord> {
        match self.load_merged().await {
            Ok(records) => records,
            Err(e) => {
                warn!("store read failed, serving in-memory mirror: {}", e);
                self.mirror.lock().unwrap().clone()
            }
        }
    }

    /// Prepend a record, trimming to the cap. Refused while a clear grace
    /// window is active so a pending append cannot resurrect cleared state.
    pub async fn append(&self, record: CaptureRecord) -> Result<AppendOutcome, StoreError> {
        if self.clearing_active() {
            info!("append suppressed: clear in progress (id {})", record.id);
            return Ok(AppendOutcome::SuppressedByClear);
        }

        let mut records = match self.load_merged().await {
            Ok(records) => records,
            Err(e) => {
                warn!("store read failed before append, using mirror: {}", e);
                self.mirror.lock().unwrap().clone()
            }
        };

        // Re-append of the same id replaces rather than duplicates.
        records.retain(|r| r.id != record.id);
        records.insert(0, record);
        records.truncate(self.config.max_records);

        self.commit(records).await?;
        Ok(AppendOutcome::Stored)
    }

    /// Replace the record with the same id (panel edit merge). Returns
    /// whether a record was found.
    pub async fn update(&self, record: CaptureRecord) -> Result<bool, StoreError> {
        let mut records = self.list().await;
        let Some(slot) = records.iter_mut().find(|r| r.id == record.id) else {
            debug!("update: no record with id {}", record.id);
            return Ok(false);
        };
        *slot = record;
        self.commit(records).await?;
        Ok(true)
    }

    /// Remove one record by id. Returns whether a record was found.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.list().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.commit(records).await?;
        Ok(true)
    }

    /// Bulk clear, defense in depth: the grace flag blocks concurrent
    /// appends, then the entry is removed, rewritten empty, re-verified, and
    /// as a last resort the whole namespace is wiped. A concurrent reader
    /// observes either absence or an empty array, never stale records.
    pub async fn clear(&self) -> Result<(), StoreError> {
        *self.clearing_until.lock().unwrap() = Some(Instant::now() + self.config.clear_grace);
        self.mirror.lock().unwrap().clear();

        self.kv.remove(&self.config.storage_key).await?;
        self.kv.set(&self.config.storage_key, "[]").await?;

        // Re-validate emptiness after the write completes.
        let verified_empty = match self.kv.get(&self.config.storage_key).await? {
            None => true,
            Some(raw) => serde_json::from_str::<Vec<CaptureRecord>>(&raw)
                .map(|records| records.is_empty())
                .unwrap_or(false),
        };

        if !verified_empty {
            warn!("clear verification failed, wiping storage namespace");
            self.kv.clear().await?;
            self.kv.set(&self.config.storage_key, "[]").await?;
        }

        info!("capture store cleared");
        Ok(())
    }

    pub fn clearing_active(&self) -> bool {
        self.clearing_until
            .lock()
            .unwrap()
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    /// Read the backend and fold in any mirror-only records (survivors of a
    /// backend outage), newest first, trimmed to the cap.
    async fn load_merged(&self) -> Result<Vec<CaptureRecord>, StoreError> {
        let mut records = match self.kv.get(&self.config.storage_key).await? {
            Some(raw) => serde_json::from_str::<Vec<CaptureRecord>>(&raw)?,
            None => Vec::new(),
        };

        {
            let mirror = self.mirror.lock().unwrap();
            for record in mirror.iter() {
                if !records.iter().any(|r| r.id == record.id) {
                    records.push(record.clone());
                }
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        records.truncate(self.config.max_records);
        Ok(records)
    }

    /// Write the new state to the backend, mirroring it first so a failed
    /// write degrades to the mirror instead of losing the session.
    async fn commit(&self, records: Vec<CaptureRecord>) -> Result<(), StoreError> {
        *self.mirror.lock().unwrap() = records.clone();

        let raw = serde_json::to_string(&records)?;
        if let Err(e) = self.kv.set(&self.config.storage_key, &raw).await {
            warn!("store write failed, state held in mirror only: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
