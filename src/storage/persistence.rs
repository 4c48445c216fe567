//! CycleStore trait - pluggable cycle record storage
//!
//! - `SledCycleStore`: durable store used by the receiver
//! - `InMemoryCycleStore`: for tests and `--simulate` runs without a disk

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::types::CycleRecord;

/// Append-only store of cycle records, queried by corrected time.
///
/// Implementations must be thread-safe: the coordinator appends while API
/// handlers query.
pub trait CycleStore: Send + Sync {
    /// Persist one record.
    fn append(&self, record: &CycleRecord) -> Result<(), StorageError>;

    /// Records with `start <= total_micros <= end`, ascending by `total_micros`.
    fn query(&self, start_micros: u64, end_micros: u64) -> Result<Vec<CycleRecord>, StorageError>;

    /// Number of stored records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// In-memory cycle store. Not durable.
#[derive(Default)]
pub struct InMemoryCycleStore {
    /// Keyed by (total_micros, insertion sequence) so equal times keep both
    records: RwLock<BTreeMap<(u64, u64), CycleRecord>>,
}

impl InMemoryCycleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CycleStore for InMemoryCycleStore {
    fn append(&self, record: &CycleRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| StorageError::Poisoned)?;
        let seq = records.len() as u64;
        records.insert((record.total_micros, seq), *record);
        Ok(())
    }

    fn query(&self, start_micros: u64, end_micros: u64) -> Result<Vec<CycleRecord>, StorageError> {
        if start_micros > end_micros {
            return Ok(Vec::new());
        }
        let records = self.records.read().map_err(|_| StorageError::Poisoned)?;
        Ok(records
            .range((start_micros, 0)..=(end_micros, u64::MAX))
            .map(|(_, r)| *r)
            .collect())
    }

    fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
