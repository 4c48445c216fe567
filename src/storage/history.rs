//! Cycle Record History Storage
//!
//! Persists CycleRecords to Sled DB for historical queries. Keys are the
//! record's corrected time as big-endian bytes followed by a sled-generated
//! id, so iteration order is chronological and equal times never collide.

use std::path::Path;
use std::sync::Arc;

use super::persistence::{CycleStore, StorageError};
use crate::types::CycleRecord;

/// Sled-backed cycle store
#[derive(Clone)]
pub struct SledCycleStore {
    db: Arc<sled::Db>,
}

impl SledCycleStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn key(total_micros: u64, id: u64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&total_micros.to_be_bytes());
        key[8..].copy_from_slice(&id.to_be_bytes());
        key
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Database size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

impl CycleStore for SledCycleStore {
    /// Sled flushes in the background; a crash may lose the last few records.
    fn append(&self, record: &CycleRecord) -> Result<(), StorageError> {
        let id = self.db.generate_id()?;
        let value = serde_json::to_vec(record)?;
        self.db.insert(Self::key(record.total_micros, id), value)?;
        Ok(())
    }

    fn query(&self, start_micros: u64, end_micros: u64) -> Result<Vec<CycleRecord>, StorageError> {
        if start_micros > end_micros {
            return Ok(Vec::new());
        }
        let start_key = Self::key(start_micros, 0);
        let end_key = Self::key(end_micros, u64::MAX);

        let mut records = Vec::new();
        for item in self.db.range(start_key..=end_key) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice::<CycleRecord>(&value)?);
        }
        Ok(records)
    }

    fn len(&self) -> usize {
        self.db.len()
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
