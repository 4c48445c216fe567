//! Cycle record storage
//!
//! One [`CycleRecord`](crate::types::CycleRecord) is appended per completed
//! cycle; the API queries them back by corrected time.

pub mod history;
pub mod persistence;

pub use history::SledCycleStore;
pub use persistence::{CycleStore, InMemoryCycleStore, StorageError};
