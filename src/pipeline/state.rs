//! Shared pipeline state
//!
//! The only values the control surface and the coordinator both touch. Each
//! is a single atomic, so neither side ever waits on the other.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Operator-adjustable settings read by the coordinator on every reading.
#[derive(Debug, Default)]
pub struct ControlState {
    /// Zero offset in encoder steps
    tare_steps: AtomicI64,
}

impl ControlState {
    pub fn new(tare_steps: i64) -> Self {
        Self { tare_steps: AtomicI64::new(tare_steps) }
    }

    pub fn tare(&self) -> i64 {
        self.tare_steps.load(Ordering::Relaxed)
    }

    pub fn set_tare(&self, steps: i64) {
        self.tare_steps.store(steps, Ordering::Relaxed);
    }
}

/// Running totals kept by the coordinator.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    readings: AtomicU64,
    status_events: AtomicU64,
    sensor_updates: AtomicU64,
    records_written: AtomicU64,
    persist_failures: AtomicU64,
}

impl PipelineCounters {
    pub(crate) fn reading(&self) -> u64 {
        self.readings.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn status_event(&self) {
        self.status_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sensor_update(&self) {
        self.sensor_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn persist_failed(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            readings: self.readings.load(Ordering::Relaxed),
            status_events: self.status_events.load(Ordering::Relaxed),
            sensor_updates: self.sensor_updates.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub readings: u64,
    pub status_events: u64,
    pub sensor_updates: u64,
    pub records_written: u64,
    pub persist_failures: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} readings, {} status events, {} sensor updates, {} records ({} failed writes)",
            self.readings,
            self.status_events,
            self.sensor_updates,
            self.records_written,
            self.persist_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tare_round_trip() {
        let control = ControlState::new(3);
        assert_eq!(control.tare(), 3);
        control.set_tare(-12);
        assert_eq!(control.tare(), -12);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = PipelineCounters::default();
        assert_eq!(counters.reading(), 1);
        assert_eq!(counters.reading(), 2);
        counters.record_written();
        counters.persist_failed();
        let stats = counters.snapshot();
        assert_eq!(stats.readings, 2);
        assert_eq!(stats.records_written, 1);
        assert_eq!(stats.persist_failures, 1);
        assert!(stats.to_string().contains("2 readings"));
    }
}
