//! Device Clock Synchronization
//!
//! Projects the encoder board's wrapping 32-bit microsecond counter onto the
//! host wall clock. The first frame anchors the projection; afterwards every
//! frame's corrected time is `epoch_offset + (cumulative - first)`, and drift
//! is how far the host arrival time has wandered from that projection.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Span of the device counter.
const DEVICE_CLOCK_SPAN: u64 = 1 << 32;

/// Source of wall-clock time in microseconds since the Unix epoch.
pub trait WallClock: Send + Sync + 'static {
    fn now_micros(&self) -> i64;
}

impl<T: WallClock + ?Sized> WallClock for Arc<T> {
    fn now_micros(&self) -> i64 {
        (**self).now_micros()
    }
}

/// Host system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_micros(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

/// Hand-driven clock for deterministic replay and tests.
///
/// Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(start_micros: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start_micros)))
    }

    pub fn set(&self, micros: i64) {
        self.0.store(micros, Ordering::SeqCst);
    }

    pub fn advance(&self, micros: i64) {
        self.0.fetch_add(micros, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Corrected time of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedTime {
    /// Corrected epoch time (µs)
    pub total_micros: u64,
    /// Wall-clock arrival minus corrected time (µs)
    pub drift: i64,
    /// Device clock wrapped on this frame and the wrap still counts
    /// (a resync on the same frame clears it)
    pub wrapped: bool,
}

/// Wraparound and epoch bookkeeping for one device session.
#[derive(Debug, Clone)]
pub struct TimeSync {
    resync_gap_micros: i64,
    last_device_timestamp: Option<u32>,
    overflow_count: u64,
    epoch_offset: i64,
    first_device_time: u64,
    last_arrival: Option<i64>,
}

impl TimeSync {
    pub fn new(resync_gap_secs: u64) -> Self {
        let resync_gap_micros = i64::try_from(resync_gap_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1_000_000);
        Self {
            resync_gap_micros,
            last_device_timestamp: None,
            overflow_count: 0,
            epoch_offset: 0,
            first_device_time: 0,
            last_arrival: None,
        }
    }

    /// Number of device-clock wraps since the last (re)synchronization.
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Wall-clock anchor of the current projection (µs).
    pub fn epoch_offset(&self) -> i64 {
        self.epoch_offset
    }

    /// Cumulative device time the anchor corresponds to (µs).
    pub fn first_device_time(&self) -> u64 {
        self.first_device_time
    }

    /// Project one device timestamp that arrived at `arrival` (µs since epoch).
    pub fn observe(&mut self, device_timestamp: u32, arrival: i64) -> SyncedTime {
        let mut wrapped = false;
        if let Some(last) = self.last_device_timestamp {
            if device_timestamp < last {
                wrapped = true;
                self.overflow_count += 1;
                info!(
                    last,
                    current = device_timestamp,
                    overflow_count = self.overflow_count,
                    "Device clock wrapped"
                );
            }
        }
        self.last_device_timestamp = Some(device_timestamp);

        let mut cumulative = self.cumulative(device_timestamp);

        match self.last_arrival {
            None => self.anchor(arrival, cumulative),
            Some(previous) => {
                let gap = arrival.saturating_sub(previous);
                if gap > self.resync_gap_micros {
                    info!(
                        gap_ms = gap / 1_000,
                        dropped_overflows = self.overflow_count,
                        "Frame gap exceeded resync threshold, resynchronizing device clock"
                    );
                    self.overflow_count = 0;
                    wrapped = false;
                    cumulative = self.cumulative(device_timestamp);
                    self.anchor(arrival, cumulative);
                }
            }
        }
        self.last_arrival = Some(arrival);

        let elapsed = i64::try_from(cumulative.saturating_sub(self.first_device_time))
            .unwrap_or(i64::MAX);
        let corrected = self.epoch_offset.saturating_add(elapsed);

        SyncedTime {
            total_micros: u64::try_from(corrected).unwrap_or(0),
            drift: arrival.saturating_sub(corrected),
            wrapped,
        }
    }

    /// Cumulative device time (µs, wraps included) of a corrected time
    /// produced under the current anchor.
    pub fn device_time(&self, total_micros: u64) -> u64 {
        let corrected = i64::try_from(total_micros).unwrap_or(i64::MAX);
        let elapsed = u64::try_from(corrected.saturating_sub(self.epoch_offset)).unwrap_or(0);
        self.first_device_time + elapsed
    }

    fn cumulative(&self, device_timestamp: u32) -> u64 {
        u64::from(device_timestamp) + self.overflow_count * DEVICE_CLOCK_SPAN
    }

    fn anchor(&mut self, arrival: i64, cumulative: u64) {
        self.epoch_offset = arrival;
        self.first_device_time = cumulative;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000_000;

    #[test]
    fn test_first_frame_anchors_projection() {
        let mut sync = TimeSync::new(60);
        let t = sync.observe(5_000, T0);
        assert_eq!(t.total_micros, T0 as u64);
        assert_eq!(t.drift, 0);
        assert_eq!(sync.epoch_offset(), T0);
        assert_eq!(sync.first_device_time(), 5_000);

        // Host receives the next edge 30 µs later than the device says
        let t = sync.observe(6_000, T0 + 1_030);
        assert_eq!(t.total_micros, (T0 + 1_000) as u64);
        assert_eq!(t.drift, 30);
    }

    #[test]
    fn test_wraparound_counts_once_and_stays_monotonic() {
        let mut sync = TimeSync::new(60);
        let stamps = [0xFFFF_FF00u32, 0xFFFF_FFF0, 0x0000_0005, 0x0000_0100, 0x0001_0000];
        let mut arrival = T0;
        let mut previous = 0u64;
        for (i, &ts) in stamps.iter().enumerate() {
            arrival += 100;
            let t = sync.observe(ts, arrival);
            if i > 0 {
                assert!(t.total_micros > previous, "not increasing at {i}");
            }
            previous = t.total_micros;
        }
        assert_eq!(sync.overflow_count(), 1);

        // 0xFFFF_FFF0 -> 0x1_0000_0005 is 21 µs of device time
        let mut sync = TimeSync::new(60);
        let a = sync.observe(0xFFFF_FFF0, T0);
        let b = sync.observe(0x0000_0005, T0 + 21);
        assert!(!a.wrapped);
        assert!(b.wrapped);
        assert_eq!(b.total_micros - a.total_micros, 21);
        assert_eq!(b.drift, 0);
        assert_eq!(sync.device_time(b.total_micros), (1u64 << 32) + 5);
        assert_eq!(sync.device_time(b.total_micros) as u32, 5);
    }

    #[test]
    fn test_long_gap_resynchronizes_from_later_frame() {
        let mut sync = TimeSync::new(60);
        sync.observe(0xFFFF_0000, T0);
        sync.observe(0x0000_1000, T0 + 70_000);
        assert_eq!(sync.overflow_count(), 1);

        let later = T0 + 70_000 + 61_000_000;
        let t = sync.observe(0x0000_2000, later);
        assert!(!t.wrapped);

        assert_eq!(sync.overflow_count(), 0);
        assert_eq!(sync.epoch_offset(), later);
        assert_eq!(sync.first_device_time(), 0x2000);
        assert_eq!(t.total_micros, later as u64);
        assert_eq!(t.drift, 0);
    }

    #[test]
    fn test_wrap_during_resync_is_not_reported() {
        let mut sync = TimeSync::new(60);
        sync.observe(0x0001_0000, T0);
        let t = sync.observe(0x0000_0010, T0 + 61_000_000);
        assert!(!t.wrapped);
        assert_eq!(sync.overflow_count(), 0);
    }

    #[test]
    fn test_gap_at_threshold_does_not_resync() {
        let mut sync = TimeSync::new(60);
        sync.observe(1_000, T0);
        sync.observe(2_000, T0 + 60_000_000);
        assert_eq!(sync.epoch_offset(), T0);
        assert_eq!(sync.first_device_time(), 1_000);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now_micros(), 15);
        other.set(100);
        assert_eq!(clock.now_micros(), 100);
    }
}
