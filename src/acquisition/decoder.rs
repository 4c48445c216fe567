//! Frame Decoder
//!
//! Assembles 5-byte frames from a blocking byte source, validates them, runs
//! time synchronization and tracks the cumulative encoder position. One call
//! to [`FrameDecoder::step`] performs at most one frame attempt.
//!
//! Error accounting:
//! - I/O failures and short reads count toward the circuit breaker
//! - any complete 5-byte read resets the counter, even if the frame is then rejected
//! - checksum mismatches and overflow sentinels never touch the counter
//! - read timeouts are idle time, not failures
//!
//! A frame that wraps the device clock yields an overflow status first and
//! its reading on the following call.

use std::io::{ErrorKind, Read};
use thiserror::Error;
use tracing::{error, warn};

use super::frame::{Frame, FrameError, FRAME_LEN};
use super::time_sync::{TimeSync, WallClock};
use crate::types::{Reading, StatusMessage};

/// Acquisition failures surfaced to callers.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("circuit open after {consecutive} consecutive I/O errors")]
    CircuitOpen { consecutive: u32 },

    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
}

/// Outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStep {
    /// A valid edge
    Reading(Reading),
    /// Link status to publish (overflow sentinel, device clock wrap or a
    /// counted I/O error)
    Status(StatusMessage),
    /// Complete frame rejected by the integrity check
    Dropped(FrameError),
    /// Read timed out before a frame completed; partial bytes are kept
    Idle,
}

/// Decoder state for one connection.
pub struct FrameDecoder<R, C> {
    source: R,
    clock: C,
    sync: TimeSync,
    position: i64,
    consecutive_errors: u32,
    max_consecutive_errors: u32,
    pending: [u8; FRAME_LEN],
    filled: usize,
    tripped: bool,
    /// Reading held back behind its wrap status
    queued: Option<Reading>,
    frames_decoded: u64,
    frames_dropped: u64,
}

impl<R: Read, C: WallClock> FrameDecoder<R, C> {
    pub fn new(source: R, clock: C, resync_gap_secs: u64, max_consecutive_errors: u32) -> Self {
        Self {
            source,
            clock,
            sync: TimeSync::new(resync_gap_secs),
            position: 0,
            consecutive_errors: 0,
            max_consecutive_errors: max_consecutive_errors.max(1),
            pending: [0; FRAME_LEN],
            filled: 0,
            tripped: false,
            queued: None,
            frames_decoded: 0,
            frames_dropped: 0,
        }
    }

    /// Cumulative encoder position.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn time_sync(&self) -> &TimeSync {
        &self.sync
    }

    /// (decoded, dropped) frame totals.
    pub fn frame_counts(&self) -> (u64, u64) {
        (self.frames_decoded, self.frames_dropped)
    }

    /// Attempt to read and decode one frame.
    ///
    /// Returns `Err(CircuitOpen)` once the consecutive error count reaches
    /// the configured limit, and on every call after that.
    pub fn step(&mut self) -> Result<DecodeStep, AcquisitionError> {
        if self.tripped {
            return Err(AcquisitionError::CircuitOpen { consecutive: self.consecutive_errors });
        }
        if let Some(reading) = self.queued.take() {
            return Ok(DecodeStep::Reading(reading));
        }

        while self.filled < FRAME_LEN {
            match self.source.read(&mut self.pending[self.filled..]) {
                Ok(0) => {
                    let err = std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("short read: {} of {FRAME_LEN} bytes", self.filled),
                    );
                    return self.io_failure(&err);
                }
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(DecodeStep::Idle);
                }
                Err(e) => return self.io_failure(&e),
            }
        }

        let raw = self.pending;
        self.filled = 0;
        self.consecutive_errors = 0;

        match Frame::decode(&raw) {
            Ok(frame) => {
                let arrival = self.clock.now_micros();
                let synced = self.sync.observe(frame.device_timestamp, arrival);
                self.position += frame.direction.step();
                self.frames_decoded += 1;
                let reading = Reading {
                    total_micros: synced.total_micros,
                    count: self.position,
                    timestamp_drift: synced.drift,
                };
                if synced.wrapped {
                    self.queued = Some(reading);
                    let count = self.sync.overflow_count();
                    return Ok(DecodeStep::Status(StatusMessage::clock_wrapped(count)));
                }
                Ok(DecodeStep::Reading(reading))
            }
            Err(FrameError::Sentinel) => {
                warn!("Encoder reported buffer overflow");
                Ok(DecodeStep::Status(StatusMessage::overflow()))
            }
            Err(e @ FrameError::Integrity { computed, received }) => {
                self.frames_dropped += 1;
                warn!(
                    bytes = ?raw,
                    computed = format_args!("{computed:#04x}"),
                    received = format_args!("{received:#04x}"),
                    "Dropping frame with bad checksum"
                );
                Ok(DecodeStep::Dropped(e))
            }
        }
    }

    fn io_failure(&mut self, err: &std::io::Error) -> Result<DecodeStep, AcquisitionError> {
        self.filled = 0;
        self.consecutive_errors += 1;

        if self.consecutive_errors >= self.max_consecutive_errors {
            self.tripped = true;
            error!(
                consecutive = self.consecutive_errors,
                error = %err,
                "Serial circuit breaker tripped"
            );
            return Err(AcquisitionError::CircuitOpen { consecutive: self.consecutive_errors });
        }

        warn!(
            consecutive = self.consecutive_errors,
            max = self.max_consecutive_errors,
            error = %err,
            "Serial read failed"
        );
        Ok(DecodeStep::Status(StatusMessage::error(err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::frame::OVERFLOW_SENTINEL;
    use crate::acquisition::time_sync::ManualClock;
    use crate::types::{Direction, LinkStatus};
    use std::collections::VecDeque;
    use std::io::Cursor;

    fn frame(ts: u32, direction: Direction) -> [u8; FRAME_LEN] {
        Frame { device_timestamp: ts, direction }.encode()
    }

    fn decoder_over(bytes: Vec<u8>) -> FrameDecoder<Cursor<Vec<u8>>, ManualClock> {
        FrameDecoder::new(Cursor::new(bytes), ManualClock::new(1_000_000), 60, 10)
    }

    /// Source replaying scripted read results.
    struct Scripted(VecDeque<std::io::Result<Vec<u8>>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_position_tracks_direction() {
        let mut bytes = Vec::new();
        bytes.extend(frame(100, Direction::Positive));
        bytes.extend(frame(200, Direction::Positive));
        bytes.extend(frame(300, Direction::Negative));
        let mut decoder = decoder_over(bytes);

        let counts: Vec<i64> = (0..3)
            .map(|_| match decoder.step().unwrap() {
                DecodeStep::Reading(r) => r.count,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 1]);
    }

    #[test]
    fn test_sentinel_and_bad_checksum_produce_no_reading() {
        let mut bad = frame(500, Direction::Positive);
        bad[0] ^= 0x01;
        let mut bytes = OVERFLOW_SENTINEL.to_vec();
        bytes.extend(bad);
        bytes.extend(frame(600, Direction::Positive));
        let mut decoder = decoder_over(bytes);

        match decoder.step().unwrap() {
            DecodeStep::Status(s) => assert_eq!(s.status, LinkStatus::Overflow),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(decoder.step().unwrap(), DecodeStep::Dropped(FrameError::Integrity { .. })));
        match decoder.step().unwrap() {
            DecodeStep::Reading(r) => assert_eq!(r.count, 1),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(decoder.frame_counts(), (1, 1));
    }

    #[test]
    fn test_clock_wrap_reports_overflow_before_its_reading() {
        let mut bytes = Vec::new();
        bytes.extend(frame(0xFFFF_FFF0, Direction::Positive));
        bytes.extend(frame(0x0000_0005, Direction::Positive));
        bytes.extend(frame(0x0000_0100, Direction::Negative));
        let mut decoder = decoder_over(bytes);

        let steps: Vec<DecodeStep> = (0..4).map(|_| decoder.step().unwrap()).collect();
        assert!(matches!(steps[0], DecodeStep::Reading(Reading { count: 1, .. })));
        match &steps[1] {
            DecodeStep::Status(s) => {
                assert_eq!(s.status, LinkStatus::Overflow);
                assert_eq!(s.error.as_deref(), Some("Overflow count: 1"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(steps[2], DecodeStep::Reading(Reading { count: 2, .. })));
        assert!(matches!(steps[3], DecodeStep::Reading(Reading { count: 1, .. })));
        assert_eq!(decoder.time_sync().overflow_count(), 1);
        assert_eq!(decoder.frame_counts(), (3, 0));
    }

    #[test]
    fn test_breaker_trips_after_consecutive_short_reads() {
        let mut decoder = decoder_over(Vec::new());
        for i in 1..10 {
            match decoder.step().unwrap() {
                DecodeStep::Status(s) => assert_eq!(s.status, LinkStatus::Error),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(decoder.consecutive_errors(), i);
        }
        assert!(matches!(
            decoder.step(),
            Err(AcquisitionError::CircuitOpen { consecutive: 10 })
        ));
        assert!(matches!(decoder.step(), Err(AcquisitionError::CircuitOpen { .. })));
    }

    #[test]
    fn test_complete_read_resets_error_count() {
        let broken = || Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"));
        let mut bad = frame(1, Direction::Positive);
        bad[1] ^= 0x04;
        let mut script = VecDeque::new();
        for _ in 0..9 {
            script.push_back(broken());
        }
        // A rejected frame still proves the link is alive
        script.push_back(Ok(bad.to_vec()));
        for _ in 0..9 {
            script.push_back(broken());
        }
        let mut decoder = FrameDecoder::new(Scripted(script), ManualClock::new(0), 60, 10);

        for _ in 0..9 {
            decoder.step().unwrap();
        }
        assert_eq!(decoder.consecutive_errors(), 9);
        assert!(matches!(decoder.step().unwrap(), DecodeStep::Dropped(_)));
        assert_eq!(decoder.consecutive_errors(), 0);
        for _ in 0..9 {
            decoder.step().unwrap();
        }
        assert_eq!(decoder.consecutive_errors(), 9);
    }

    #[test]
    fn test_timeout_keeps_partial_frame() {
        let bytes = frame(42, Direction::Negative);
        let script = VecDeque::from(vec![
            Ok(bytes[..2].to_vec()),
            Err(std::io::Error::new(ErrorKind::TimedOut, "timeout")),
            Ok(bytes[2..].to_vec()),
        ]);
        let mut decoder = FrameDecoder::new(Scripted(script), ManualClock::new(0), 60, 10);

        assert_eq!(decoder.step().unwrap(), DecodeStep::Idle);
        assert_eq!(decoder.consecutive_errors(), 0);
        match decoder.step().unwrap() {
            DecodeStep::Reading(r) => assert_eq!(r.count, -1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
