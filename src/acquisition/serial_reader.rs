//! Serial reader loop
//!
//! Runs on a blocking thread, one per connection attempt. Every decoded
//! reading and status event goes into one ordered channel, so consumers see
//! link health inline with the data in frame order.

use std::io::Read;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::decoder::{DecodeStep, FrameDecoder};
use super::time_sync::WallClock;
use crate::types::{PipelineEvent, Reading, StatusMessage};

/// What a serial reader hands to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum SerialEvent {
    Reading(Reading),
    Status(StatusMessage),
}

impl From<SerialEvent> for PipelineEvent {
    fn from(event: SerialEvent) -> Self {
        match event {
            SerialEvent::Reading(r) => PipelineEvent::Reading(r),
            SerialEvent::Status(s) => PipelineEvent::Status(s),
        }
    }
}

/// Why a reader loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Its cancellation token fired (reconnect or shutdown)
    Cancelled,
    /// The circuit breaker tripped; terminal statuses were already sent
    CircuitOpen,
    /// The coordinator dropped its receiver
    ChannelClosed,
}

/// Decode frames until cancelled, the breaker trips, or the receiver closes.
///
/// Blocking: call from `spawn_blocking`. Cancellation is observed between
/// reads, so the decoder's source must time out periodically.
pub fn run_reader<R: Read, C: WallClock>(
    mut decoder: FrameDecoder<R, C>,
    tx: &mpsc::Sender<SerialEvent>,
    cancel: &CancellationToken,
    generation: u64,
) -> ReaderExit {
    info!(generation, "Serial reader started");

    let exit = loop {
        if cancel.is_cancelled() {
            break ReaderExit::Cancelled;
        }

        let event = match decoder.step() {
            Ok(DecodeStep::Reading(r)) => SerialEvent::Reading(r),
            Ok(DecodeStep::Status(s)) => SerialEvent::Status(s),
            Ok(DecodeStep::Dropped(_) | DecodeStep::Idle) => continue,
            Err(e) => {
                error!(generation, error = %e, "Serial reader giving up");
                let terminal = [
                    SerialEvent::Status(StatusMessage::error(e.to_string())),
                    SerialEvent::Status(StatusMessage::disconnected()),
                ];
                for event in terminal {
                    if tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                break ReaderExit::CircuitOpen;
            }
        };

        if tx.blocking_send(event).is_err() {
            break ReaderExit::ChannelClosed;
        }
    };

    let (decoded, dropped) = decoder.frame_counts();
    debug!(generation, decoded, dropped, position = decoder.position(), "Serial reader totals");
    info!(generation, ?exit, "Serial reader stopped");
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::frame::Frame;
    use crate::acquisition::time_sync::ManualClock;
    use crate::types::{Direction, LinkStatus};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_reader_emits_readings_then_terminal_statuses() {
        let mut bytes = Vec::new();
        bytes.extend(Frame { device_timestamp: 10, direction: Direction::Positive }.encode());
        bytes.extend(Frame { device_timestamp: 20, direction: Direction::Positive }.encode());
        let decoder = FrameDecoder::new(Cursor::new(bytes), ManualClock::new(0), 60, 3);

        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let reader = tokio::task::spawn_blocking(move || run_reader(decoder, &tx, &cancel, 1));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(reader.await.unwrap(), ReaderExit::CircuitOpen);

        let counts: Vec<i64> = events
            .iter()
            .filter_map(|e| match e {
                SerialEvent::Reading(r) => Some(r.count),
                SerialEvent::Status(_) => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2]);

        // Two counted short reads, then the trip
        let statuses: Vec<LinkStatus> = events
            .iter()
            .filter_map(|e| match e {
                SerialEvent::Status(s) => Some(s.status),
                SerialEvent::Reading(_) => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![LinkStatus::Error, LinkStatus::Error, LinkStatus::Error, LinkStatus::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_cancelled_reader_stops_before_reading() {
        let decoder = FrameDecoder::new(Cursor::new(Vec::new()), ManualClock::new(0), 60, 10);
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exit = tokio::task::spawn_blocking(move || run_reader(decoder, &tx, &cancel, 7))
            .await
            .unwrap();
        assert_eq!(exit, ReaderExit::Cancelled);
        assert!(rx.recv().await.is_none());
    }
}
