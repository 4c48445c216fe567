//! Pipeline Coordinator
//!
//! The single control loop of the receiver. It multiplexes the serial event
//! stream and the sensor stream, and for each event, in arrival order:
//!
//! 1. updates the [`SignalProcessor`] (readings and sensor values)
//! 2. persists a cycle record if one completed (failures are logged, never fatal)
//! 3. republishes the original event, unmodified, to the [`Hub`]
//!
//! The processor lives inside this loop and is touched from nowhere else.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{ControlState, PipelineCounters, PipelineStats};
use crate::acquisition::SerialEvent;
use crate::broadcast::Hub;
use crate::processing::SignalProcessor;
use crate::storage::CycleStore;
use crate::types::{LinkStatus, PipelineEvent, Reading, SensorReading, StatusMessage};

/// Owns the signal processor and drives it from the event streams.
pub struct Coordinator {
    processor: SignalProcessor,
    store: Arc<dyn CycleStore>,
    hub: Arc<Hub>,
    control: Arc<ControlState>,
    counters: Arc<PipelineCounters>,
    serial_rx: mpsc::Receiver<SerialEvent>,
    sensor_rx: mpsc::Receiver<SensorReading>,
    stats_interval: u64,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        processor: SignalProcessor,
        store: Arc<dyn CycleStore>,
        hub: Arc<Hub>,
        control: Arc<ControlState>,
        counters: Arc<PipelineCounters>,
        serial_rx: mpsc::Receiver<SerialEvent>,
        sensor_rx: mpsc::Receiver<SensorReading>,
        stats_interval: u64,
    ) -> Self {
        Self {
            processor,
            store,
            hub,
            control,
            counters,
            serial_rx,
            sensor_rx,
            stats_interval: stats_interval.max(1),
        }
    }

    /// Run until cancelled or the serial stream closes. Returns final statistics.
    pub async fn run(mut self, cancel: CancellationToken) -> PipelineStats {
        info!(store = self.store.backend_name(), "🔄 Coordinator started");
        let mut sensors_open = true;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("[Coordinator] Shutdown signal received");
                    break;
                }
                event = self.serial_rx.recv() => match event {
                    Some(SerialEvent::Reading(reading)) => self.handle_reading(reading),
                    Some(SerialEvent::Status(status)) => self.handle_status(status),
                    None => {
                        info!("[Coordinator] Serial stream closed");
                        break;
                    }
                },
                update = self.sensor_rx.recv(), if sensors_open => match update {
                    Some(reading) => self.handle_sensor(reading),
                    None => {
                        debug!("[Coordinator] No sensor pollers remain");
                        sensors_open = false;
                    }
                },
            }
        }

        let stats = self.counters.snapshot();
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("   Readings:         {}", stats.readings);
        info!("   Status Events:    {}", stats.status_events);
        info!("   Sensor Updates:   {}", stats.sensor_updates);
        info!("   Cycle Records:    {}", stats.records_written);
        info!("   Failed Writes:    {}", stats.persist_failures);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        stats
    }

    fn handle_reading(&mut self, reading: Reading) {
        let seen = self.counters.reading();

        if let Some(record) = self.processor.add_reading(reading, self.control.tare()) {
            match self.store.append(&record) {
                Ok(()) => {
                    self.counters.record_written();
                    debug!(
                        period_s = record.period,
                        amplitude_deg = record.amplitude,
                        "Cycle record stored"
                    );
                }
                Err(e) => {
                    self.counters.persist_failed();
                    warn!(error = %e, total_micros = record.total_micros, "Failed to persist cycle record");
                }
            }
        }

        self.hub.publish(&PipelineEvent::Reading(reading));

        if seen % self.stats_interval == 0 {
            let stats = self.counters.snapshot();
            info!(
                "📈 Progress: {} readings | {} records | {} subscribers",
                stats.readings,
                stats.records_written,
                self.hub.subscriber_count()
            );
        }
    }

    fn handle_status(&mut self, status: StatusMessage) {
        self.counters.status_event();
        match status.status {
            LinkStatus::Error | LinkStatus::Overflow => {
                debug!(status = ?status.status, error = ?status.error, "Link status");
            }
            LinkStatus::Connected | LinkStatus::Disconnected => {
                info!(status = ?status.status, "Link status");
            }
        }
        self.hub.publish(&PipelineEvent::Status(status));
    }

    fn handle_sensor(&mut self, reading: SensorReading) {
        self.counters.sensor_update();
        self.processor.update_sensor(reading);
        self.hub.publish(&PipelineEvent::Sensor(reading));
    }
}
