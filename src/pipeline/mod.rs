//! Receiver Pipeline
//!
//! ```text
//! serial reader (blocking thread) ──SerialEvent──┐
//!                                                ├──> Coordinator ──> SignalProcessor
//! sensor pollers (tasks) ─────SensorReading──────┘         │  └─────> CycleStore
//!                                                          └────────> Hub ──> subscribers
//! ```
//!
//! Producers hand over one value at a time through single-slot channels, so
//! a busy coordinator back-pressures the devices instead of queueing.
//! [`PipelineHandle`] is the control surface used by the API.

mod connection;
mod coordinator;
mod state;

pub use connection::{LinkSettings, LinkState, SerialLink};
pub use coordinator::Coordinator;
pub use state::{ControlState, PipelineCounters, PipelineStats};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::acquisition::{PortOpener, SerialEvent, WallClock};
use crate::broadcast::Hub;
use crate::config::ReceiverConfig;
use crate::processing::SignalProcessor;
use crate::storage::CycleStore;
use crate::types::SensorReading;

/// Producer-to-coordinator channel depth.
const HANDOFF_CAPACITY: usize = 1;

/// Cloneable handle to the running pipeline's shared pieces.
#[derive(Clone)]
pub struct PipelineHandle {
    pub link: Arc<SerialLink>,
    pub control: Arc<ControlState>,
    pub hub: Arc<Hub>,
    pub store: Arc<dyn CycleStore>,
    pub counters: Arc<PipelineCounters>,
}

/// A wired but not yet running pipeline.
pub struct Pipeline {
    pub handle: PipelineHandle,
    pub coordinator: Coordinator,
    /// Clone one per sensor poller, then drop
    pub sensor_tx: mpsc::Sender<SensorReading>,
}

impl Pipeline {
    /// Wire the coordinator, serial link and hub. `shutdown` also stops any
    /// serial reader the link starts.
    pub fn build(
        config: &ReceiverConfig,
        opener: Arc<dyn PortOpener>,
        clock: Arc<dyn WallClock>,
        store: Arc<dyn CycleStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let (serial_tx, serial_rx) = mpsc::channel::<SerialEvent>(HANDOFF_CAPACITY);
        let (sensor_tx, sensor_rx) = mpsc::channel::<SensorReading>(HANDOFF_CAPACITY);

        let hub = Arc::new(Hub::default());
        let control = Arc::new(ControlState::default());
        let counters = Arc::new(PipelineCounters::default());

        let link = Arc::new(SerialLink::new(
            opener,
            clock,
            serial_tx,
            LinkSettings {
                resync_gap_secs: config.sync.resync_gap_secs,
                max_consecutive_errors: config.serial.max_consecutive_errors,
            },
            shutdown,
        ));

        let coordinator = Coordinator::new(
            SignalProcessor::new(config.analysis.clone()),
            Arc::clone(&store),
            Arc::clone(&hub),
            Arc::clone(&control),
            Arc::clone(&counters),
            serial_rx,
            sensor_rx,
            config.analysis.stats_interval_readings,
        );

        Self {
            handle: PipelineHandle { link, control, hub, store, counters },
            coordinator,
            sensor_tx,
        }
    }
}
