//! Environmental sensor drivers and pollers
//!
//! Each sensor runs in its own task, sampling on a fixed interval and handing
//! one reading at a time to the coordinator. Drivers implement
//! [`EnvironmentSensor`]; the I²C calibration math of the physical parts
//! lives outside this crate.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{SensorKind, SensorReading};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("{kind} bus error: {message}")]
    Bus { kind: SensorKind, message: String },
}

// ============================================================================
// Driver Seam
// ============================================================================

/// A polled environmental sensor.
#[async_trait]
pub trait EnvironmentSensor: Send {
    fn kind(&self) -> SensorKind;

    /// Take one sample.
    async fn sample(&mut self) -> Result<SensorReading, SensorError>;
}

// ============================================================================
// Simulated Sensor
// ============================================================================

/// Random-walk stand-in for a physical sensor.
pub struct SimulatedSensor {
    kind: SensorKind,
    temperature: f64,
    /// Pressure (hPa) for barometers, relative humidity (%) otherwise
    secondary: f64,
    rng: StdRng,
}

impl SimulatedSensor {
    pub fn new(kind: SensorKind) -> Self {
        Self::with_rng(kind, StdRng::from_entropy())
    }

    /// Deterministic walk for tests.
    pub fn seeded(kind: SensorKind, seed: u64) -> Self {
        Self::with_rng(kind, StdRng::seed_from_u64(seed))
    }

    fn with_rng(kind: SensorKind, rng: StdRng) -> Self {
        let secondary = if kind.is_barometer() { 1013.25 } else { 45.0 };
        Self { kind, temperature: 21.0, secondary, rng }
    }
}

#[async_trait]
impl EnvironmentSensor for SimulatedSensor {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    async fn sample(&mut self) -> Result<SensorReading, SensorError> {
        self.temperature = (self.temperature + self.rng.gen_range(-0.05..=0.05)).clamp(15.0, 30.0);
        let timestamp = chrono::Utc::now().timestamp_micros();

        if self.kind.is_barometer() {
            self.secondary = (self.secondary + self.rng.gen_range(-0.2..=0.2)).clamp(950.0, 1050.0);
            Ok(SensorReading::barometric(self.kind, self.temperature, self.secondary, timestamp))
        } else {
            self.secondary = (self.secondary + self.rng.gen_range(-0.3..=0.3)).clamp(0.0, 100.0);
            Ok(SensorReading::hygrometric(self.kind, self.temperature, self.secondary, timestamp))
        }
    }
}

// ============================================================================
// Poller
// ============================================================================

/// Sample `sensor` every `interval` until cancelled or the coordinator goes away.
///
/// A failed sample is logged and the tick skipped.
pub async fn poll_sensor(
    mut sensor: Box<dyn EnvironmentSensor>,
    interval: Duration,
    tx: mpsc::Sender<SensorReading>,
    cancel: CancellationToken,
) {
    let kind = sensor.kind();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(sensor = %kind, interval_secs = interval.as_secs_f64(), "Sensor poller started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match sensor.sample().await {
            Ok(reading) => {
                debug!(sensor = %kind, temperature = reading.temperature, "Sensor sample");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = tx.send(reading) => if sent.is_err() { break },
                }
            }
            Err(e) => warn!(sensor = %kind, error = %e, "Sensor read failed, skipping tick"),
        }
    }

    info!(sensor = %kind, "Sensor poller stopped");
}
