//! Oscillation analysis types

use serde::{Deserialize, Serialize};

use super::{SensorKind, SensorReading};

/// Interpolated turning point of the swing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Interpolated peak time (µs)
    pub time: i64,
    /// Interpolated angle at the peak (degrees)
    pub position: f64,
}

/// Accepted zero crossing of the angle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroCrossing {
    pub time: i64,
    pub rising_edge: bool,
}

/// Latest environmental values attached to a cycle record.
///
/// A sensor that has never reported leaves its fields at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub bmp180_temperature: f64,
    pub bmp180_pressure: f64,
    pub bmp390_temperature: f64,
    pub bmp390_pressure: f64,
    pub sht85_temperature: f64,
    pub sht85_humidity: f64,
}

impl EnvironmentSnapshot {
    /// Build a snapshot from the latest reading of each sensor kind.
    pub fn from_latest<'a>(latest: impl IntoIterator<Item = &'a SensorReading>) -> Self {
        let mut snap = Self::default();
        for reading in latest {
            match reading.kind {
                SensorKind::Bmp180 => {
                    snap.bmp180_temperature = reading.temperature;
                    snap.bmp180_pressure = reading.pressure.unwrap_or_default();
                }
                SensorKind::Bmp390 => {
                    snap.bmp390_temperature = reading.temperature;
                    snap.bmp390_pressure = reading.pressure.unwrap_or_default();
                }
                SensorKind::Sht85 => {
                    snap.sht85_temperature = reading.temperature;
                    snap.sht85_humidity = reading.humidity.unwrap_or_default();
                }
            }
        }
        snap
    }
}

/// Persisted summary of one completed oscillation. Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Corrected epoch time of the triggering reading (µs)
    pub total_micros: u64,
    /// Drift of the triggering reading (µs)
    pub timestamp_drift: i64,
    /// Positive peak minus negative peak (degrees)
    pub amplitude: f64,
    /// Positive plus negative half-period (seconds)
    pub period: f64,
    #[serde(flatten)]
    pub environment: EnvironmentSnapshot,
}
