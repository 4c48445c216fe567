//! Environmental sensor types

use serde::{Deserialize, Serialize};

/// Environmental sensor kinds fitted next to the pendulum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorKind {
    /// Barometer: temperature + pressure
    #[serde(rename = "BMP180")]
    Bmp180,
    /// Barometer: temperature + pressure
    #[serde(rename = "BMP390")]
    Bmp390,
    /// Hygrometer: temperature + relative humidity
    #[serde(rename = "SHT85")]
    Sht85,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::Bmp180, SensorKind::Bmp390, SensorKind::Sht85];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Bmp180 => "BMP180",
            SensorKind::Bmp390 => "BMP390",
            SensorKind::Sht85 => "SHT85",
        }
    }

    /// Whether the sensor reports pressure (barometers) or humidity.
    pub fn is_barometer(self) -> bool {
        matches!(self, SensorKind::Bmp180 | SensorKind::Bmp390)
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample from an environmental sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "type")]
    pub kind: SensorKind,
    /// Temperature (°C)
    pub temperature: f64,
    /// Pressure (hPa), barometers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    /// Relative humidity (%), hygrometers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// Wall-clock sample time (µs since epoch)
    pub timestamp: i64,
}

impl SensorReading {
    pub fn barometric(kind: SensorKind, temperature: f64, pressure: f64, timestamp: i64) -> Self {
        Self { kind, temperature, pressure: Some(pressure), humidity: None, timestamp }
    }

    pub fn hygrometric(kind: SensorKind, temperature: f64, humidity: f64, timestamp: i64) -> Self {
        Self { kind, temperature, pressure: None, humidity: Some(humidity), timestamp }
    }
}
