//! Receiver configuration structures
//!
//! Every section and field carries a serde default, so a partial TOML file
//! only needs to name the values it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::SensorKind;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PENDULUM_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "receiver.toml";

/// Top-level receiver configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub server: ServerConfig,
    pub serial: SerialConfig,
    pub sync: SyncConfig,
    pub analysis: AnalysisConfig,
    pub sensors: SensorsConfig,
    pub storage: StorageConfig,
    pub simulator: SimulatorConfig,
}

impl ReceiverConfig {
    /// Load configuration using the standard search order:
    ///
    /// 1. `$PENDULUM_CONFIG`
    /// 2. `./receiver.toml`
    /// 3. Built-in defaults
    ///
    /// A file that fails to parse or validate is skipped with a warning.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded receiver config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded receiver config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.addr: '{}' is not a socket address", self.server.addr));
        }

        if self.serial.baud_rate == 0 {
            errors.push("serial.baud_rate must be > 0".to_string());
        }
        if self.serial.read_timeout_ms == 0 {
            errors.push("serial.read_timeout_ms must be > 0".to_string());
        }
        if self.serial.max_consecutive_errors == 0 {
            errors.push("serial.max_consecutive_errors must be > 0".to_string());
        }
        if self.sync.resync_gap_secs == 0 {
            errors.push("sync.resync_gap_secs must be > 0".to_string());
        }

        let a = &self.analysis;
        if a.buffer_capacity < 3 {
            errors.push(format!(
                "analysis.buffer_capacity must be >= 3 (got {})",
                a.buffer_capacity
            ));
        }
        Self::check_positive(a.degrees_per_step, "analysis.degrees_per_step", &mut errors);
        Self::check_positive(a.max_peak_deviation, "analysis.max_peak_deviation", &mut errors);
        if !a.quantization_bias.is_finite() {
            errors.push(format!(
                "analysis.quantization_bias must be finite (got {})",
                a.quantization_bias
            ));
        }
        if a.debounce_micros < 0 {
            errors.push(format!(
                "analysis.debounce_micros must be >= 0 (got {})",
                a.debounce_micros
            ));
        }
        if a.tare_steps_per_count <= 0 {
            errors.push(format!(
                "analysis.tare_steps_per_count must be > 0 (got {})",
                a.tare_steps_per_count
            ));
        }
        if a.stats_interval_readings == 0 {
            errors.push("analysis.stats_interval_readings must be > 0".to_string());
        }

        if self.sensors.poll_interval_secs == 0 {
            errors.push("sensors.poll_interval_secs must be > 0".to_string());
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push("storage.path must not be empty".to_string());
        }

        Self::check_positive(self.simulator.period_secs, "simulator.period_secs", &mut errors);
        Self::check_positive(
            self.simulator.amplitude_degrees,
            "simulator.amplitude_degrees",
            &mut errors,
        );
        if !self.simulator.damping_per_sec.is_finite() || self.simulator.damping_per_sec < 0.0 {
            errors.push(format!(
                "simulator.damping_per_sec must be finite and >= 0 (got {})",
                self.simulator.damping_per_sec
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN compares false against everything, so test finiteness first
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be finite and > 0 (got {value})"));
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address. Overridden by `--addr`.
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: defaults::SERVER_ADDR.to_string() }
    }
}

/// Serial link to the encoder board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port opened at startup. `None` waits for a connect request.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub max_consecutive_errors: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: defaults::BAUD_RATE,
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
            max_consecutive_errors: defaults::MAX_CONSECUTIVE_ERRORS,
        }
    }
}

/// Device-clock synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub resync_gap_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { resync_gap_secs: defaults::RESYNC_GAP_SECS }
    }
}

/// When the signal processor builds a cycle record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCadence {
    /// On every accepted zero crossing (two records per oscillation).
    #[default]
    HalfCycle,
    /// On positive-going crossings only (one record per oscillation).
    FullCycle,
}

/// Signal processor tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub buffer_capacity: usize,
    pub degrees_per_step: f64,
    pub debounce_micros: i64,
    pub max_peak_deviation: f64,
    pub quantization_bias: f64,
    pub tare_steps_per_count: i64,
    pub record_cadence: RecordCadence,
    pub stats_interval_readings: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: defaults::BUFFER_CAPACITY,
            degrees_per_step: defaults::DEGREES_PER_STEP,
            debounce_micros: defaults::DEBOUNCE_MICROS,
            max_peak_deviation: defaults::MAX_PEAK_DEVIATION,
            quantization_bias: defaults::QUANTIZATION_BIAS,
            tare_steps_per_count: defaults::TARE_STEPS_PER_COUNT,
            record_cadence: RecordCadence::default(),
            stats_interval_readings: defaults::STATS_INTERVAL_READINGS,
        }
    }
}

/// Environmental sensor polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub poll_interval_secs: u64,
    /// Sensor kinds served by the random-walk driver.
    pub simulated: Vec<SensorKind>,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::SENSOR_POLL_INTERVAL_SECS,
            simulated: Vec::new(),
        }
    }
}

/// Cycle store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: PathBuf::from(defaults::STORAGE_PATH) }
    }
}

/// Built-in pendulum used by `--simulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub period_secs: f64,
    pub amplitude_degrees: f64,
    pub damping_per_sec: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            period_secs: defaults::SIM_PERIOD_SECS,
            amplitude_degrees: defaults::SIM_AMPLITUDE_DEGREES,
            damping_per_sec: defaults::SIM_DAMPING_PER_SEC,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("config validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
