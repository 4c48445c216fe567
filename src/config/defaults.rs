//! System-wide default constants.
//!
//! Grouped by subsystem. `ReceiverConfig` defaults point here so the TOML
//! file and the code agree on one set of values.

// ============================================================================
// Server
// ============================================================================

/// HTTP/WebSocket bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Messages buffered per live subscriber before it is dropped as too slow.
pub const SUBSCRIBER_BUFFER: usize = 256;

// ============================================================================
// Serial link
// ============================================================================

/// Encoder board baud rate.
pub const BAUD_RATE: u32 = 115_200;

/// Blocking read timeout (ms). A timeout only lets the reader observe
/// cancellation; it is not counted as an I/O error.
pub const READ_TIMEOUT_MS: u64 = 250;

/// Consecutive I/O errors that trip the circuit breaker.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

// ============================================================================
// Time synchronization
// ============================================================================

/// Wall-clock silence after which device bookkeeping is resynchronized (s).
pub const RESYNC_GAP_SECS: u64 = 60;

// ============================================================================
// Signal analysis
// ============================================================================

/// Readings retained by the signal processor's ring buffer.
pub const BUFFER_CAPACITY: usize = 1_000;

/// Angle represented by one encoder count (degrees).
pub const DEGREES_PER_STEP: f64 = 2.0;

/// Minimum spacing between accepted zero crossings (µs).
pub const DEBOUNCE_MICROS: i64 = 100_000;

/// Largest accepted distance between an interpolated peak and the raw middle
/// sample (degrees).
pub const MAX_PEAK_DEVIATION: f64 = 4.0;

/// Offset applied to one flank of the peak window before fitting (degrees).
pub const QUANTIZATION_BIAS: f64 = 2.0;

/// Encoder steps per processor count, used to convert the tare offset.
pub const TARE_STEPS_PER_COUNT: i64 = 1;

/// Largest tare magnitude accepted from the control surface (encoder steps).
pub const MAX_TARE_STEPS: i64 = u32::MAX as i64;

/// Readings between coordinator statistics log lines.
pub const STATS_INTERVAL_READINGS: u64 = 10_000;

// ============================================================================
// Sensors
// ============================================================================

/// Environmental sensor poll interval (s).
pub const SENSOR_POLL_INTERVAL_SECS: u64 = 2;

// ============================================================================
// Storage
// ============================================================================

/// Cycle store location.
pub const STORAGE_PATH: &str = "./data/cycles.db";

// ============================================================================
// Simulator
// ============================================================================

/// Simulated pendulum period (s).
pub const SIM_PERIOD_SECS: f64 = 2.0;

/// Simulated swing amplitude, centre to extreme (degrees).
pub const SIM_AMPLITUDE_DEGREES: f64 = 90.0;

/// Exponential amplitude decay per second.
pub const SIM_DAMPING_PER_SEC: f64 = 0.0;
