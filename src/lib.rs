//! Pendulum Receiver
//!
//! Host-side receiver for a pendulum's rotary encoder board.
//!
//! ## Architecture
//!
//! - **Acquisition**: 5-byte edge frames, checksum, device-clock wraparound
//!   and wall-clock projection, I/O circuit breaker
//! - **Processing**: zero crossings, interpolated peaks, half-periods and
//!   one cycle record per completed swing
//! - **Pipeline**: a single coordinator that feeds the processor, persists
//!   records and republishes every event to live subscribers
//! - **API**: connect, tare, historical queries and a WebSocket stream

pub mod acquisition;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod pipeline;
pub mod processing;
pub mod storage;
pub mod types;

pub use config::ReceiverConfig;
pub use pipeline::{Pipeline, PipelineHandle};
pub use types::{CycleRecord, PipelineEvent, Reading, SensorReading, StatusMessage};
