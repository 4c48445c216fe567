//! Byte-source openers
//!
//! The serial link opens its byte source through [`PortOpener`] so the same
//! reader runs against hardware, the built-in simulator, or scripted bytes.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::decoder::AcquisitionError;
use super::simulator::{PendulumSimulator, PendulumTrace};
use crate::config::SimulatorConfig;

/// Blocking byte source handed to the frame decoder.
pub type ByteSource = Box<dyn Read + Send>;

/// Name of the port served by [`SimulatorOpener`].
pub const SIMULATED_PORT: &str = "simulator";

/// Target of a connect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub port_name: String,
    pub baud_rate: u32,
}

/// Opens byte sources by port name.
pub trait PortOpener: Send + Sync + 'static {
    fn open(&self, request: &ConnectRequest) -> Result<ByteSource, AcquisitionError>;

    /// Port names a connect request may target.
    fn available_ports(&self) -> Result<Vec<String>, AcquisitionError>;
}

// ============================================================================
// Hardware
// ============================================================================

/// Serial ports via the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    read_timeout: Duration,
}

impl SerialPortOpener {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&self, request: &ConnectRequest) -> Result<ByteSource, AcquisitionError> {
        let port = serialport::new(&request.port_name, request.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| AcquisitionError::Open {
                port: request.port_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(port))
    }

    fn available_ports(&self) -> Result<Vec<String>, AcquisitionError> {
        let ports = serialport::available_ports().map_err(|e| AcquisitionError::Open {
            port: "*".to_string(),
            reason: e.to_string(),
        })?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// Serves a real-time [`PendulumSimulator`] under the name `simulator`.
#[derive(Debug, Clone)]
pub struct SimulatorOpener {
    config: SimulatorConfig,
    degrees_per_step: f64,
    read_timeout: Duration,
}

impl SimulatorOpener {
    pub fn new(config: SimulatorConfig, degrees_per_step: f64, read_timeout: Duration) -> Self {
        Self { config, degrees_per_step, read_timeout }
    }
}

impl PortOpener for SimulatorOpener {
    fn open(&self, request: &ConnectRequest) -> Result<ByteSource, AcquisitionError> {
        if request.port_name != SIMULATED_PORT {
            return Err(AcquisitionError::Open {
                port: request.port_name.clone(),
                reason: format!("only '{SIMULATED_PORT}' is available in simulation mode"),
            });
        }
        let trace = PendulumTrace::new(&self.config, self.degrees_per_step);
        Ok(Box::new(PendulumSimulator::new(trace, self.read_timeout)))
    }

    fn available_ports(&self) -> Result<Vec<String>, AcquisitionError> {
        Ok(vec![SIMULATED_PORT.to_string()])
    }
}

// ============================================================================
// Scripted
// ============================================================================

/// Hands out pre-recorded byte streams, one per open, keyed by port name.
///
/// Used for replay and tests; an unknown or exhausted port fails to open.
#[derive(Default)]
pub struct ScriptedOpener {
    scripts: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    fn scripts(&self) -> MutexGuard<'_, Vec<(String, Vec<u8>)>> {
        // Each mutation is a single Vec call, so a poisoned list is still whole
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `bytes` for the next open of `port`.
    pub fn push(&self, port: impl Into<String>, bytes: Vec<u8>) {
        self.scripts().push((port.into(), bytes));
    }
}

impl PortOpener for ScriptedOpener {
    fn open(&self, request: &ConnectRequest) -> Result<ByteSource, AcquisitionError> {
        let mut scripts = self.scripts();
        let index = scripts
            .iter()
            .position(|(name, _)| *name == request.port_name)
            .ok_or_else(|| AcquisitionError::Open {
                port: request.port_name.clone(),
                reason: "no such port".to_string(),
            })?;
        let (_, bytes) = scripts.remove(index);
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    fn available_ports(&self) -> Result<Vec<String>, AcquisitionError> {
        let mut names: Vec<String> = self.scripts().iter().map(|(name, _)| name.clone()).collect();
        names.dedup();
        Ok(names)
    }
}
