//! Encoder and environmental data acquisition
//!
//! Serial bytes become validated, drift-corrected [`Reading`]s here:
//!
//! ```text
//! PortOpener -> ByteSource -> FrameDecoder (frame + TimeSync) -> run_reader -> SerialEvent
//! ```
//!
//! Environmental sensors are polled by their own tasks (see [`sensors`]).
//!
//! [`Reading`]: crate::types::Reading

pub mod decoder;
pub mod frame;
pub mod port;
pub mod sensors;
pub mod serial_reader;
pub mod simulator;
pub mod time_sync;

pub use decoder::{AcquisitionError, DecodeStep, FrameDecoder};
pub use frame::{Frame, FrameError, FRAME_LEN, OVERFLOW_SENTINEL};
pub use port::{
    ByteSource, ConnectRequest, PortOpener, ScriptedOpener, SerialPortOpener, SimulatorOpener,
    SIMULATED_PORT,
};
pub use sensors::{poll_sensor, EnvironmentSensor, SensorError, SimulatedSensor};
pub use serial_reader::{run_reader, ReaderExit, SerialEvent};
pub use simulator::{PendulumSimulator, PendulumTrace, TraceEdge};
pub use time_sync::{ManualClock, SyncedTime, SystemClock, TimeSync, WallClock};
