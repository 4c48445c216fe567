//! Shared data structures for the pendulum receiver
//!
//! This module defines the core types that flow through the pipeline:
//! - Acquisition: Reading (one per valid encoder frame), StatusMessage (link health)
//! - Environment: SensorReading (latest value per sensor kind)
//! - Analysis: Peak, ZeroCrossing (signal processor state)
//! - Persistence: CycleRecord (one per completed oscillation)
//! - Fan-out: PipelineEvent (everything published to live subscribers)

mod reading;
mod status;
mod sensor;
mod cycle;
mod event;

pub use reading::*;
pub use status::*;
pub use sensor::*;
pub use cycle::*;
pub use event::*;
