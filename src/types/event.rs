//! Events fanned out to live subscribers

use serde::Serialize;

use super::{Reading, SensorReading, StatusMessage};

/// Everything the coordinator republishes, unmodified, to the broadcast hub.
///
/// Serialized untagged: each variant keeps its own JSON shape so clients can
/// tell them apart by field (`count`, `status`, `type`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineEvent {
    Reading(Reading),
    Status(StatusMessage),
    Sensor(SensorReading),
}

impl From<Reading> for PipelineEvent {
    fn from(r: Reading) -> Self {
        PipelineEvent::Reading(r)
    }
}

impl From<StatusMessage> for PipelineEvent {
    fn from(s: StatusMessage) -> Self {
        PipelineEvent::Status(s)
    }
}

impl From<SensorReading> for PipelineEvent {
    fn from(s: SensorReading) -> Self {
        PipelineEvent::Sensor(s)
    }
}
