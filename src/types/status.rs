//! Link status messages
//!
//! Status transitions travel through the same publish path as data, so every
//! subscriber sees link health inline with the readings.

use serde::{Deserialize, Serialize};

/// Device a status message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Serial,
}

/// Link status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
    Overflow,
    Error,
}

/// Status event published alongside readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub device: Device,
    pub status: LinkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusMessage {
    pub fn connected() -> Self {
        Self { device: Device::Serial, status: LinkStatus::Connected, error: None }
    }

    pub fn disconnected() -> Self {
        Self { device: Device::Serial, status: LinkStatus::Disconnected, error: None }
    }

    /// Device-side buffer overflow marker received.
    pub fn overflow() -> Self {
        Self {
            device: Device::Serial,
            status: LinkStatus::Overflow,
            error: Some("Buffer overflow detected".to_string()),
        }
    }

    /// Device clock wrapped; `count` is the wraps since the last resync.
    pub fn clock_wrapped(count: u64) -> Self {
        Self {
            device: Device::Serial,
            status: LinkStatus::Overflow,
            error: Some(format!("Overflow count: {count}")),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { device: Device::Serial, status: LinkStatus::Error, error: Some(message.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_shape() {
        let json = serde_json::to_string(&StatusMessage::connected()).unwrap();
        assert_eq!(json, r#"{"device":"serial","status":"connected"}"#);

        let json = serde_json::to_value(StatusMessage::error("boom")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");

        let json = serde_json::to_value(StatusMessage::clock_wrapped(2)).unwrap();
        assert_eq!(json["status"], "overflow");
        assert_eq!(json["error"], "Overflow count: 2");
    }
}
