//! Encoder Frame Codec
//!
//! The encoder board sends one fixed 5-byte frame per edge:
//!
//! ```text
//! byte 0-3: device timestamp, big-endian u32, microseconds, wraps at 2^32
//! byte 4  : bit7 = direction (1 = positive-going, 0 = negative-going)
//!           bits0-6 = checksum = (byte0 ^ byte1 ^ byte2 ^ byte3) & 0x7F
//! ```
//!
//! Five `0xFF` bytes mark a device-side buffer overflow rather than data.

use thiserror::Error;

use crate::types::Direction;

/// Bytes per frame.
pub const FRAME_LEN: usize = 5;

/// Device-side buffer overflow marker.
pub const OVERFLOW_SENTINEL: [u8; FRAME_LEN] = [0xFF; FRAME_LEN];

const DIRECTION_BIT: u8 = 0x80;
const CHECKSUM_MASK: u8 = 0x7F;

/// Reasons a complete frame yields no edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    Integrity { computed: u8, received: u8 },

    #[error("buffer overflow sentinel")]
    Sentinel,
}

/// A validated encoder edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Device clock at the edge (µs, wrapping)
    pub device_timestamp: u32,
    pub direction: Direction,
}

impl Frame {
    /// Validate and unpack a raw frame.
    ///
    /// The sentinel check runs first: `0xFF ^ 0xFF ^ 0xFF ^ 0xFF` is zero, so the
    /// sentinel would otherwise surface as a checksum failure.
    pub fn decode(raw: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        if *raw == OVERFLOW_SENTINEL {
            return Err(FrameError::Sentinel);
        }

        let computed = checksum(raw);
        let received = raw[4] & CHECKSUM_MASK;
        if computed != received {
            return Err(FrameError::Integrity { computed, received });
        }

        let device_timestamp = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let direction = if raw[4] & DIRECTION_BIT != 0 {
            Direction::Positive
        } else {
            Direction::Negative
        };

        Ok(Self { device_timestamp, direction })
    }

    /// Pack into wire bytes with a valid checksum.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let ts = self.device_timestamp.to_be_bytes();
        let mut tail = checksum(&[ts[0], ts[1], ts[2], ts[3], 0]);
        if self.direction == Direction::Positive {
            tail |= DIRECTION_BIT;
        }
        [ts[0], ts[1], ts[2], ts[3], tail]
    }
}

/// 7-bit XOR checksum over the timestamp bytes.
pub fn checksum(raw: &[u8; FRAME_LEN]) -> u8 {
    (raw[0] ^ raw[1] ^ raw[2] ^ raw[3]) & CHECKSUM_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_recovers_edge() {
        for &ts in &[0u32, 1, 0x1234_5678, 0x7FFF_FFFF, 0xFFFF_FFF0] {
            for direction in [Direction::Positive, Direction::Negative] {
                let frame = Frame { device_timestamp: ts, direction };
                assert_eq!(Frame::decode(&frame.encode()), Ok(frame));
            }
        }
    }

    #[test]
    fn test_known_wire_bytes() {
        // 0x01 ^ 0x02 ^ 0x03 ^ 0x04 = 0x04, direction bit set
        let raw = [0x01, 0x02, 0x03, 0x04, 0x84];
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.device_timestamp, 0x0102_0304);
        assert_eq!(frame.direction, Direction::Positive);
    }

    #[test]
    fn test_single_bit_corruption_is_rejected() {
        let raw = Frame { device_timestamp: 0x0A0B_0C0D, direction: Direction::Negative }.encode();
        for byte in 0..4 {
            for bit in 0..7 {
                let mut corrupted = raw;
                corrupted[byte] ^= 1 << bit;
                assert!(
                    matches!(Frame::decode(&corrupted), Err(FrameError::Integrity { .. })),
                    "byte {byte} bit {bit} not detected"
                );
            }
        }
    }

    #[test]
    fn test_bit7_corruption_is_masked_out() {
        // The 7-bit checksum cannot see the top bit of a timestamp byte
        let raw = Frame { device_timestamp: 0x0A0B_0C0D, direction: Direction::Negative }.encode();
        let mut corrupted = raw;
        corrupted[2] ^= 0x80;
        let frame = Frame::decode(&corrupted).unwrap();
        assert_eq!(frame.device_timestamp, 0x0A0B_8C0D);
    }

    #[test]
    fn test_sentinel_is_not_a_checksum_failure() {
        assert_eq!(Frame::decode(&OVERFLOW_SENTINEL), Err(FrameError::Sentinel));
    }

    #[test]
    fn test_checksum_mismatch_reports_both_values() {
        let raw = [0x01, 0x02, 0x03, 0x04, 0x05];
        assert_eq!(
            Frame::decode(&raw),
            Err(FrameError::Integrity { computed: 0x04, received: 0x05 })
        );
    }
}
