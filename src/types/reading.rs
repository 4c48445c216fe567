//! Encoder reading types

use serde::{Deserialize, Serialize};

/// One decoded encoder edge, projected onto the wall-clock timeline.
///
/// Produced exactly once per valid, non-sentinel frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Drift-corrected epoch time of the edge (µs)
    pub total_micros: u64,
    /// Cumulative encoder position (+1 per positive edge, -1 per negative edge)
    pub count: i64,
    /// Wall-clock arrival minus corrected epoch time (µs)
    pub timestamp_drift: i64,
}

impl Reading {
    /// Reading time as a signed microsecond value for interval arithmetic.
    pub fn time_micros(&self) -> i64 {
        i64::try_from(self.total_micros).unwrap_or(i64::MAX)
    }

    /// Copy of this reading with the tare offset removed from the count.
    ///
    /// Saturates at the `i64` bounds.
    pub fn tared(self, offset_counts: i64) -> Self {
        Self {
            count: self.count.saturating_sub(offset_counts),
            ..self
        }
    }
}

/// Edge direction encoded in bit 7 of the frame's final byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Position delta applied to the cumulative count.
    pub fn step(self) -> i64 {
        match self {
            Direction::Positive => 1,
            Direction::Negative => -1,
        }
    }
}
