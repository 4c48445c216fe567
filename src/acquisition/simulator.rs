//! Pendulum Simulator
//!
//! Generates the encoder frames a real pendulum would produce, so the whole
//! pipeline can run without hardware (`--simulate`). The swing follows a
//! damped sinusoid and the encoder quantizes it to whole steps.

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use super::frame::{Frame, FRAME_LEN};
use crate::config::SimulatorConfig;
use crate::types::Direction;

/// Integration step used to locate encoder edges (µs).
const SCAN_STEP_MICROS: u64 = 20;

/// Quantized pendulum swing producing one frame per encoder edge.
#[derive(Debug, Clone)]
pub struct PendulumTrace {
    period_secs: f64,
    amplitude_degrees: f64,
    damping_per_sec: f64,
    degrees_per_step: f64,
    /// Device time of the next sample to scan (µs since trace start)
    elapsed: u64,
    /// Added to elapsed time when stamping frames; lets tests start near a wrap
    device_offset: u32,
    step: i64,
}

impl PendulumTrace {
    pub fn new(config: &SimulatorConfig, degrees_per_step: f64) -> Self {
        Self {
            period_secs: config.period_secs,
            amplitude_degrees: config.amplitude_degrees,
            damping_per_sec: config.damping_per_sec,
            degrees_per_step,
            elapsed: 0,
            device_offset: 0,
            step: 0,
        }
    }

    /// Start the device clock at `offset` instead of zero.
    pub fn with_device_offset(mut self, offset: u32) -> Self {
        self.device_offset = offset;
        self
    }

    /// Swing angle at `micros` into the trace (degrees).
    pub fn angle_at(&self, micros: u64) -> f64 {
        let t = micros as f64 / 1e6;
        let envelope = self.amplitude_degrees * (-self.damping_per_sec * t).exp();
        envelope * (std::f64::consts::TAU * t / self.period_secs).sin()
    }

    fn step_at(&self, micros: u64) -> i64 {
        (self.angle_at(micros) / self.degrees_per_step).floor() as i64
    }
}

/// One generated edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEdge {
    /// Microseconds since trace start
    pub elapsed: u64,
    pub frame: Frame,
}

impl Iterator for PendulumTrace {
    type Item = TraceEdge;

    /// Scan forward to the next step boundary. A fully damped swing yields no
    /// further edges.
    fn next(&mut self) -> Option<TraceEdge> {
        let horizon = self.elapsed + (self.period_secs * 1e6) as u64;
        loop {
            let target = self.step_at(self.elapsed);
            if target != self.step {
                // One edge per step; a multi-step jump is emitted over
                // several calls at the same instant
                let direction =
                    if target > self.step { Direction::Positive } else { Direction::Negative };
                self.step += direction.step();
                let device_timestamp = self.device_offset.wrapping_add(self.elapsed as u32);
                return Some(TraceEdge {
                    elapsed: self.elapsed,
                    frame: Frame { device_timestamp, direction },
                });
            }
            if self.elapsed >= horizon {
                return None;
            }
            self.elapsed += SCAN_STEP_MICROS;
        }
    }
}

/// Byte source replaying a [`PendulumTrace`] in real time.
///
/// Reads block until the next edge is due, or fail with `TimedOut` after
/// `read_timeout` so the reader can observe cancellation.
pub struct PendulumSimulator {
    trace: PendulumTrace,
    started: Instant,
    read_timeout: Duration,
    next: Option<TraceEdge>,
    buffered: [u8; FRAME_LEN],
    cursor: usize,
}

impl PendulumSimulator {
    pub fn new(trace: PendulumTrace, read_timeout: Duration) -> Self {
        Self {
            trace,
            started: Instant::now(),
            read_timeout,
            next: None,
            buffered: [0; FRAME_LEN],
            cursor: FRAME_LEN,
        }
    }
}

impl Read for PendulumSimulator {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cursor >= FRAME_LEN {
            if self.next.is_none() {
                self.next = self.trace.next();
            }
            let Some(edge) = self.next else {
                std::thread::sleep(self.read_timeout);
                return Err(std::io::Error::new(ErrorKind::TimedOut, "pendulum at rest"));
            };

            let due = self.started + Duration::from_micros(edge.elapsed);
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > self.read_timeout {
                    std::thread::sleep(self.read_timeout);
                    return Err(std::io::Error::new(ErrorKind::TimedOut, "no edge yet"));
                }
                std::thread::sleep(wait);
            }

            self.buffered = edge.frame.encode();
            self.cursor = 0;
            self.next = None;
        }

        let n = buf.len().min(FRAME_LEN - self.cursor);
        buf[..n].copy_from_slice(&self.buffered[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> PendulumTrace {
        PendulumTrace::new(&SimulatorConfig::default(), 2.0)
    }

    #[test]
    fn test_trace_emits_single_step_edges() {
        let mut position = 0i64;
        let mut max = i64::MIN;
        let mut min = i64::MAX;
        let mut last_elapsed = 0;
        for edge in trace().take_while(|e| e.elapsed < 4_000_000) {
            assert!(edge.elapsed >= last_elapsed);
            last_elapsed = edge.elapsed;
            position += edge.frame.direction.step();
            max = max.max(position);
            min = min.min(position);
        }
        // 90 degree swing at 2 degrees per step; the crest may land on a sample
        assert!((44..=45).contains(&max), "max {max}");
        assert_eq!(min, -45);
    }

    #[test]
    fn test_device_offset_wraps() {
        let mut t = trace().with_device_offset(u32::MAX - 10);
        let first = t.next().unwrap();
        assert!(first.frame.device_timestamp < 1_000_000);
    }

    #[test]
    fn test_simulator_serves_whole_frames() {
        let mut sim = PendulumSimulator::new(trace(), Duration::from_millis(250));
        let mut buf = [0u8; FRAME_LEN];
        sim.read_exact(&mut buf).unwrap();
        let frame = Frame::decode(&buf).unwrap();
        assert_eq!(frame.direction, Direction::Positive);
    }
}
