//! Cycle detection
//!
//! Turns the stream of encoder readings into per-cycle period and amplitude.
//! Each reading is checked for a debounced zero crossing (which closes a
//! half-period) and, over the newest three readings, for a turning point
//! refined by quadratic interpolation. An accepted crossing attempts a
//! [`CycleRecord`] from the latest peaks, half-periods and sensor values.
//!
//! Owned by the coordinator; never shared.

use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::history::ReadingHistory;
use super::interpolation::quadratic_peak;
use crate::config::{AnalysisConfig, RecordCadence};
use crate::types::{CycleRecord, EnvironmentSnapshot, Peak, Reading, SensorKind, SensorReading, ZeroCrossing};

/// Piece of state a cycle record still needs. Expected while the first swing
/// is being observed; not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingHistory {
    ZeroCrossing,
    PositivePeak,
    NegativePeak,
    PositiveHalfPeriod,
    NegativeHalfPeriod,
}

/// Online period/amplitude analyzer.
#[derive(Debug, Clone)]
pub struct SignalProcessor {
    config: AnalysisConfig,
    history: ReadingHistory,
    last_positive_peak: Option<Peak>,
    last_negative_peak: Option<Peak>,
    last_crossing: Option<ZeroCrossing>,
    /// Seconds, zero until measured
    positive_half_period: f64,
    negative_half_period: f64,
    sensors: BTreeMap<SensorKind, SensorReading>,
}

impl SignalProcessor {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            history: ReadingHistory::new(config.buffer_capacity),
            config,
            last_positive_peak: None,
            last_negative_peak: None,
            last_crossing: None,
            positive_half_period: 0.0,
            negative_half_period: 0.0,
            sensors: BTreeMap::new(),
        }
    }

    /// Feed one reading. `tare_steps` is the caller's zero offset in encoder
    /// steps; it is removed from the count before any analysis.
    ///
    /// Returns the cycle record to persist, if this reading completed one.
    pub fn add_reading(&mut self, reading: Reading, tare_steps: i64) -> Option<CycleRecord> {
        let reading = reading.tared(tare_steps / self.config.tare_steps_per_count);
        let previous = self.history.last::<1>().map(|[r]| r);
        self.history.push(reading);

        let crossing = previous.and_then(|prev| self.detect_zero_crossing(&prev, &reading));
        self.detect_peaks();

        let crossing = crossing?;
        if self.config.record_cadence == RecordCadence::FullCycle && !crossing.rising_edge {
            return None;
        }

        match self.try_build_record(&reading) {
            Ok(record) => {
                debug!(
                    period = record.period,
                    amplitude = record.amplitude,
                    drift = record.timestamp_drift,
                    "Cycle record ready"
                );
                Some(record)
            }
            Err(missing) => {
                trace!(?missing, "Crossing without enough history for a record");
                None
            }
        }
    }

    /// Store the latest value of one environmental sensor.
    pub fn update_sensor(&mut self, reading: SensorReading) {
        self.sensors.insert(reading.kind, reading);
    }

    /// Build a record triggered by `trigger` from the current state.
    pub fn try_build_record(&self, trigger: &Reading) -> Result<CycleRecord, MissingHistory> {
        self.last_crossing.ok_or(MissingHistory::ZeroCrossing)?;
        let positive = self.last_positive_peak.ok_or(MissingHistory::PositivePeak)?;
        let negative = self.last_negative_peak.ok_or(MissingHistory::NegativePeak)?;
        if self.positive_half_period <= 0.0 {
            return Err(MissingHistory::PositiveHalfPeriod);
        }
        if self.negative_half_period <= 0.0 {
            return Err(MissingHistory::NegativeHalfPeriod);
        }

        Ok(CycleRecord {
            total_micros: trigger.total_micros,
            timestamp_drift: trigger.timestamp_drift,
            amplitude: positive.position - negative.position,
            period: self.positive_half_period + self.negative_half_period,
            environment: EnvironmentSnapshot::from_latest(self.sensors.values()),
        })
    }

    pub fn last_positive_peak(&self) -> Option<Peak> {
        self.last_positive_peak
    }

    pub fn last_negative_peak(&self) -> Option<Peak> {
        self.last_negative_peak
    }

    pub fn last_zero_crossing(&self) -> Option<ZeroCrossing> {
        self.last_crossing
    }

    /// (positive, negative) half-periods in seconds.
    pub fn half_periods(&self) -> (f64, f64) {
        (self.positive_half_period, self.negative_half_period)
    }

    pub fn history(&self) -> &ReadingHistory {
        &self.history
    }

    fn angle(&self, reading: &Reading) -> f64 {
        reading.count as f64 * self.config.degrees_per_step
    }

    fn detect_zero_crossing(&mut self, previous: &Reading, current: &Reading) -> Option<ZeroCrossing> {
        let now = current.time_micros();
        if let Some(last) = self.last_crossing {
            if now.saturating_sub(last.time) < self.config.debounce_micros {
                return None;
            }
        }

        let prev_angle = self.angle(previous);
        let angle = self.angle(current);
        let rising_edge = if prev_angle <= 0.0 && angle > 0.0 {
            true
        } else if prev_angle >= 0.0 && angle < 0.0 {
            false
        } else {
            return None;
        };

        if let Some(last) = self.last_crossing {
            let half_period = (now - last.time) as f64 / 1e6;
            if rising_edge {
                self.positive_half_period = half_period;
            } else {
                self.negative_half_period = half_period;
            }
        }

        let crossing = ZeroCrossing { time: now, rising_edge };
        self.last_crossing = Some(crossing);
        Some(crossing)
    }

    fn detect_peaks(&mut self) {
        let Some([r1, r2, r3]) = self.history.last::<3>() else {
            return;
        };
        let (p1, p2, p3) = (self.angle(&r1), self.angle(&r2), self.angle(&r3));
        let (t1, t2, t3) = (r1.time_micros(), r2.time_micros(), r3.time_micros());
        let bias = self.config.quantization_bias;
        let max_dev = self.config.max_peak_deviation;

        if p2 > p1 && p2 > p3 && p2 > 0.0 {
            if let Some(peak) = quadratic_peak([(t1, p1), (t2, p2), (t3, p3 + bias)], max_dev) {
                trace!(time = peak.time, position = peak.position, "Positive peak");
                self.last_positive_peak = Some(peak);
            }
        }
        if p2 < p1 && p2 < p3 && p2 < 0.0 {
            if let Some(peak) = quadratic_peak([(t1, p1 + bias), (t2, p2 + bias), (t3, p3)], max_dev)
            {
                trace!(time = peak.time, position = peak.position, "Negative peak");
                self.last_negative_peak = Some(peak);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(time: u64, count: i64) -> Reading {
        Reading { total_micros: time, count, timestamp_drift: 0 }
    }

    /// One and a half small swings sampled every 50 ms.
    const SWING: [(u64, i64); 14] = [
        (0, 0),
        (50_000, 1),
        (100_000, 2),
        (150_000, 1),
        (200_000, 0),
        (250_000, -1),
        (300_000, -2),
        (350_000, -1),
        (400_000, 0),
        (450_000, 1),
        (500_000, 2),
        (550_000, 1),
        (600_000, 0),
        (650_000, -1),
    ];

    fn run(cadence: RecordCadence) -> (SignalProcessor, Vec<CycleRecord>) {
        let mut processor =
            SignalProcessor::new(AnalysisConfig { record_cadence: cadence, ..Default::default() });
        let records = SWING
            .iter()
            .filter_map(|&(t, c)| processor.add_reading(reading(t, c), 0))
            .collect();
        (processor, records)
    }

    #[test]
    fn test_first_record_waits_for_full_history() {
        let (processor, records) = run(RecordCadence::HalfCycle);

        let peak = processor.last_positive_peak().unwrap();
        assert_eq!(peak.time, 525_000);
        assert!((peak.position - 4.25).abs() < 1e-9);
        let trough = processor.last_negative_peak().unwrap();
        assert_eq!(trough.time, 325_000);
        assert!((trough.position + 2.25).abs() < 1e-9);

        // Crossings at 50 ms and 250 ms lack peaks/half-periods
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].total_micros, 450_000);
        assert!((records[0].period - 0.4).abs() < 1e-12);
        assert!((records[0].amplitude - 6.5).abs() < 1e-9);
        assert_eq!(records[1].total_micros, 650_000);
    }

    #[test]
    fn test_full_cycle_cadence_only_uses_rising_crossings() {
        let (_, records) = run(RecordCadence::FullCycle);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_micros, 450_000);
    }

    #[test]
    fn test_first_reading_never_crosses() {
        let mut processor = SignalProcessor::new(AnalysisConfig::default());
        processor.add_reading(reading(0, 3), 0);
        assert!(processor.last_zero_crossing().is_none());
    }

    #[test]
    fn test_debounce_ignores_quick_opposite_crossing() {
        let mut processor = SignalProcessor::new(AnalysisConfig::default());
        processor.add_reading(reading(0, 0), 0);
        processor.add_reading(reading(10_000, 1), 0);
        processor.add_reading(reading(50_000, -1), 0);

        let crossing = processor.last_zero_crossing().unwrap();
        assert_eq!(crossing, ZeroCrossing { time: 10_000, rising_edge: true });
        assert_eq!(processor.half_periods(), (0.0, 0.0));

        processor.add_reading(reading(210_000, 1), 0);
        let crossing = processor.last_zero_crossing().unwrap();
        assert_eq!(crossing.time, 210_000);
        assert!((processor.half_periods().0 - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_tare_applies_before_analysis() {
        let mut processor = SignalProcessor::new(AnalysisConfig::default());
        processor.add_reading(reading(0, 10), 10);
        processor.add_reading(reading(200_000, 11), 10);
        let crossing = processor.last_zero_crossing().unwrap();
        assert!(crossing.rising_edge);
        let counts: Vec<i64> = processor.history().iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![0, 1]);

        let mut processor = SignalProcessor::new(AnalysisConfig {
            tare_steps_per_count: 2,
            ..Default::default()
        });
        processor.add_reading(reading(0, 7), 10);
        assert_eq!(processor.history().iter().next().unwrap().count, 2);
    }

    #[test]
    fn test_extreme_tare_does_not_overflow() {
        let mut processor = SignalProcessor::new(AnalysisConfig::default());
        assert!(processor.add_reading(reading(0, 1), i64::MIN).is_none());
        assert_eq!(processor.history().iter().next().unwrap().count, i64::MAX);
    }

    #[test]
    fn test_missing_history_is_reported_in_order() {
        let mut processor = SignalProcessor::new(AnalysisConfig::default());
        let r = reading(0, 0);
        assert_eq!(processor.try_build_record(&r), Err(MissingHistory::ZeroCrossing));
        processor.add_reading(r, 0);
        processor.add_reading(reading(50_000, 1), 0);
        assert_eq!(processor.try_build_record(&r), Err(MissingHistory::PositivePeak));
    }

    #[test]
    fn test_record_carries_latest_sensor_values() {
        let mut processor = SignalProcessor::new(AnalysisConfig::default());
        processor.update_sensor(SensorReading::barometric(SensorKind::Bmp180, 19.0, 1000.0, 1));
        processor.update_sensor(SensorReading::barometric(SensorKind::Bmp180, 20.0, 1001.0, 2));
        processor.update_sensor(SensorReading::hygrometric(SensorKind::Sht85, 21.0, 40.0, 3));

        let mut records = Vec::new();
        for &(t, c) in &SWING {
            records.extend(processor.add_reading(reading(t, c), 0));
        }
        let env = records[0].environment;
        assert_eq!(env.bmp180_temperature, 20.0);
        assert_eq!(env.bmp180_pressure, 1001.0);
        assert_eq!(env.sht85_humidity, 40.0);
        assert_eq!(env.bmp390_pressure, 0.0);
    }
}
