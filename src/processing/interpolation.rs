//! Quadratic peak interpolation
//!
//! Fits `y = ax² + bx + c` through three samples with the time origin on the
//! middle one and returns the vertex. Encoder readings are coarse (one step is
//! 2°), so the vertex recovers the turning point between edges.

use crate::types::Peak;

/// One `(time µs, value)` sample.
pub type Sample = (i64, f64);

/// Vertex of the parabola through three samples.
///
/// Returns `None` when the samples are degenerate (repeated times, collinear
/// values), when the vertex falls outside `[t1, t3]`, or when it lies more
/// than `max_deviation` from the middle value.
pub fn quadratic_peak(samples: [Sample; 3], max_deviation: f64) -> Option<Peak> {
    let [(t1, p1), (t2, p2), (t3, p3)] = samples;

    let x1 = (t1 - t2) as f64;
    let x2 = 0.0;
    let x3 = (t3 - t2) as f64;

    let denom = (x1 - x2) * (x1 - x3) * (x2 - x3);
    if denom == 0.0 {
        return None;
    }

    let a = (x3 * (p2 - p1) + x2 * (p1 - p3) + x1 * (p3 - p2)) / denom;
    let b = (x3 * x3 * (p1 - p2) + x2 * x2 * (p3 - p1) + x1 * x1 * (p2 - p3)) / denom;

    let x_peak = -b / (2.0 * a);
    let value = a * x_peak * x_peak + b * x_peak + p2;
    if !x_peak.is_finite() || !value.is_finite() {
        return None;
    }

    let t_peak = x_peak + t2 as f64;
    if t_peak < t1 as f64 || t_peak > t3 as f64 || (value - p2).abs() > max_deviation {
        return None;
    }

    Some(Peak { time: t_peak.round() as i64, position: value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_vertex_of_known_parabola() {
        // y = -0.01 (x - 3)^2 + 100
        let peak = quadratic_peak([(0, 99.91), (5, 99.96), (10, 99.51)], 4.0).unwrap();
        assert_eq!(peak.time, 3);
        assert!(close(peak.position, 100.0), "{}", peak.position);
    }

    #[test]
    fn test_vertex_with_absolute_timestamps() {
        // y = -2e-9 (t - t0 - 40_000)^2 + 90 sampled 30 ms apart
        let t0 = 1_700_000_000_000_000i64;
        let f = |dt: i64| -2e-9 * ((dt - 40_000) as f64).powi(2) + 90.0;
        let peak = quadratic_peak([(t0, f(0)), (t0 + 30_000, f(30_000)), (t0 + 60_000, f(60_000))], 4.0)
            .unwrap();
        assert_eq!(peak.time, t0 + 40_000);
        assert!(close(peak.position, 90.0));
    }

    #[test]
    fn test_trough_is_found_too() {
        let peak = quadratic_peak([(0, -86.0), (10, -88.0), (20, -86.0)], 4.0).unwrap();
        assert_eq!(peak.time, 10);
        assert!(close(peak.position, -88.0));
    }

    #[test]
    fn test_vertex_outside_window_is_rejected() {
        // Monotonic rise: vertex of the fitted parabola lies after t3
        assert!(quadratic_peak([(0, 0.0), (10, 8.0), (20, 14.0)], 100.0).is_none());
    }

    #[test]
    fn test_vertex_too_far_from_middle_is_rejected() {
        // y = -(x - 13)^2 + 110: vertex 110 sits 9 above the middle sample
        let samples = [(0, -59.0), (10, 101.0), (20, 61.0)];
        assert!(quadratic_peak(samples, 4.0).is_none());
        assert!(quadratic_peak(samples, 10.0).is_some());
    }

    #[test]
    fn test_degenerate_windows() {
        assert!(quadratic_peak([(5, 1.0), (5, 2.0), (6, 1.0)], 4.0).is_none());
        assert!(quadratic_peak([(0, 1.0), (1, 2.0), (2, 3.0)], 4.0).is_none());
    }
}
