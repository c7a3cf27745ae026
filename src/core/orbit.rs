//! Orbit state vector interpolation

use crate::types::{microseconds_between, SarError, SarResult, StateVector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Number of state vectors in the Lagrange window
pub const DEFAULT_INTERPOLATION_DEGREE: usize = 8;

/// Interpolated sensor position and velocity (ECEF)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

impl From<&StateVector> for SensorState {
    fn from(sv: &StateVector) -> Self {
        Self {
            position: sv.position,
            velocity: sv.velocity,
        }
    }
}

/// Lagrange interpolator over a borrowed orbit table
#[derive(Debug, Clone, Copy)]
pub struct OrbitInterpolator<'a> {
    state_vectors: &'a [StateVector],
    degree: usize,
}

impl<'a> OrbitInterpolator<'a> {
    /// Interpolator over a time-ordered state vector table, using
    /// `DEFAULT_INTERPOLATION_DEGREE` records per window
    pub fn new(state_vectors: &'a [StateVector]) -> Self {
        Self {
            state_vectors,
            degree: DEFAULT_INTERPOLATION_DEGREE,
        }
    }

    /// Number of state vectors in each Lagrange window; shorter tables are used whole
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    /// Records per interpolation window
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// The borrowed orbit table
    pub fn state_vectors(&self) -> &'a [StateVector] {
        self.state_vectors
    }

    /// Interpolate sensor position and velocity at `time`
    pub fn interpolate(&self, time: DateTime<Utc>) -> SarResult<SensorState> {
        interpolate_state(time, self.state_vectors, self.degree)
    }
}

/// Interpolate orbit position and velocity at a specific time using Lagrange interpolation.
///
/// The window holds `degree` consecutive records centred on the record closest in
/// time, shifted to stay inside the table. Tables shorter than `degree` are used
/// whole; a single record is returned as is.
pub fn interpolate_state(
    time: DateTime<Utc>,
    state_vectors: &[StateVector],
    degree: usize,
) -> SarResult<SensorState> {
    if state_vectors.is_empty() {
        return Err(SarError::InsufficientOrbitData {
            available: 0,
            required: 1,
        });
    }

    let closest_idx = closest_state_vector(state_vectors, time);
    let window = interpolation_window(state_vectors.len(), closest_idx, degree);

    Ok(lagrange_interpolate(&state_vectors[window], time))
}

/// Index of the state vector closest in time to `time` (ties go to the earlier one)
pub fn closest_state_vector(state_vectors: &[StateVector], time: DateTime<Utc>) -> usize {
    let right = state_vectors.partition_point(|sv| sv.time < time);

    if right == 0 {
        return 0;
    }
    if right == state_vectors.len() {
        return right - 1;
    }

    let before = microseconds_between(time, state_vectors[right - 1].time).abs();
    let after = microseconds_between(state_vectors[right].time, time).abs();

    if before <= after {
        right - 1
    } else {
        right
    }
}

/// Window of `points` consecutive indices around `closest`, clamped to `[0, len)`
fn interpolation_window(len: usize, closest: usize, points: usize) -> Range<usize> {
    let points = points.clamp(1, len);
    let start = closest.saturating_sub((points - 1) / 2);
    let start = start.min(len - points);
    start..start + points
}

fn lagrange_interpolate(window: &[StateVector], time: DateTime<Utc>) -> SensorState {
    if window.len() == 1 {
        return SensorState::from(&window[0]);
    }

    // t - t_j in microseconds, away from the absolute epoch
    let offsets: Vec<f64> = window
        .iter()
        .map(|sv| microseconds_between(time, sv.time))
        .collect();

    let mut position = [0.0; 3];
    let mut velocity = [0.0; 3];

    for (i, sv_i) in window.iter().enumerate() {
        let mut weight = 1.0;
        for (j, offset_j) in offsets.iter().enumerate() {
            if i != j {
                // (t - t_j) / (t_i - t_j)
                weight *= offset_j / (offset_j - offsets[i]);
            }
        }

        for coord in 0..3 {
            position[coord] += weight * sv_i.position[coord];
            velocity[coord] += weight * sv_i.velocity[coord];
        }
    }

    SensorState { position, velocity }
}

/// Reject tables that are too short or not strictly chronological
pub fn validate_orbit(state_vectors: &[StateVector], required: usize) -> SarResult<()> {
    if state_vectors.len() < required {
        return Err(SarError::InsufficientOrbitData {
            available: state_vectors.len(),
            required,
        });
    }

    for (i, pair) in state_vectors.windows(2).enumerate() {
        if pair[1].time <= pair[0].time {
            return Err(SarError::InvalidInput(format!(
                "Orbit state vectors not strictly increasing in time at index {} ({} then {})",
                i + 1,
                pair[0].time,
                pair[1].time
            )));
        }
    }

    Ok(())
}

/// Warn about orbit values that do not look like a low Earth orbit
pub fn check_orbit_plausibility(state_vectors: &[StateVector]) {
    for sv in state_vectors {
        let velocity_magnitude = (sv.velocity[0].powi(2)
            + sv.velocity[1].powi(2)
            + sv.velocity[2].powi(2))
        .sqrt();

        if velocity_magnitude < 6000.0 || velocity_magnitude > 9000.0 {
            log::warn!(
                "Unusual orbital velocity: {:.1} m/s at {}",
                velocity_magnitude,
                sv.time.format("%Y-%m-%d %H:%M:%S%.6f")
            );
        }

        let position_magnitude = (sv.position[0].powi(2)
            + sv.position[1].powi(2)
            + sv.position[2].powi(2))
        .sqrt();

        if position_magnitude < 6_500_000.0 || position_magnitude > 7_500_000.0 {
            log::warn!(
                "Unusual orbital radius: {:.1} km at {}",
                position_magnitude / 1000.0,
                sv.time.format("%Y-%m-%d %H:%M:%S%.6f")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::Duration;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2020-01-03T17:08:15Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Cubic position, quadratic velocity: exactly representable by the window
    fn polynomial_orbit(count: usize) -> Vec<StateVector> {
        (0..count)
            .map(|i| {
                let t = i as f64 * 10.0;
                StateVector {
                    time: test_time() + Duration::seconds(i as i64 * 10),
                    position: [7_000_000.0 + 2.0 * t * t, 7500.0 * t, 0.01 * t * t * t],
                    velocity: [4.0 * t, 7500.0, 0.03 * t * t],
                }
            })
            .collect()
    }

    #[test]
    fn test_interpolation_at_records_is_exact() {
        let orbit = polynomial_orbit(12);
        for sv in &orbit {
            let state = interpolate_state(sv.time, &orbit, DEFAULT_INTERPOLATION_DEGREE).unwrap();
            for coord in 0..3 {
                assert_abs_diff_eq!(state.position[coord], sv.position[coord], epsilon = 1e-6);
                assert_abs_diff_eq!(state.velocity[coord], sv.velocity[coord], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_interpolation_between_records() {
        let orbit = polynomial_orbit(12);
        let time = test_time() + Duration::microseconds(43_250_000);
        let t = 43.25;

        let state = OrbitInterpolator::new(&orbit).interpolate(time).unwrap();
        assert_abs_diff_eq!(state.position[0], 7_000_000.0 + 2.0 * t * t, epsilon = 1e-5);
        assert_abs_diff_eq!(state.position[1], 7500.0 * t, epsilon = 1e-5);
        assert_abs_diff_eq!(state.position[2], 0.01 * t * t * t, epsilon = 1e-6);
        assert_abs_diff_eq!(state.velocity[2], 0.03 * t * t, epsilon = 1e-8);
    }

    #[test]
    fn test_window_is_clamped_at_table_edges() {
        assert_eq!(interpolation_window(12, 0, 8), 0..8);
        assert_eq!(interpolation_window(12, 1, 8), 0..8);
        assert_eq!(interpolation_window(12, 6, 8), 3..11);
        assert_eq!(interpolation_window(12, 11, 8), 4..12);
        assert_eq!(interpolation_window(5, 4, 8), 0..5);
        assert_eq!(interpolation_window(5, 2, 1), 2..3);
    }

    #[test]
    fn test_closest_state_vector_ties_go_earlier() {
        let orbit = polynomial_orbit(4);
        assert_eq!(closest_state_vector(&orbit, test_time() - Duration::seconds(100)), 0);
        assert_eq!(closest_state_vector(&orbit, test_time() + Duration::seconds(5)), 0);
        assert_eq!(closest_state_vector(&orbit, test_time() + Duration::seconds(6)), 1);
        assert_eq!(closest_state_vector(&orbit, test_time() + Duration::seconds(20)), 2);
        assert_eq!(closest_state_vector(&orbit, test_time() + Duration::seconds(500)), 3);
    }

    #[test]
    fn test_single_record_is_returned_unmodified() {
        let orbit = polynomial_orbit(1);
        let state = interpolate_state(test_time() + Duration::seconds(42), &orbit, 8).unwrap();
        assert_eq!(state, SensorState::from(&orbit[0]));
    }

    #[test]
    fn test_short_table_uses_all_records() {
        // Three records of a quadratic are reproduced exactly by a degree-2 polynomial
        let orbit = polynomial_orbit(3);
        let time = test_time() + Duration::seconds(13);
        let state = interpolate_state(time, &orbit, 8).unwrap();
        assert_abs_diff_eq!(state.position[0], 7_000_000.0 + 2.0 * 13.0 * 13.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_and_unsorted_tables() {
        assert!(matches!(
            interpolate_state(test_time(), &[], 8),
            Err(SarError::InsufficientOrbitData { available: 0, .. })
        ));

        let mut orbit = polynomial_orbit(4);
        orbit.swap(1, 2);
        assert!(matches!(validate_orbit(&orbit, 2), Err(SarError::InvalidInput(_))));
        assert!(validate_orbit(&polynomial_orbit(4), 2).is_ok());
        assert!(matches!(
            validate_orbit(&polynomial_orbit(1), 2),
            Err(SarError::InsufficientOrbitData { available: 1, required: 2 })
        ));
    }
}
