//! Zero-Doppler azimuth time search along the orbit
//!
//! The orbit table is scanned record by record for the first pair of
//! consecutive state vectors whose Doppler sign differs. The crossing time is
//! interpolated linearly from the two Doppler magnitudes and the sensor state
//! is then re-interpolated at that time.

use crate::core::doppler::{doppler_frequency, physical_doppler_hz};
use crate::core::geodesy::distance;
use crate::core::orbit::{validate_orbit, OrbitInterpolator, SensorState, DEFAULT_INTERPOLATION_DEGREE};
use crate::types::{
    microseconds_between, offset_by_microseconds, SarError, SarResult, StateVector, SPEED_OF_LIGHT,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bistatic (signal travel time) azimuth correction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BistaticCorrection {
    /// Sentinel-1 products are already corrected
    #[default]
    Disabled,
    /// Add the one-way travel time once and re-interpolate
    SinglePass,
    /// Repeat the correction until the delay moves by at most `tolerance_us`
    Iterative {
        tolerance_us: f64,
        max_iterations: usize,
    },
}

/// Consecutive orbit records enclosing a Doppler sign change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DopplerBracket {
    pub lower: usize,
    pub upper: usize,
    pub lower_doppler: f64,
    pub upper_doppler: f64,
}

impl DopplerBracket {
    /// Relative position of the zero crossing between `lower` and `upper`, in `[0, 1]`
    pub fn interpolation_factor(&self) -> f64 {
        let a = self.lower_doppler.abs();
        let b = self.upper_doppler.abs();
        let denominator = a + b;
        if denominator == 0.0 {
            return 0.0;
        }
        (a / denominator).clamp(0.0, 1.0)
    }
}

/// Result of a zero-Doppler search
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroDopplerSolution {
    pub azimuth_time: DateTime<Utc>,
    pub sensor: SensorState,
    pub bracket: DopplerBracket,
    pub interpolation_factor: f64,
    /// Bistatic delay added to the azimuth time (microseconds, 0 when disabled)
    pub bistatic_delay_us: f64,
    /// Residual Doppler (Hz) of the final sensor state, for diagnostics
    pub residual_doppler_hz: f64,
}

/// Scan the orbit for the first sign change of the Doppler function.
///
/// Returns `None` when the sign never changes over the whole table.
pub fn find_doppler_bracket(
    state_vectors: &[StateVector],
    radar_frequency: f64,
    ground: &[f64; 3],
) -> Option<DopplerBracket> {
    let first = state_vectors.first()?;

    let mut last_doppler = doppler_frequency(radar_frequency, &first.velocity, &first.position, ground);
    let last_sign = last_doppler < 0.0;

    for (idx, sv) in state_vectors.iter().enumerate().skip(1) {
        let current_doppler = doppler_frequency(radar_frequency, &sv.velocity, &sv.position, ground);
        if (current_doppler < 0.0) != last_sign {
            return Some(DopplerBracket {
                lower: idx - 1,
                upper: idx,
                lower_doppler: last_doppler,
                upper_doppler: current_doppler,
            });
        }
        last_doppler = current_doppler;
    }

    None
}

/// Zero-Doppler solver over a borrowed orbit table
#[derive(Debug, Clone, Copy)]
pub struct ZeroDopplerSearch<'a> {
    state_vectors: &'a [StateVector],
    radar_frequency: f64,
    degree: usize,
    bistatic_correction: BistaticCorrection,
    azimuth_time_offset_us: f64,
}

impl<'a> ZeroDopplerSearch<'a> {
    /// Create a solver for an orbit table and radar carrier frequency (Hz), with
    /// the default interpolation degree and no corrections
    pub fn new(state_vectors: &'a [StateVector], radar_frequency: f64) -> Self {
        Self {
            state_vectors,
            radar_frequency,
            degree: DEFAULT_INTERPOLATION_DEGREE,
            bistatic_correction: BistaticCorrection::Disabled,
            azimuth_time_offset_us: 0.0,
        }
    }

    /// Number of state vectors per Lagrange window
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    /// Set the bistatic azimuth correction mode
    pub fn with_bistatic_correction(mut self, correction: BistaticCorrection) -> Self {
        self.bistatic_correction = correction;
        self
    }

    /// Constant offset added to every estimated azimuth time
    pub fn with_azimuth_time_offset(mut self, offset_us: f64) -> Self {
        self.azimuth_time_offset_us = offset_us;
        self
    }

    /// Find the zero-Doppler time and sensor state for an ECEF ground point
    pub fn solve(&self, ground: &[f64; 3]) -> SarResult<ZeroDopplerSolution> {
        validate_orbit(self.state_vectors, 2)?;

        let bracket = find_doppler_bracket(self.state_vectors, self.radar_frequency, ground)
            .ok_or_else(|| SarError::OutOfBracket {
                first: self.state_vectors[0].time,
                last: self.state_vectors[self.state_vectors.len() - 1].time,
            })?;

        let lower_time = self.state_vectors[bracket.lower].time;
        let upper_time = self.state_vectors[bracket.upper].time;
        let factor = bracket.interpolation_factor();
        let delta_us = microseconds_between(upper_time, lower_time);

        let crossing_time = offset_by_microseconds(lower_time, (factor * delta_us).round())?;
        let crossing_time = offset_by_microseconds(crossing_time, self.azimuth_time_offset_us)?;

        let interpolator = OrbitInterpolator::new(self.state_vectors).with_degree(self.degree);
        let mut sensor = interpolator.interpolate(crossing_time)?;

        let (azimuth_time, bistatic_delay_us) = match self.bistatic_correction {
            BistaticCorrection::Disabled => (crossing_time, 0.0),
            BistaticCorrection::SinglePass => {
                let delay = bistatic_delay_us(&sensor.position, ground);
                let time = offset_by_microseconds(crossing_time, delay)?;
                sensor = interpolator.interpolate(time)?;
                (time, delay)
            }
            BistaticCorrection::Iterative {
                tolerance_us,
                max_iterations,
            } => {
                let mut delay = 0.0;
                let mut time = crossing_time;
                for iteration in 0..max_iterations.max(1) {
                    let next_delay = bistatic_delay_us(&sensor.position, ground);
                    time = offset_by_microseconds(crossing_time, next_delay)?;
                    sensor = interpolator.interpolate(time)?;
                    let change = (next_delay - delay).abs();
                    delay = next_delay;
                    if change <= tolerance_us {
                        log::trace!("Bistatic delay converged after {} iterations", iteration + 1);
                        break;
                    }
                }
                (time, delay)
            }
        };

        let residual_doppler_hz =
            physical_doppler_hz(self.radar_frequency, &sensor.velocity, &sensor.position, ground);

        log::debug!(
            "Zero-Doppler bracket [{}, {}], factor {:.6}, time {}, residual {:.3} Hz",
            bracket.lower,
            bracket.upper,
            factor,
            azimuth_time.format("%Y-%m-%dT%H:%M:%S%.6f"),
            residual_doppler_hz
        );

        Ok(ZeroDopplerSolution {
            azimuth_time,
            sensor,
            bracket,
            interpolation_factor: factor,
            bistatic_delay_us,
            residual_doppler_hz,
        })
    }
}

/// One-way signal travel time between sensor and ground, rounded to whole microseconds
pub fn bistatic_delay_us(sensor_position: &[f64; 3], ground: &[f64; 3]) -> f64 {
    (1_000_000.0 * distance(sensor_position, ground) / SPEED_OF_LIGHT).round()
}
