//! Doppler evaluation for a sensor state against a ground target

use crate::core::geodesy::{dot, norm, sub};
use crate::types::SPEED_OF_LIGHT;

/// Radar wavelength (meters) for a carrier frequency (Hz)
pub fn wavelength(radar_frequency: f64) -> f64 {
    SPEED_OF_LIGHT / radar_frequency
}

/// Doppler sign function: `2 * f * (v · (g - p))`.
///
/// Not a physical frequency; only its sign and relative magnitude along the orbit
/// are used by the zero-Doppler search.
pub fn doppler_frequency(
    radar_frequency: f64,
    sensor_velocity: &[f64; 3],
    sensor_position: &[f64; 3],
    ground: &[f64; 3],
) -> f64 {
    let look = sub(ground, sensor_position);
    2.0 * radar_frequency * dot(sensor_velocity, &look)
}

/// Doppler frequency in Hz: `2 * (v · look_dir) / λ`, with `look_dir` the unit
/// vector from the sensor to the target
pub fn physical_doppler_hz(
    radar_frequency: f64,
    sensor_velocity: &[f64; 3],
    sensor_position: &[f64; 3],
    ground: &[f64; 3],
) -> f64 {
    let look = sub(ground, sensor_position);
    let range = norm(&look);
    if range == 0.0 {
        return 0.0;
    }

    let velocity_dot_look = dot(sensor_velocity, &look) / range;
    2.0 * velocity_dot_look / wavelength(radar_frequency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_doppler_sign_follows_look_geometry() {
        let ground = [0.0, 0.0, 0.0];
        let velocity = [1.0, 0.0, 0.0];

        // Approaching target: positive, receding: negative
        assert_eq!(doppler_frequency(0.5, &velocity, &[-5.0, 0.0, 0.0], &ground), 5.0);
        assert_eq!(doppler_frequency(0.5, &velocity, &[3.0, 0.0, 0.0], &ground), -3.0);
        assert_eq!(doppler_frequency(0.5, &velocity, &[0.0, 7.0, 0.0], &ground), 0.0);
    }

    #[test]
    fn test_physical_doppler_c_band() {
        let f = 5.405e9;
        let lambda = wavelength(f);
        assert_abs_diff_eq!(lambda, 0.05546576, epsilon = 1e-7);

        // 1 m/s radial closing speed gives 2 / λ Hz
        let doppler = physical_doppler_hz(f, &[1.0, 0.0, 0.0], &[0.0, 0.0, 0.0], &[700_000.0, 0.0, 0.0]);
        assert_abs_diff_eq!(doppler, 2.0 / lambda, epsilon = 1e-9);

        assert_eq!(physical_doppler_hz(f, &[1.0, 0.0, 0.0], &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
    }
}
