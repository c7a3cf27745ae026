//! Synthetic Sentinel-1-like acquisitions for testing
//!
//! Circular orbit (rotated about the x axis by the inclination) over a
//! spherical Earth. Every pixel's ground point is built on the zero-Doppler
//! plane of the analytic orbit, so GCPs are exact forward projections.

use crate::core::burst::{build_burst_records, BurstTiming};
use crate::core::geodesy::{add, ecef_to_geodetic, norm, scale};
use crate::core::inverse_locator::{InverseLocator, LocatorConfig};
use crate::core::orbit::SensorState;
use crate::io::product::ProductGeometry;
use crate::types::{
    microseconds_between, offset_by_microseconds, GeometryContext, GroundControlPoint,
    ImagePoint, SarError, SarResult, SrgrRecord, StateVector, SPEED_OF_LIGHT,
};
use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

const SRGR_FIT_DEGREE: usize = 6;
const SRGR_FIT_POINTS: usize = 64;

/// Product flavour of a synthetic acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MockMode {
    /// Single-look complex, slant range, no bursts
    Slc,
    /// TOPS interferometric wide swath: slant range with bursts
    Iw,
    /// Ground range detected
    Grd,
}

impl FromStr for MockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slc" => Ok(MockMode::Slc),
            "iw" => Ok(MockMode::Iw),
            "grd" => Ok(MockMode::Grd),
            other => Err(format!("unknown mock mode '{}', expected slc, iw or grd", other)),
        }
    }
}

/// Parameters of a synthetic acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockAcquisition {
    pub mode: MockMode,
    pub start_time: DateTime<Utc>,
    pub orbit_period: f64,              // seconds
    pub orbit_radius: f64,              // meters
    pub earth_radius: f64,              // meters (spherical)
    pub inclination_deg: f64,
    pub state_vector_interval_s: f64,
    pub orbit_margin_s: f64,            // orbit coverage before and after the image
    pub radar_frequency: f64,
    pub azimuth_time_interval_us: f64,
    pub near_range_time: f64,
    pub range_sampling_rate: f64,
    pub range_pixel_spacing: f64,
    pub number_of_lines: usize,
    pub number_of_samples: usize,
    pub burst_count: usize,
    pub lines_per_burst: usize,
    pub invalid_leading_lines: usize,
    pub invalid_trailing_lines: usize,
}

impl MockAcquisition {
    pub fn new(mode: MockMode) -> Self {
        // 2020-01-03T17:08:15Z
        let start_time = DateTime::from_timestamp(1_578_071_295, 0).unwrap_or_default();

        let mut mock = Self {
            mode,
            start_time,
            orbit_period: 5940.0,          // about 99 minutes
            orbit_radius: 7_070_000.0,     // 700 km altitude
            earth_radius: 6_371_000.0,
            inclination_deg: 98.18,
            state_vector_interval_s: 10.0,
            orbit_margin_s: 60.0,
            radar_frequency: 5.405e9,
            azimuth_time_interval_us: 2055.556,
            near_range_time: 5.44e-3,
            range_sampling_rate: 64.345238e6,
            range_pixel_spacing: 2.329562,
            number_of_lines: 1500,
            number_of_samples: 20_000,
            burst_count: 0,
            lines_per_burst: 0,
            invalid_leading_lines: 0,
            invalid_trailing_lines: 0,
        };

        match mode {
            MockMode::Slc => {}
            MockMode::Iw => {
                mock.burst_count = 3;
                mock.lines_per_burst = 400;
                mock.invalid_leading_lines = 20;
                mock.invalid_trailing_lines = 25;
                mock.number_of_lines = mock.burst_count * mock.lines_per_burst;
            }
            MockMode::Grd => {
                mock.range_pixel_spacing = 10.0;
                mock.number_of_samples = 10_000;
            }
        }

        mock
    }

    fn inclination(&self) -> f64 {
        self.inclination_deg.to_radians()
    }

    /// Unit normal of the orbital plane
    fn orbit_normal(&self) -> [f64; 3] {
        let inclination = self.inclination();
        [0.0, -inclination.sin(), inclination.cos()]
    }

    /// Analytic sensor state `seconds` after the acquisition start
    pub fn sensor_state(&self, seconds: f64) -> SensorState {
        let inclination = self.inclination();
        let angle = (seconds / self.orbit_period) * 2.0 * PI;

        // Position in orbital plane, then rotation about the x axis
        let x_orbit = self.orbit_radius * angle.cos();
        let y_orbit = self.orbit_radius * angle.sin();

        let orbital_velocity = 2.0 * PI * self.orbit_radius / self.orbit_period;

        SensorState {
            position: [x_orbit, y_orbit * inclination.cos(), y_orbit * inclination.sin()],
            velocity: [
                -orbital_velocity * angle.sin(),
                orbital_velocity * angle.cos() * inclination.cos(),
                orbital_velocity * angle.cos() * inclination.sin(),
            ],
        }
    }

    fn valid_lines_per_burst(&self) -> usize {
        self.lines_per_burst
            .saturating_sub(self.invalid_leading_lines)
            .saturating_sub(self.invalid_trailing_lines)
    }

    /// Reject layouts that leave no image or no valid burst lines
    fn check_layout(&self) -> SarResult<()> {
        if self.number_of_lines == 0 || self.number_of_samples == 0 {
            return Err(SarError::InvalidInput(format!(
                "Mock image size {}x{} is empty",
                self.number_of_lines, self.number_of_samples
            )));
        }
        if !(self.azimuth_time_interval_us > 0.0) {
            return Err(SarError::InvalidInput(format!(
                "Azimuth time interval must be positive, got {} us",
                self.azimuth_time_interval_us
            )));
        }
        if self.mode == MockMode::Iw {
            if self.burst_count == 0 {
                return Err(SarError::InvalidInput(
                    "IW mock needs at least one burst".to_string(),
                ));
            }
            if self.invalid_leading_lines + self.invalid_trailing_lines >= self.lines_per_burst {
                return Err(SarError::InvalidInput(format!(
                    "{} invalid leading and {} trailing lines leave nothing of a {}-line burst",
                    self.invalid_leading_lines, self.invalid_trailing_lines, self.lines_per_burst
                )));
            }
        }
        Ok(())
    }

    fn burst_timings(&self) -> SarResult<Vec<BurstTiming>> {
        let valid = self.valid_lines_per_burst();

        (0..self.burst_count)
            .map(|k| -> SarResult<BurstTiming> {
                let mask = (0..self.lines_per_burst)
                    .map(|line| {
                        if line < self.invalid_leading_lines
                            || line >= self.lines_per_burst - self.invalid_trailing_lines
                        {
                            -1
                        } else {
                            128
                        }
                    })
                    .collect();

                // Consecutive valid windows abut in time
                Ok(BurstTiming {
                    azimuth_time: offset_by_microseconds(
                        self.start_time,
                        (k * valid) as f64 * self.azimuth_time_interval_us,
                    )?,
                    first_valid_sample: mask,
                })
            })
            .collect()
    }

    /// Slant range to ground range along the spherical surface, from the nadir
    fn arc_ground_range(&self, slant_range: f64) -> f64 {
        let r = self.orbit_radius;
        let rg = self.earth_radius;
        let cos_beta = (r * r + rg * rg - slant_range * slant_range) / (2.0 * r * rg);
        rg * cos_beta.clamp(-1.0, 1.0).acos()
    }

    fn arc_slant_range(&self, ground_range: f64) -> f64 {
        let r = self.orbit_radius;
        let rg = self.earth_radius;
        (r * r + rg * rg - 2.0 * r * rg * (ground_range / rg).cos()).sqrt()
    }

    /// Least-squares polynomial for ground range (from near range) as a function of slant range
    fn fit_srgr_coefficients(&self) -> SarResult<(f64, Vec<f64>)> {
        let sr0 = self.near_range_time * SPEED_OF_LIGHT / 2.0;
        let near_ground = self.arc_ground_range(sr0);
        let far_ground = near_ground + self.number_of_samples as f64 * self.range_pixel_spacing;
        let span = (self.arc_slant_range(far_ground) - sr0) * 1.05;

        // Fit in the scaled variable u = (sr - sr0) / span, u in [0, 1]
        let u: Vec<f64> = (0..SRGR_FIT_POINTS)
            .map(|j| j as f64 / (SRGR_FIT_POINTS - 1) as f64)
            .collect();
        let design = DMatrix::from_fn(SRGR_FIT_POINTS, SRGR_FIT_DEGREE + 1, |i, j| u[i].powi(j as i32));
        let target = DVector::from_iterator(
            SRGR_FIT_POINTS,
            u.iter().map(|&ui| self.arc_ground_range(sr0 + ui * span) - near_ground),
        );

        let solution = design
            .svd(true, true)
            .solve(&target, 1e-14)
            .map_err(|e| SarError::Processing(format!("SRGR fit failed: {}", e)))?;

        let coefficients = solution
            .iter()
            .enumerate()
            .map(|(i, a)| a / span.powi(i as i32))
            .collect();

        Ok((sr0, coefficients))
    }

    fn duration_us(&self) -> f64 {
        if self.mode == MockMode::Iw {
            (self.burst_count * self.valid_lines_per_burst() + self.invalid_leading_lines) as f64
                * self.azimuth_time_interval_us
        } else {
            self.number_of_lines as f64 * self.azimuth_time_interval_us
        }
    }

    fn orbit(&self) -> SarResult<Vec<StateVector>> {
        let first = -self.orbit_margin_s;
        let last = self.duration_us() / 1e6 + self.orbit_margin_s;
        let count = ((last - first) / self.state_vector_interval_s).ceil() as usize + 1;

        (0..count)
            .map(|i| -> SarResult<StateVector> {
                let seconds = first + i as f64 * self.state_vector_interval_s;
                let state = self.sensor_state(seconds);
                Ok(StateVector {
                    time: offset_by_microseconds(self.start_time, (seconds * 1000.0).round() * 1000.0)?,
                    position: state.position,
                    velocity: state.velocity,
                })
            })
            .collect()
    }

    /// Product geometry of the synthetic acquisition (no GCPs)
    pub fn context(&self) -> SarResult<GeometryContext> {
        self.check_layout()?;

        let bursts = if self.mode == MockMode::Iw {
            build_burst_records(
                &self.burst_timings()?,
                self.lines_per_burst as u64,
                self.azimuth_time_interval_us,
            )?
        } else {
            Vec::new()
        };

        let srgr_records = if self.mode == MockMode::Grd {
            let (sr0, coefficients) = self.fit_srgr_coefficients()?;
            let half = self.duration_us() / 2.0;
            [0.0, half, 2.0 * half]
                .iter()
                .map(|&offset| {
                    Ok(SrgrRecord {
                        azimuth_time: offset_by_microseconds(self.start_time, offset)?,
                        sr0,
                        coefficients: coefficients.clone(),
                    })
                })
                .collect::<SarResult<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(GeometryContext {
            radar_frequency: self.radar_frequency,
            acquisition_start_time: self.start_time,
            acquisition_stop_time: Some(offset_by_microseconds(self.start_time, self.duration_us())?),
            azimuth_time_interval_us: self.azimuth_time_interval_us,
            near_range_time: self.near_range_time,
            range_sampling_rate: self.range_sampling_rate,
            range_pixel_spacing: self.range_pixel_spacing,
            number_of_lines: Some(self.number_of_lines),
            number_of_samples: Some(self.number_of_samples),
            orbit: self.orbit()?,
            bursts,
            srgr_records,
            grsr_records: Vec::new(),
        })
    }

    /// Ground point (ECEF) at `slant_range` on the zero-Doppler plane of `sensor`
    fn zero_doppler_ground(&self, sensor: &SensorState, slant_range: f64) -> SarResult<[f64; 3]> {
        let r = norm(&sensor.position);
        let rg = self.earth_radius;
        let cos_beta = (r * r + rg * rg - slant_range * slant_range) / (2.0 * r * rg);
        if !(-1.0..=1.0).contains(&cos_beta) {
            return Err(SarError::InvalidInput(format!(
                "Slant range {:.1} m does not reach the ground",
                slant_range
            )));
        }
        let sin_beta = (1.0 - cos_beta * cos_beta).sqrt();

        let radial = scale(&sensor.position, rg * cos_beta / r);
        let across = scale(&self.orbit_normal(), rg * sin_beta);
        Ok(add(&radial, &across))
    }

    fn project_with(
        &self,
        context: &GeometryContext,
        line: f64,
        sample: f64,
    ) -> SarResult<(PixelTiming, [f64; 3])> {
        let locator = InverseLocator::new(context).with_config(LocatorConfig::default());
        let (azimuth_time, slant_range_time) = locator.line_sample_to_azimuth_range_time(line, sample)?;

        let seconds = microseconds_between(azimuth_time, self.start_time) / 1e6;
        let sensor = self.sensor_state(seconds);
        let ground = self.zero_doppler_ground(&sensor, slant_range_time * SPEED_OF_LIGHT / 2.0)?;

        Ok((
            PixelTiming {
                azimuth_time,
                slant_range_time,
            },
            ground,
        ))
    }

    /// Ground point (ECEF) imaged at a fractional pixel
    pub fn project(&self, line: f64, sample: f64) -> SarResult<[f64; 3]> {
        let context = self.context()?;
        self.project_with(&context, line, sample).map(|(_, ground)| ground)
    }

    /// Image lines of a GCP grid with `rows` rows, inside valid burst windows for IW
    fn gcp_lines(&self, rows: usize) -> Vec<f64> {
        let fraction = |r: usize| r as f64 / (rows - 1) as f64;

        if self.mode != MockMode::Iw {
            let last = (self.number_of_lines - 1) as f64;
            return (0..rows).map(|r| fraction(r) * last).collect();
        }

        let valid = self.valid_lines_per_burst() as f64;
        let total = valid * self.burst_count as f64;
        (0..rows)
            .map(|r| {
                let v = fraction(r) * (total - 1.0);
                let burst = ((v / valid).floor() as usize).min(self.burst_count - 1);
                let within = v - burst as f64 * valid;
                (burst * self.lines_per_burst + self.invalid_leading_lines) as f64 + within
            })
            .collect()
    }

    /// Synthetic product with a `grid x grid` set of exact GCPs
    pub fn product(&self, grid: usize) -> SarResult<ProductGeometry> {
        if grid < 2 {
            return Err(SarError::InvalidInput(format!(
                "GCP grid needs at least 2 points per axis, got {}",
                grid
            )));
        }

        let context = self.context()?;
        let last_sample = (self.number_of_samples - 1) as f64;
        let mut gcps = Vec::with_capacity(grid * grid);

        for line in self.gcp_lines(grid) {
            for c in 0..grid {
                let sample = c as f64 / (grid - 1) as f64 * last_sample;
                let (times, ground) = self.project_with(&context, line, sample)?;
                gcps.push(GroundControlPoint {
                    azimuth_time: times.azimuth_time,
                    slant_range_time: times.slant_range_time,
                    image_point: ImagePoint { line, sample },
                    ground_point: ecef_to_geodetic(&ground),
                });
            }
        }

        log::info!(
            "Created mock {:?} product: {} lines, {} samples, {} state vectors, {} GCPs",
            self.mode,
            self.number_of_lines,
            self.number_of_samples,
            context.orbit.len(),
            gcps.len()
        );

        Ok(ProductGeometry {
            context,
            ground_control_points: gcps,
            locator_config: LocatorConfig::default(),
        })
    }
}

struct PixelTiming {
    azimuth_time: DateTime<Utc>,
    slant_range_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::doppler::doppler_frequency;
    use crate::core::geodesy::{distance, dot, sub};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("SLC".parse::<MockMode>().unwrap(), MockMode::Slc);
        assert_eq!("iw".parse::<MockMode>().unwrap(), MockMode::Iw);
        assert!("sm".parse::<MockMode>().is_err());
    }

    #[test]
    fn test_sensor_state_is_circular() {
        let mock = MockAcquisition::new(MockMode::Slc);
        for seconds in [-60.0, 0.0, 17.3, 600.0] {
            let state = mock.sensor_state(seconds);
            assert_abs_diff_eq!(norm(&state.position), mock.orbit_radius, epsilon = 1e-6);
            assert_abs_diff_eq!(dot(&state.position, &state.velocity), 0.0, epsilon = 1e-3);
            assert_abs_diff_eq!(dot(&state.velocity, &mock.orbit_normal()), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_projected_point_is_zero_doppler() {
        let mock = MockAcquisition::new(MockMode::Slc);
        let sensor = mock.sensor_state(1.5);
        let ground = mock.zero_doppler_ground(&sensor, 850_000.0).unwrap();

        assert_abs_diff_eq!(norm(&ground), mock.earth_radius, epsilon = 1e-6);
        assert_abs_diff_eq!(distance(&ground, &sensor.position), 850_000.0, epsilon = 1e-6);
        let doppler = doppler_frequency(1.0, &sensor.velocity, &sensor.position, &ground);
        assert!(doppler.abs() / (2.0 * norm(&sensor.velocity) * norm(&sub(&ground, &sensor.position))) < 1e-12);

        assert!(mock.zero_doppler_ground(&sensor, 100_000.0).is_err());
    }

    #[test]
    fn test_contexts_validate() {
        for mode in [MockMode::Slc, MockMode::Iw, MockMode::Grd] {
            let context = MockAcquisition::new(mode).context().unwrap();
            context.validate().unwrap();
            assert_eq!(context.has_bursts(), mode == MockMode::Iw);
            assert_eq!(context.is_ground_range(), mode == MockMode::Grd);
        }
    }

    #[test]
    fn test_iw_bursts_and_gcp_lines() {
        let mock = MockAcquisition::new(MockMode::Iw);
        let context = mock.context().unwrap();
        assert_eq!(context.bursts.len(), 3);
        assert_eq!(context.bursts[1].first_valid_line, 420);
        assert_eq!(context.bursts[1].last_valid_line, 775);

        for line in mock.gcp_lines(5) {
            assert!(context
                .bursts
                .iter()
                .any(|b| b.first_valid_line as f64 <= line && line < b.last_valid_line as f64));
        }
    }

    #[test]
    fn test_context_rejects_empty_layouts() {
        let mut mock = MockAcquisition::new(MockMode::Iw);
        mock.invalid_leading_lines = 500;
        assert!(matches!(mock.context(), Err(SarError::InvalidInput(_))));
        assert!(matches!(mock.product(3), Err(SarError::InvalidInput(_))));

        let mut mock = MockAcquisition::new(MockMode::Iw);
        mock.burst_count = 0;
        assert!(matches!(mock.context(), Err(SarError::InvalidInput(_))));

        let mut mock = MockAcquisition::new(MockMode::Slc);
        mock.number_of_samples = 0;
        assert!(matches!(mock.context(), Err(SarError::InvalidInput(_))));
    }

    #[test]
    fn test_srgr_fit_matches_arc_length() {
        let mock = MockAcquisition::new(MockMode::Grd);
        let (sr0, coefficients) = mock.fit_srgr_coefficients().unwrap();
        let near_ground = mock.arc_ground_range(sr0);

        for offset in [0.0, 20_000.0, 45_000.0] {
            let slant = sr0 + offset;
            let fitted = crate::core::srgr::evaluate_polynomial(slant, sr0, &coefficients);
            assert_abs_diff_eq!(fitted, mock.arc_ground_range(slant) - near_ground, epsilon = 1e-2);
        }
    }
}
