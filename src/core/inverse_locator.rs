//! Inverse location: ground point (lat/lon/height) to image (line, sample)
//!
//! Pipeline per point: geodetic to ECEF, zero-Doppler search along the orbit,
//! azimuth time to line through the burst mapper, then slant range to sample
//! (directly for SLC products, through the SRGR polynomial for GRD products).

use crate::core::burst::{BurstAnchor, BurstLineMapper};
use crate::core::geodesy::{distance, geodetic_to_ecef};
use crate::core::orbit::{SensorState, DEFAULT_INTERPOLATION_DEGREE};
use crate::core::srgr::{ground_range_to_slant_range, slant_range_to_ground_range};
use crate::core::zero_doppler::{BistaticCorrection, ZeroDopplerSearch};
use crate::types::{
    GeometryContext, GroundPoint, ImagePoint, SarError, SarResult, SPEED_OF_LIGHT,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for the inverse location solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub interpolation_degree: usize,          // State vectors per Lagrange window
    pub bistatic_correction: BistaticCorrection,
    pub burst_anchor: BurstAnchor,
    pub azimuth_time_offset_us: f64,          // Added to every zero-Doppler time
    pub range_time_offset: f64,               // Added to every two-way slant range time (s)
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            interpolation_degree: DEFAULT_INTERPOLATION_DEGREE,
            bistatic_correction: BistaticCorrection::Disabled,  // S1 products are already corrected
            burst_anchor: BurstAnchor::FirstValid,
            azimuth_time_offset_us: 0.0,
            range_time_offset: 0.0,
        }
    }
}

/// Image position of a ground point plus the geometry it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedPoint {
    pub line: f64,
    pub sample: f64,
    pub azimuth_time: DateTime<Utc>,
    pub slant_range_time: f64,  // two-way, seconds
    pub slant_range: f64,       // meters
    pub sensor: SensorState,
}

impl LocatedPoint {
    pub fn image_point(&self) -> ImagePoint {
        ImagePoint {
            line: self.line,
            sample: self.sample,
        }
    }
}

/// Inverse location solver borrowing a product geometry
#[derive(Debug, Clone)]
pub struct InverseLocator<'a> {
    context: &'a GeometryContext,
    config: LocatorConfig,
}

impl<'a> InverseLocator<'a> {
    /// Solver with the default configuration
    pub fn new(context: &'a GeometryContext) -> Self {
        Self {
            context,
            config: LocatorConfig::default(),
        }
    }

    /// Replace the whole configuration (degree, corrections, anchor and time offsets)
    pub fn with_config(mut self, config: LocatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn context(&self) -> &'a GeometryContext {
        self.context
    }

    fn burst_mapper(&self) -> BurstLineMapper<'a> {
        BurstLineMapper::from_context(self.context, self.config.burst_anchor)
    }

    /// Image position of a geodetic ground point
    pub fn locate(&self, ground_point: &GroundPoint) -> SarResult<LocatedPoint> {
        self.locate_ecef(&geodetic_to_ecef(ground_point))
    }

    /// Image position of an ECEF ground point
    pub fn locate_ecef(&self, ground: &[f64; 3]) -> SarResult<LocatedPoint> {
        let ctx = self.context;
        if !(ctx.radar_frequency > 0.0) {
            return Err(SarError::InvalidInput(format!(
                "Radar frequency must be positive, got {} Hz",
                ctx.radar_frequency
            )));
        }

        let solution = ZeroDopplerSearch::new(&ctx.orbit, ctx.radar_frequency)
            .with_degree(self.config.interpolation_degree)
            .with_bistatic_correction(self.config.bistatic_correction)
            .with_azimuth_time_offset(self.config.azimuth_time_offset_us)
            .solve(ground)?;

        let line = self.burst_mapper().time_to_line(solution.azimuth_time)?;

        // Range offset applies to both the distance and the time
        let range = distance(&solution.sensor.position, ground);
        let slant_range_time = 2.0 * range / SPEED_OF_LIGHT + self.config.range_time_offset;
        let slant_range = range + self.config.range_time_offset * SPEED_OF_LIGHT / 2.0;

        let sample = self.range_to_sample(slant_range, slant_range_time, solution.azimuth_time)?;

        Ok(LocatedPoint {
            line,
            sample,
            azimuth_time: solution.azimuth_time,
            slant_range_time,
            slant_range,
            sensor: solution.sensor,
        })
    }

    fn range_to_sample(
        &self,
        slant_range: f64,
        slant_range_time: f64,
        azimuth_time: DateTime<Utc>,
    ) -> SarResult<f64> {
        let ctx = self.context;

        if ctx.is_ground_range() {
            if !(ctx.range_pixel_spacing > 0.0) {
                return Err(SarError::InvalidInput(format!(
                    "Range pixel spacing must be positive, got {} m",
                    ctx.range_pixel_spacing
                )));
            }
            let ground_range = slant_range_to_ground_range(slant_range, azimuth_time, &ctx.srgr_records)?;
            let near_ground_range =
                slant_range_to_ground_range(ctx.near_range_distance(), azimuth_time, &ctx.srgr_records)?;
            Ok((ground_range - near_ground_range) / ctx.range_pixel_spacing)
        } else {
            if !(ctx.range_sampling_rate > 0.0) {
                return Err(SarError::InvalidInput(format!(
                    "Range sampling rate must be positive, got {} Hz",
                    ctx.range_sampling_rate
                )));
            }
            Ok((slant_range_time - ctx.near_range_time) * ctx.range_sampling_rate)
        }
    }

    /// Locate many ground points; results keep the input order
    pub fn locate_batch(&self, ground_points: &[GroundPoint]) -> Vec<SarResult<LocatedPoint>> {
        log::info!("Locating {} ground points", ground_points.len());

        #[cfg(feature = "parallel")]
        let results = {
            use rayon::prelude::*;
            ground_points.par_iter().map(|gp| self.locate(gp)).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results = ground_points.iter().map(|gp| self.locate(gp)).collect();

        results
    }

    /// Azimuth time and two-way slant range time imaged at a fractional pixel
    pub fn line_sample_to_azimuth_range_time(
        &self,
        line: f64,
        sample: f64,
    ) -> SarResult<(DateTime<Utc>, f64)> {
        let ctx = self.context;
        let azimuth_time = self.burst_mapper().line_to_time(line)?;

        let slant_range_time = if ctx.is_ground_range() {
            let near_ground_range =
                slant_range_to_ground_range(ctx.near_range_distance(), azimuth_time, &ctx.srgr_records)?;
            let ground_range = near_ground_range + sample * ctx.range_pixel_spacing;
            let slant_range = ground_range_to_slant_range(
                ground_range,
                azimuth_time,
                &ctx.grsr_records,
                &ctx.srgr_records,
            )?;
            2.0 * slant_range / SPEED_OF_LIGHT
        } else {
            if !(ctx.range_sampling_rate > 0.0) {
                return Err(SarError::InvalidInput(format!(
                    "Range sampling rate must be positive, got {} Hz",
                    ctx.range_sampling_rate
                )));
            }
            ctx.near_range_time + sample / ctx.range_sampling_rate
        };

        Ok((azimuth_time, slant_range_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SrgrRecord, StateVector};
    use approx::assert_abs_diff_eq;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2020-01-03T17:08:15Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Sensor crossing the origin along x; range in samples equals twice the distance
    fn toy_context() -> GeometryContext {
        let orbit = [-5.0, 3.0, 7.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| StateVector {
                time: t0() + Duration::seconds(i as i64),
                position: [x, 0.0, 0.0],
                velocity: [1.0, 0.0, 0.0],
            })
            .collect();

        GeometryContext {
            radar_frequency: 0.5,
            acquisition_start_time: t0(),
            acquisition_stop_time: None,
            azimuth_time_interval_us: 1000.0,
            near_range_time: 0.0,
            range_sampling_rate: SPEED_OF_LIGHT,
            range_pixel_spacing: 1.0,
            number_of_lines: None,
            number_of_samples: None,
            orbit,
            bursts: Vec::new(),
            srgr_records: Vec::new(),
            grsr_records: Vec::new(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = LocatorConfig::default();
        assert_eq!(config.interpolation_degree, 8);
        assert_eq!(config.bistatic_correction, BistaticCorrection::Disabled);
        assert_eq!(config.burst_anchor, BurstAnchor::FirstValid);
        assert_eq!(config.azimuth_time_offset_us, 0.0);

        let partial: LocatorConfig = serde_json::from_str(r#"{"interpolation_degree": 4}"#).unwrap();
        assert_eq!(partial.interpolation_degree, 4);
        assert_eq!(partial.range_time_offset, 0.0);
    }

    #[test]
    fn test_locate_slant_range_product() {
        let context = toy_context();
        let located = InverseLocator::new(&context).locate_ecef(&[0.0, 0.0, 0.0]).unwrap();

        // x(t) = -5 + 10 t - 2 t^2 through the three records, at t = 0.625 s
        assert_eq!(located.azimuth_time, t0() + Duration::microseconds(625_000));
        assert_eq!(located.line, 625.0);
        assert_abs_diff_eq!(located.slant_range, 0.46875, epsilon = 1e-9);
        // No round trip through time
        assert_eq!(located.slant_range, distance(&located.sensor.position, &[0.0, 0.0, 0.0]));
        assert_abs_diff_eq!(located.sample, 0.9375, epsilon = 1e-9);
    }

    #[test]
    fn test_locate_ground_range_product() {
        let mut context = toy_context();
        context.near_range_time = 2.0 * 0.25 / SPEED_OF_LIGHT;
        context.range_pixel_spacing = 0.5;
        context.srgr_records = vec![SrgrRecord {
            azimuth_time: t0(),
            sr0: 0.0,
            coefficients: vec![0.0, 2.0],
        }];

        let locator = InverseLocator::new(&context);
        let located = locator.locate_ecef(&[0.0, 0.0, 0.0]).unwrap();
        // (2 * 0.46875 - 2 * 0.25) / 0.5
        assert_abs_diff_eq!(located.sample, 0.875, epsilon = 1e-9);

        let (time, srt) = locator
            .line_sample_to_azimuth_range_time(located.line, located.sample)
            .unwrap();
        assert_eq!(time, located.azimuth_time);
        assert_abs_diff_eq!(srt, located.slant_range_time, epsilon = 1e-15);
    }

    #[test]
    fn test_locate_is_idempotent() {
        let context = toy_context();
        let locator = InverseLocator::new(&context);
        let first = locator.locate_ecef(&[0.2, 0.1, 0.0]).unwrap();
        let second = locator.locate_ecef(&[0.2, 0.1, 0.0]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_range_time_offset_shifts_sample() {
        let context = toy_context();
        let config = LocatorConfig {
            range_time_offset: 2.0 / SPEED_OF_LIGHT,
            ..LocatorConfig::default()
        };
        let located = InverseLocator::new(&context)
            .with_config(config)
            .locate_ecef(&[0.0, 0.0, 0.0])
            .unwrap();
        assert_abs_diff_eq!(located.sample, 2.9375, epsilon = 1e-9);
        assert_abs_diff_eq!(located.slant_range, 1.46875, epsilon = 1e-9);
        assert_abs_diff_eq!(
            located.slant_range_time,
            2.0 * located.slant_range / SPEED_OF_LIGHT,
            epsilon = 1e-20
        );
    }

    #[test]
    fn test_out_of_range_times_are_errors() {
        let context = toy_context();
        let locator = InverseLocator::new(&context);
        assert!(matches!(
            locator.line_sample_to_azimuth_range_time(1e18, 0.0),
            Err(SarError::InvalidInput(_))
        ));

        let config = LocatorConfig {
            azimuth_time_offset_us: 1e20,
            ..LocatorConfig::default()
        };
        assert!(matches!(
            InverseLocator::new(&context).with_config(config).locate_ecef(&[0.0, 0.0, 0.0]),
            Err(SarError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_scalars_are_reported_per_call() {
        let mut context = toy_context();
        context.range_sampling_rate = 0.0;
        assert!(matches!(
            InverseLocator::new(&context).locate_ecef(&[0.0, 0.0, 0.0]),
            Err(SarError::InvalidInput(_))
        ));

        let mut context = toy_context();
        context.radar_frequency = -1.0;
        assert!(InverseLocator::new(&context).locate_ecef(&[0.0, 0.0, 0.0]).is_err());
    }
}
