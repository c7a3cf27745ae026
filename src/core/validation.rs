//! Ground control point residuals for the inverse and forward models

use crate::core::burst::BurstLineMapper;
use crate::core::forward::ForwardLocator;
use crate::core::geodesy::{distance, geodetic_to_ecef};
use crate::core::inverse_locator::{InverseLocator, LocatedPoint, LocatorConfig};
use crate::types::{
    microseconds_between, GroundControlPoint, GroundPoint, ImagePoint, SarError, SarResult,
};
use serde::{Deserialize, Serialize};

/// Residuals of one GCP, reference minus estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpResidual {
    pub index: usize,
    pub reference: ImagePoint,
    pub estimate: LocatedPoint,
    pub line: f64,
    pub sample: f64,
    pub azimuth_time_us: f64,
    pub slant_range_time: f64,
}

/// GCP that could not be located
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpFailure {
    pub index: usize,
    pub reason: String,
}

/// Per-quantity residual statistics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResidualStatistics {
    pub mean: f64,
    pub rms: f64,
    pub max_abs: f64,
}

impl ResidualStatistics {
    fn from_values(values: impl Iterator<Item = f64>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut max_abs: f64 = 0.0;

        for value in values {
            count += 1;
            sum += value;
            sum_sq += value * value;
            max_abs = max_abs.max(value.abs());
        }

        if count == 0 {
            return Self::default();
        }

        Self {
            mean: sum / count as f64,
            rms: (sum_sq / count as f64).sqrt(),
            max_abs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualSummary {
    pub located: usize,
    pub failed: usize,
    pub line: ResidualStatistics,
    pub sample: ResidualStatistics,
    pub azimuth_time_us: ResidualStatistics,
    pub slant_range_time: ResidualStatistics,
}

/// Acceptance thresholds, applied by callers through `ValidationReport::within`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualTolerance {
    pub line: f64,               // pixels
    pub sample: f64,             // pixels
    pub azimuth_time_us: f64,    // microseconds
    pub slant_range_time: f64,   // seconds
}

impl Default for ResidualTolerance {
    fn default() -> Self {
        Self {
            line: 1.0,
            sample: 1.0,
            azimuth_time_us: 500.0,
            slant_range_time: 1e-8,
        }
    }
}

/// Outcome of an inverse-model validation run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub residuals: Vec<GcpResidual>,
    pub failures: Vec<GcpFailure>,
}

impl ValidationReport {
    pub fn summary(&self) -> ResidualSummary {
        ResidualSummary {
            located: self.residuals.len(),
            failed: self.failures.len(),
            line: ResidualStatistics::from_values(self.residuals.iter().map(|r| r.line)),
            sample: ResidualStatistics::from_values(self.residuals.iter().map(|r| r.sample)),
            azimuth_time_us: ResidualStatistics::from_values(
                self.residuals.iter().map(|r| r.azimuth_time_us),
            ),
            slant_range_time: ResidualStatistics::from_values(
                self.residuals.iter().map(|r| r.slant_range_time),
            ),
        }
    }

    /// True when every GCP was located and every residual is within tolerance
    pub fn within(&self, tolerance: &ResidualTolerance) -> bool {
        self.failures.is_empty()
            && self.residuals.iter().all(|r| {
                r.line.abs() <= tolerance.line
                    && r.sample.abs() <= tolerance.sample
                    && r.azimuth_time_us.abs() <= tolerance.azimuth_time_us
                    && r.slant_range_time.abs() <= tolerance.slant_range_time
            })
    }
}

/// Mean timing residuals of an offset-free locator, usable as its configured offsets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeOffsets {
    pub azimuth_time_us: f64,
    pub range_time: f64,
    pub samples_used: usize,
}

impl TimeOffsets {
    /// Locator configuration with these offsets applied
    pub fn apply_to(&self, config: &LocatorConfig) -> LocatorConfig {
        LocatorConfig {
            azimuth_time_offset_us: self.azimuth_time_us,
            range_time_offset: self.range_time,
            ..config.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardResidual {
    pub index: usize,
    pub reference: GroundPoint,
    pub estimate: GroundPoint,
    pub distance_m: f64,
}

/// Outcome of a forward-model validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardReport {
    pub tolerance_m: f64,
    pub residuals: Vec<ForwardResidual>,
    pub failures: Vec<GcpFailure>,
}

impl ForwardReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
            && self
                .residuals
                .iter()
                .all(|r| r.distance_m.is_finite() && r.distance_m <= self.tolerance_m)
    }

    pub fn max_distance_m(&self) -> f64 {
        self.residuals.iter().map(|r| r.distance_m).fold(0.0, f64::max)
    }
}

/// Compares located GCPs against their annotated image position and timing
pub struct ResidualValidator<'a> {
    locator: &'a InverseLocator<'a>,
    recompute_burst_lines: bool,
}

impl<'a> ResidualValidator<'a> {
    /// Validator using `locator` as is; burst lines are recomputed from GCP times
    pub fn new(locator: &'a InverseLocator<'a>) -> Self {
        Self {
            locator,
            recompute_burst_lines: true,
        }
    }

    /// Derive reference lines of burst products from the GCP azimuth time (default on)
    pub fn with_burst_line_recompute(mut self, enabled: bool) -> Self {
        self.recompute_burst_lines = enabled;
        self
    }

    /// Reference image position of a GCP in the locator's line convention
    pub fn reference_image_point(&self, gcp: &GroundControlPoint) -> SarResult<ImagePoint> {
        let context = self.locator.context();
        if !(self.recompute_burst_lines && context.has_bursts()) {
            return Ok(gcp.image_point);
        }

        let mapper = BurstLineMapper::from_context(context, self.locator.config().burst_anchor);
        Ok(ImagePoint {
            line: mapper.time_to_line(gcp.azimuth_time)?,
            sample: gcp.image_point.sample,
        })
    }

    fn residual(&self, index: usize, gcp: &GroundControlPoint) -> SarResult<GcpResidual> {
        let reference = self.reference_image_point(gcp)?;
        let estimate = self.locator.locate(&gcp.ground_point)?;

        Ok(GcpResidual {
            index,
            reference,
            line: reference.line - estimate.line,
            sample: reference.sample - estimate.sample,
            azimuth_time_us: microseconds_between(gcp.azimuth_time, estimate.azimuth_time),
            slant_range_time: gcp.slant_range_time - estimate.slant_range_time,
            estimate,
        })
    }

    /// Locate every GCP and collect residuals; failures do not stop the run
    pub fn validate(&self, gcps: &[GroundControlPoint]) -> ValidationReport {
        log::info!("Validating inverse model against {} GCPs", gcps.len());

        #[cfg(feature = "parallel")]
        let outcomes: Vec<SarResult<GcpResidual>> = {
            use rayon::prelude::*;
            gcps.par_iter()
                .enumerate()
                .map(|(i, gcp)| self.residual(i, gcp))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<SarResult<GcpResidual>> = gcps
            .iter()
            .enumerate()
            .map(|(i, gcp)| self.residual(i, gcp))
            .collect();

        let mut report = ValidationReport::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(residual) => report.residuals.push(residual),
                Err(e) => {
                    log::warn!("GCP #{} could not be located: {}", index, e);
                    report.failures.push(GcpFailure {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let summary = report.summary();
        log::info!(
            "GCP residuals: {} located, {} failed, max |line| {:.4}, max |sample| {:.4}, max |az| {:.1} us",
            summary.located,
            summary.failed,
            summary.line.max_abs,
            summary.sample.max_abs,
            summary.azimuth_time_us.max_abs
        );

        report
    }

    /// Mean azimuth and range time residuals with the locator's offsets reset to zero
    pub fn estimate_time_offsets(&self, gcps: &[GroundControlPoint]) -> SarResult<TimeOffsets> {
        let config = LocatorConfig {
            azimuth_time_offset_us: 0.0,
            range_time_offset: 0.0,
            ..self.locator.config().clone()
        };
        let base = InverseLocator::new(self.locator.context()).with_config(config);

        let mut azimuth_sum = 0.0;
        let mut range_sum = 0.0;
        let mut count = 0usize;

        for gcp in gcps {
            match base.locate(&gcp.ground_point) {
                Ok(located) => {
                    azimuth_sum += microseconds_between(gcp.azimuth_time, located.azimuth_time);
                    range_sum += gcp.slant_range_time - located.slant_range_time;
                    count += 1;
                }
                Err(e) => log::debug!("Skipping GCP for offset estimation: {}", e),
            }
        }

        if count == 0 {
            return Err(SarError::Processing(
                "No locatable GCP to estimate time offsets".to_string(),
            ));
        }

        let offsets = TimeOffsets {
            azimuth_time_us: azimuth_sum / count as f64,
            range_time: range_sum / count as f64,
            samples_used: count,
        };
        log::info!(
            "Estimated time offsets from {} GCPs: azimuth {:.3} us, range {:.3e} s",
            count,
            offsets.azimuth_time_us,
            offsets.range_time
        );
        Ok(offsets)
    }

    /// Forward-model check: even-indexed GCPs seed the solver, odd-indexed ones are checked
    pub fn validate_forward(&self, gcps: &[GroundControlPoint], tolerance_m: f64) -> SarResult<ForwardReport> {
        if gcps.len() < 2 {
            return Err(SarError::Processing(format!(
                "Forward validation needs at least 2 GCPs, got {}",
                gcps.len()
            )));
        }

        let mut seeds = Vec::with_capacity(gcps.len() / 2 + 1);
        let mut checks = Vec::with_capacity(gcps.len() / 2);
        for (index, gcp) in gcps.iter().enumerate() {
            let mut gcp = gcp.clone();
            gcp.image_point = self.reference_image_point(&gcp)?;
            if index % 2 == 0 {
                seeds.push(gcp);
            } else {
                checks.push((index, gcp));
            }
        }

        let forward = ForwardLocator::new(self.locator.clone(), &seeds);
        let mut report = ForwardReport {
            tolerance_m,
            residuals: Vec::with_capacity(checks.len()),
            failures: Vec::new(),
        };

        for (index, gcp) in &checks {
            match forward.line_sample_height_to_world(&gcp.image_point, gcp.ground_point.height) {
                Ok(estimate) => {
                    let distance_m = distance(
                        &geodetic_to_ecef(&gcp.ground_point),
                        &geodetic_to_ecef(&estimate),
                    );
                    if distance_m > tolerance_m {
                        log::warn!("GCP #{} forward residual {:.3} m", index, distance_m);
                    }
                    report.residuals.push(ForwardResidual {
                        index: *index,
                        reference: gcp.ground_point,
                        estimate,
                        distance_m,
                    });
                }
                Err(e) => report.failures.push(GcpFailure {
                    index: *index,
                    reason: e.to_string(),
                }),
            }
        }

        log::info!(
            "Forward validation: {} checks, max residual {:.3} m",
            report.residuals.len(),
            report.max_distance_m()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::{MockAcquisition, MockMode};

    #[test]
    fn test_statistics() {
        let stats = ResidualStatistics::from_values([1.0, -3.0, 2.0].into_iter());
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.max_abs, 3.0);
        assert!((stats.rms - (14.0f64 / 3.0).sqrt()).abs() < 1e-12);

        assert_eq!(ResidualStatistics::from_values(std::iter::empty()), ResidualStatistics::default());
    }

    #[test]
    fn test_failures_are_recorded_and_run_continues() {
        let product = MockAcquisition::new(MockMode::Slc).product(3).unwrap();
        let mut gcps = product.ground_control_points.clone();

        // Far along track: the Doppler sign never changes along this orbit arc
        let mut bad = gcps[0].clone();
        bad.ground_point = GroundPoint {
            latitude: gcps[0].ground_point.latitude + 30.0,
            longitude: gcps[0].ground_point.longitude,
            height: 0.0,
        };
        gcps.insert(1, bad);

        let locator = InverseLocator::new(&product.context);
        let report = ResidualValidator::new(&locator).validate(&gcps);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.residuals.len(), gcps.len() - 1);
        assert!(!report.within(&ResidualTolerance::default()));
    }

    #[test]
    fn test_burst_lines_recomputed_from_azimuth_time() {
        let product = MockAcquisition::new(MockMode::Iw).product(3).unwrap();
        let locator = InverseLocator::new(&product.context);

        let mut gcp = product.ground_control_points[4].clone();
        let true_line = gcp.image_point.line;
        gcp.image_point.line -= 1000.0;

        let validator = ResidualValidator::new(&locator);
        let reference = validator.reference_image_point(&gcp).unwrap();
        assert!((reference.line - true_line).abs() < 1e-3);

        let raw = ResidualValidator::new(&locator).with_burst_line_recompute(false);
        assert_eq!(raw.reference_image_point(&gcp).unwrap().line, true_line - 1000.0);
    }

    #[test]
    fn test_forward_validation_needs_two_gcps() {
        let product = MockAcquisition::new(MockMode::Slc).product(3).unwrap();
        let locator = InverseLocator::new(&product.context);
        let validator = ResidualValidator::new(&locator);

        assert!(matches!(
            validator.validate_forward(&product.ground_control_points[..1], 1.0),
            Err(SarError::Processing(_))
        ));
    }
}
