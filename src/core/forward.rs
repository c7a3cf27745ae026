//! Forward location: image (line, sample) and height to ground point
//!
//! The inverse model is inverted numerically. Starting from the ground control
//! point closest in image space, the ECEF estimate is updated by Newton steps on
//! (sample, line, height) using a finite-difference Jacobian.

use crate::core::geodesy::{ecef_to_geodetic, geodetic_to_ecef};
use crate::core::inverse_locator::InverseLocator;
use crate::types::{GroundControlPoint, GroundPoint, ImagePoint, SarError, SarResult};
use nalgebra::{Matrix3, Vector3};

/// ECEF offset used for the partial derivatives (meters)
const DERIVATIVE_STEP_M: f64 = 10.0;
const MAX_ITERATIONS: usize = 50;
const IMAGE_TOLERANCE_PX: f64 = 0.01;
const HEIGHT_TOLERANCE_M: f64 = 0.01;

/// Image-to-ground solver seeded by ground control points
#[derive(Debug, Clone)]
pub struct ForwardLocator<'a> {
    locator: InverseLocator<'a>,
    gcps: &'a [GroundControlPoint],
}

impl<'a> ForwardLocator<'a> {
    /// Forward model refined by the inverse locator, seeded from the given GCP grid
    pub fn new(locator: InverseLocator<'a>, gcps: &'a [GroundControlPoint]) -> Self {
        Self { locator, gcps }
    }

    /// Ground control point closest to `target` in image space
    pub fn closest_gcp(&self, target: &ImagePoint) -> Option<&'a GroundControlPoint> {
        self.gcps.iter().min_by(|a, b| {
            square_distance(&a.image_point, target).total_cmp(&square_distance(&b.image_point, target))
        })
    }

    /// Ground point imaged at `target` with the given ellipsoidal height.
    ///
    /// A NaN height uses the height of the seed GCP.
    pub fn line_sample_height_to_world(&self, target: &ImagePoint, height: f64) -> SarResult<GroundPoint> {
        let seed = self.closest_gcp(target).ok_or_else(|| {
            SarError::Processing("No ground control points available to seed forward location".to_string())
        })?;

        let reference_height = if height.is_nan() {
            seed.ground_point.height
        } else {
            height
        };

        let mut estimate = geodetic_to_ecef(&seed.ground_point);
        let mut estimate_geo = seed.ground_point;
        let mut current = self.locator.locate_ecef(&estimate)?.image_point();
        let mut image_residual = square_distance(&current, target);
        let mut height_residual = reference_height - estimate_geo.height;

        let mut iteration = 0;
        while iteration < MAX_ITERATIONS
            && (iteration == 0
                || image_residual > IMAGE_TOLERANCE_PX * IMAGE_TOLERANCE_PX
                || height_residual.abs() > HEIGHT_TOLERANCE_M)
        {
            let residuals = Vector3::new(
                target.sample - current.sample,
                target.line - current.line,
                height_residual,
            );

            // Rows: sample, line, height; columns: ECEF x, y, z
            let mut jacobian = Matrix3::zeros();
            for axis in 0..3 {
                let mut shifted = estimate;
                shifted[axis] += DERIVATIVE_STEP_M;

                let shifted_image = self.locator.locate_ecef(&shifted)?.image_point();
                let shifted_height = ecef_to_geodetic(&shifted).height;

                jacobian[(0, axis)] = (current.sample - shifted_image.sample) / DERIVATIVE_STEP_M;
                jacobian[(1, axis)] = (current.line - shifted_image.line) / DERIVATIVE_STEP_M;
                jacobian[(2, axis)] = (estimate_geo.height - shifted_height) / DERIVATIVE_STEP_M;
            }

            let Some(inverse) = jacobian.try_inverse() else {
                log::warn!(
                    "Singular matrix at iteration {} for image point ({:.3}, {:.3}), returning best estimate",
                    iteration,
                    target.line,
                    target.sample
                );
                return Ok(estimate_geo);
            };

            let step = inverse * residuals;
            for k in 0..3 {
                estimate[k] -= step[k];
            }

            estimate_geo = ecef_to_geodetic(&estimate);
            height_residual = reference_height - estimate_geo.height;
            current = self.locator.locate_ecef(&estimate)?.image_point();
            image_residual = square_distance(&current, target);

            iteration += 1;
        }

        log::debug!(
            "Forward location of ({:.3}, {:.3}) after {} iterations: image residual {:.2e} px, height residual {:.2e} m",
            target.line,
            target.sample,
            iteration,
            image_residual.sqrt(),
            height_residual
        );

        Ok(estimate_geo)
    }
}

fn square_distance(a: &ImagePoint, b: &ImagePoint) -> f64 {
    (a.line - b.line).powi(2) + (a.sample - b.sample).powi(2)
}
