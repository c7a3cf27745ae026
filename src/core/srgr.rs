//! Slant range <-> ground range conversion for ground-range (GRD) products

use crate::types::{microseconds_between, SarError, SarResult, SrgrRecord};
use chrono::{DateTime, Utc};

/// Newton tolerance when inverting the SRGR polynomial (meters)
const INVERSION_TOLERANCE_M: f64 = 1e-6;
const INVERSION_MAX_ITERATIONS: usize = 50;

/// Evaluate `sum(c[i] * (x - origin)^i)` by Horner's scheme, last coefficient first
pub fn evaluate_polynomial(x: f64, origin: f64, coefficients: &[f64]) -> f64 {
    let dx = x - origin;
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, &coef| coef + dx * acc)
}

/// Polynomial value and first derivative at `x`
fn evaluate_with_derivative(x: f64, origin: f64, coefficients: &[f64]) -> (f64, f64) {
    let dx = x - origin;
    let mut value = 0.0;
    let mut derivative = 0.0;
    for &coef in coefficients.iter().rev() {
        derivative = value + dx * derivative;
        value = coef + dx * value;
    }
    (value, derivative)
}

/// Conversion record valid at `azimuth_time`.
///
/// Outside the table the first or last record is used as is; between two
/// records the origin and each coefficient are interpolated linearly.
pub fn record_at(azimuth_time: DateTime<Utc>, records: &[SrgrRecord]) -> SarResult<SrgrRecord> {
    validate_conversion_table(records)?;

    let upper = records.partition_point(|r| r.azimuth_time <= azimuth_time);
    if upper == 0 {
        return Ok(records[0].clone());
    }
    if upper == records.len() {
        return Ok(records[upper - 1].clone());
    }

    let previous = &records[upper - 1];
    let next = &records[upper];
    let interp = microseconds_between(azimuth_time, previous.azimuth_time)
        / microseconds_between(next.azimuth_time, previous.azimuth_time);

    let sr0 = (1.0 - interp) * previous.sr0 + interp * next.sr0;
    let coefficients = previous
        .coefficients
        .iter()
        .zip(&next.coefficients)
        .map(|(p, n)| interp * n + (1.0 - interp) * p)
        .collect();

    Ok(SrgrRecord {
        azimuth_time,
        sr0,
        coefficients,
    })
}

/// Convert a slant range (meters) to ground range (meters) at an azimuth time
pub fn slant_range_to_ground_range(
    slant_range: f64,
    azimuth_time: DateTime<Utc>,
    srgr_records: &[SrgrRecord],
) -> SarResult<f64> {
    let record = record_at(azimuth_time, srgr_records)?;
    Ok(evaluate_polynomial(slant_range, record.sr0, &record.coefficients))
}

/// Convert a ground range (meters) to slant range (meters) at an azimuth time.
///
/// Uses the ground-to-slant table when there is one, otherwise inverts the
/// slant-to-ground polynomial by Newton iteration.
pub fn ground_range_to_slant_range(
    ground_range: f64,
    azimuth_time: DateTime<Utc>,
    grsr_records: &[SrgrRecord],
    srgr_records: &[SrgrRecord],
) -> SarResult<f64> {
    if !grsr_records.is_empty() {
        let record = record_at(azimuth_time, grsr_records)?;
        return Ok(evaluate_polynomial(ground_range, record.sr0, &record.coefficients));
    }

    let record = record_at(azimuth_time, srgr_records)?;
    invert_polynomial(ground_range, &record)
}

fn invert_polynomial(ground_range: f64, record: &SrgrRecord) -> SarResult<f64> {
    let coefficients = &record.coefficients;

    // Linear first guess
    let mut slant_range = match coefficients.get(1) {
        Some(&slope) if slope != 0.0 => record.sr0 + (ground_range - coefficients[0]) / slope,
        _ => record.sr0,
    };

    for iteration in 0..INVERSION_MAX_ITERATIONS {
        let (value, derivative) = evaluate_with_derivative(slant_range, record.sr0, coefficients);
        if derivative == 0.0 {
            return Err(SarError::Processing(format!(
                "SRGR polynomial has zero slope at slant range {:.3} m",
                slant_range
            )));
        }

        let step = (value - ground_range) / derivative;
        slant_range -= step;

        if step.abs() < INVERSION_TOLERANCE_M {
            log::trace!("SRGR inversion converged after {} iterations", iteration + 1);
            return Ok(slant_range);
        }
    }

    Err(SarError::Processing(format!(
        "SRGR inversion did not converge for ground range {:.3} m",
        ground_range
    )))
}

/// Reject empty tables, empty coefficient lists and unordered reference times
pub fn validate_conversion_table(records: &[SrgrRecord]) -> SarResult<()> {
    if records.is_empty() {
        return Err(SarError::InvalidSrgrTable("table is empty".to_string()));
    }

    if let Some(idx) = records.iter().position(|r| r.coefficients.is_empty()) {
        return Err(SarError::InvalidSrgrTable(format!(
            "record {} has no coefficients",
            idx
        )));
    }

    for (i, pair) in records.windows(2).enumerate() {
        if pair[1].azimuth_time <= pair[0].azimuth_time {
            return Err(SarError::InvalidSrgrTable(format!(
                "reference times not strictly increasing at record {}",
                i + 1
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2020-01-03T17:08:15Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn two_records() -> Vec<SrgrRecord> {
        vec![
            SrgrRecord {
                azimuth_time: t0(),
                sr0: 800_000.0,
                coefficients: vec![0.0, 1.5, 1e-7],
            },
            SrgrRecord {
                azimuth_time: t0() + Duration::seconds(10),
                sr0: 800_100.0,
                coefficients: vec![10.0, 1.7, 3e-7],
            },
        ]
    }

    #[test]
    fn test_horner_identity() {
        let records = vec![SrgrRecord {
            azimuth_time: t0(),
            sr0: 800_000.0,
            coefficients: vec![800_000.0, 1.0, 0.0],
        }];
        let ground = slant_range_to_ground_range(800_010.0, t0(), &records).unwrap();
        assert_eq!(ground, 800_010.0);
    }

    #[test]
    fn test_polynomial_derivative() {
        let (value, derivative) = evaluate_with_derivative(3.0, 1.0, &[1.0, 2.0, 3.0]);
        assert_eq!(value, 1.0 + 2.0 * 2.0 + 3.0 * 4.0);
        assert_eq!(derivative, 2.0 + 2.0 * 3.0 * 2.0);
        assert_eq!(evaluate_polynomial(3.0, 1.0, &[1.0, 2.0, 3.0]), value);
    }

    #[test]
    fn test_record_interpolation_and_clamping() {
        let records = two_records();

        let mid = record_at(t0() + Duration::seconds(5), &records).unwrap();
        assert_abs_diff_eq!(mid.sr0, 800_050.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mid.coefficients[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.coefficients[1], 1.6, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.coefficients[2], 2e-7, epsilon = 1e-18);

        let before = record_at(t0() - Duration::seconds(5), &records).unwrap();
        assert_eq!(before, records[0]);
        let after = record_at(t0() + Duration::seconds(50), &records).unwrap();
        assert_eq!(after, records[1]);
        let exact = record_at(t0() + Duration::seconds(10), &records).unwrap();
        assert_eq!(exact, records[1]);
    }

    #[test]
    fn test_invalid_tables() {
        assert!(matches!(
            slant_range_to_ground_range(1.0, t0(), &[]),
            Err(SarError::InvalidSrgrTable(_))
        ));

        let mut records = two_records();
        records.swap(0, 1);
        assert!(matches!(
            validate_conversion_table(&records),
            Err(SarError::InvalidSrgrTable(_))
        ));

        let mut records = two_records();
        records[1].coefficients.clear();
        assert!(slant_range_to_ground_range(800_000.0, t0(), &records).is_err());
    }

    #[test]
    fn test_ground_to_slant_inverts_srgr() {
        let records = two_records();
        let time = t0() + Duration::seconds(3);

        for slant in [800_000.0, 812_345.6, 870_000.0] {
            let ground = slant_range_to_ground_range(slant, time, &records).unwrap();
            let back = ground_range_to_slant_range(ground, time, &[], &records).unwrap();
            assert_abs_diff_eq!(back, slant, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_ground_to_slant_prefers_grsr_table() {
        let grsr = vec![SrgrRecord {
            azimuth_time: t0(),
            sr0: 0.0,
            coefficients: vec![800_000.0, 0.5],
        }];
        let slant = ground_range_to_slant_range(1000.0, t0(), &grsr, &[]).unwrap();
        assert_eq!(slant, 800_500.0);
    }
}
