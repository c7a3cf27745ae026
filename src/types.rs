use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Orbit state vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub time: DateTime<Utc>,
    pub position: [f64; 3],  // [x, y, z] in meters (ECEF)
    pub velocity: [f64; 3],  // [vx, vy, vz] in m/s (ECEF)
}

/// Burst validity window, in absolute image lines and azimuth times.
///
/// Lines are absolute image indices (`burst_index * lines_per_burst + offset`).
/// `last_valid_line` and `last_valid_time` are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstRecord {
    pub first_valid_time: DateTime<Utc>,
    pub first_valid_line: u64,
    pub last_valid_time: DateTime<Utc>,
    pub last_valid_line: u64,
}

/// Range coordinate conversion polynomial (slant->ground or ground->slant).
///
/// Coefficient `i` multiplies `(x - sr0)^i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrgrRecord {
    pub azimuth_time: DateTime<Utc>,
    pub sr0: f64,
    pub coefficients: Vec<f64>,
}

/// Geodetic position on the WGS84 ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPoint {
    pub latitude: f64,   // degrees
    pub longitude: f64,  // degrees
    pub height: f64,     // meters above ellipsoid
}

/// Fractional image position; line 0 is the first line of the product.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePoint {
    pub line: f64,
    pub sample: f64,
}

/// Ground control point from the product geolocation grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundControlPoint {
    pub azimuth_time: DateTime<Utc>,
    pub slant_range_time: f64,  // two-way, seconds
    pub image_point: ImagePoint,
    pub ground_point: GroundPoint,
}

/// Product geometry needed to solve the inverse location problem.
///
/// Built once per product by the metadata provider and only borrowed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryContext {
    pub radar_frequency: f64,            // Hz
    pub acquisition_start_time: DateTime<Utc>,
    #[serde(default)]
    pub acquisition_stop_time: Option<DateTime<Utc>>,
    pub azimuth_time_interval_us: f64,
    pub near_range_time: f64,            // two-way, seconds
    pub range_sampling_rate: f64,        // Hz
    pub range_pixel_spacing: f64,        // meters
    #[serde(default)]
    pub number_of_lines: Option<usize>,
    #[serde(default)]
    pub number_of_samples: Option<usize>,
    pub orbit: Vec<StateVector>,
    #[serde(default)]
    pub bursts: Vec<BurstRecord>,
    #[serde(default)]
    pub srgr_records: Vec<SrgrRecord>,
    #[serde(default)]
    pub grsr_records: Vec<SrgrRecord>,
}

impl GeometryContext {
    /// Annotation azimuth time interval (seconds) to the microseconds used internally
    pub fn azimuth_interval_us_from_seconds(seconds: f64) -> f64 {
        seconds * 1_000_000.0
    }

    /// Ground-range (GRD) products carry a slant-to-ground conversion table
    pub fn is_ground_range(&self) -> bool {
        !self.srgr_records.is_empty()
    }

    pub fn has_bursts(&self) -> bool {
        !self.bursts.is_empty()
    }

    /// Slant range distance of the first range sample (meters)
    pub fn near_range_distance(&self) -> f64 {
        self.near_range_time * SPEED_OF_LIGHT / 2.0
    }

    /// Check every table and scalar once, before a solving session
    pub fn validate(&self) -> SarResult<()> {
        crate::core::orbit::validate_orbit(&self.orbit, 2)?;
        crate::core::orbit::check_orbit_plausibility(&self.orbit);

        if !(self.azimuth_time_interval_us > 0.0) {
            return Err(SarError::InvalidInput(format!(
                "Azimuth time interval must be positive, got {} us",
                self.azimuth_time_interval_us
            )));
        }
        if !(self.radar_frequency > 0.0) {
            return Err(SarError::InvalidInput(format!(
                "Radar frequency must be positive, got {} Hz",
                self.radar_frequency
            )));
        }

        if self.is_ground_range() {
            if !(self.range_pixel_spacing > 0.0) {
                return Err(SarError::InvalidInput(format!(
                    "Range pixel spacing must be positive for ground range products, got {} m",
                    self.range_pixel_spacing
                )));
            }
            crate::core::srgr::validate_conversion_table(&self.srgr_records)?;
            if !self.grsr_records.is_empty() {
                crate::core::srgr::validate_conversion_table(&self.grsr_records)?;
            }
        } else if !(self.range_sampling_rate > 0.0) {
            return Err(SarError::InvalidInput(format!(
                "Range sampling rate must be positive for slant range products, got {} Hz",
                self.range_sampling_rate
            )));
        }

        if self.has_bursts() {
            crate::core::burst::validate_burst_table(&self.bursts)?;
        }

        log::debug!(
            "Geometry context valid: {} state vectors, {} bursts, {} SRGR records",
            self.orbit.len(),
            self.bursts.len(),
            self.srgr_records.len()
        );
        Ok(())
    }
}

/// Signed `later - earlier` in microseconds
pub fn microseconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64,
        None => delta.num_milliseconds() as f64 * 1000.0,
    }
}

/// Shift a time by a fractional number of microseconds, rounded to the nearest microsecond.
///
/// Non-finite offsets and results outside the representable date range are `InvalidInput`.
pub fn offset_by_microseconds(time: DateTime<Utc>, microseconds: f64) -> SarResult<DateTime<Utc>> {
    let rounded = microseconds.round();
    if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
        return Err(SarError::InvalidInput(format!(
            "Time offset of {} us is out of range",
            microseconds
        )));
    }

    time.checked_add_signed(Duration::microseconds(rounded as i64))
        .ok_or_else(|| {
            SarError::InvalidInput(format!(
                "Time {} shifted by {} us is out of range",
                time, rounded
            ))
        })
}

/// Error types for SAR geometry
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("Insufficient orbit data: {available} state vectors, at least {required} required")]
    InsufficientOrbitData { available: usize, required: usize },

    #[error("No zero-Doppler crossing within orbit arc {first} .. {last}")]
    OutOfBracket {
        first: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Invalid slant/ground range table: {0}")]
    InvalidSrgrTable(String),

    #[error("Degenerate burst table: {0}")]
    DegenerateBurstTable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
