//! Core SAR geometry modules

pub mod geodesy;
pub mod orbit;
pub mod doppler;
pub mod zero_doppler;
pub mod burst;
pub mod srgr;
pub mod inverse_locator;
pub mod forward;
pub mod validation;

// Re-export main types
pub use orbit::{interpolate_state, OrbitInterpolator, SensorState, DEFAULT_INTERPOLATION_DEGREE};
pub use zero_doppler::{BistaticCorrection, DopplerBracket, ZeroDopplerSearch, ZeroDopplerSolution};
pub use burst::{
    build_burst_records, deburst_geometry, deburst_line_to_image_line, deburst_records,
    image_line_to_deburst_line, BurstAnchor, BurstLineMapper, BurstTiming, DeburstedGeometry,
};
pub use srgr::{ground_range_to_slant_range, slant_range_to_ground_range};
pub use inverse_locator::{InverseLocator, LocatedPoint, LocatorConfig};
pub use forward::ForwardLocator;
pub use validation::{ResidualTolerance, ResidualValidator, TimeOffsets, ValidationReport};
