//! sarloc: SAR sensor inverse location
//!
//! Given a ground position (latitude, longitude, height), find the image
//! (line, sample) where a Sentinel-1 style product sees it. The solver
//! interpolates the orbit, searches the zero-Doppler time, maps it to a line
//! (with burst bookkeeping for TOPS products) and converts slant range to a
//! sample (through the SRGR polynomial for ground-range products). GCP residual
//! validation and a numerical forward model are built on top.

pub mod types;
pub mod core;
pub mod io;

// Re-export main types and functions for easier access
pub use crate::types::{
    BurstRecord, GeometryContext, GroundControlPoint, GroundPoint, ImagePoint, SarError,
    SarResult, SrgrRecord, StateVector, SPEED_OF_LIGHT,
};

pub use crate::core::{
    ForwardLocator, InverseLocator, LocatedPoint, LocatorConfig, ResidualValidator,
    ValidationReport,
};
pub use crate::io::{ProductGeometry, ProductReader};
