//! I/O modules for product geometry files and synthetic acquisitions

pub mod product;
pub mod mock;

pub use product::{ProductGeometry, ProductReader};
pub use mock::{MockAcquisition, MockMode};
