use crate::core::inverse_locator::LocatorConfig;
use crate::types::{GeometryContext, GroundControlPoint, SarResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Geometry of one product as handed over by the metadata provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductGeometry {
    pub context: GeometryContext,
    #[serde(default)]
    pub ground_control_points: Vec<GroundControlPoint>,
    #[serde(default)]
    pub locator_config: LocatorConfig,
}

/// Product geometry reader/writer (JSON)
pub struct ProductReader;

impl ProductReader {
    /// Read and validate a product geometry file
    pub fn read_product_file<P: AsRef<Path>>(path: P) -> SarResult<ProductGeometry> {
        log::info!("Reading product geometry: {}", path.as_ref().display());

        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a product geometry document
    pub fn from_json_str(content: &str) -> SarResult<ProductGeometry> {
        let product: ProductGeometry = serde_json::from_str(content)?;
        product.context.validate()?;

        log::debug!(
            "Product geometry: {} state vectors, {} bursts, {} SRGR records, {} GCPs",
            product.context.orbit.len(),
            product.context.bursts.len(),
            product.context.srgr_records.len(),
            product.ground_control_points.len()
        );
        Ok(product)
    }

    /// Write a product geometry file, creating parent directories as needed
    pub fn write_product_file<P: AsRef<Path>>(product: &ProductGeometry, path: P) -> SarResult<()> {
        let path = path.as_ref();
        log::info!("Writing product geometry: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(product)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::burst::BurstAnchor;
    use crate::types::SarError;

    const MINIMAL: &str = r#"{
        "context": {
            "radar_frequency": 5.405e9,
            "acquisition_start_time": "2020-01-03T17:08:15Z",
            "azimuth_time_interval_us": 2055.556,
            "near_range_time": 5.44e-3,
            "range_sampling_rate": 64.345238e6,
            "range_pixel_spacing": 2.329562,
            "orbit": [
                {"time": "2020-01-03T17:08:10Z", "position": [7070000.0, 0.0, 0.0], "velocity": [0.0, -1056.0, 7398.0]},
                {"time": "2020-01-03T17:08:20Z", "position": [7069960.0, -10560.0, 73980.0], "velocity": [-74.8, -1056.0, 7398.0]}
            ]
        },
        "locator_config": {"burst_anchor": "LastValid"}
    }"#;

    #[test]
    fn test_minimal_document() {
        let product = ProductReader::from_json_str(MINIMAL).unwrap();
        assert_eq!(product.context.orbit.len(), 2);
        assert!(product.ground_control_points.is_empty());
        assert!(!product.context.is_ground_range());
        assert_eq!(product.locator_config.burst_anchor, BurstAnchor::LastValid);
        assert_eq!(product.locator_config.interpolation_degree, 8);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            ProductReader::from_json_str("{ not json"),
            Err(SarError::Serialization(_))
        ));

        let unsorted = MINIMAL.replace("17:08:20Z", "17:08:00Z");
        assert!(matches!(
            ProductReader::from_json_str(&unsorted),
            Err(SarError::InvalidInput(_))
        ));
    }
}
