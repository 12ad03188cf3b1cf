use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{
    CANLAD_65_YEARS, CANLAD_85_YEARS, DEFAULT_EPSG, YOD_CANLAD_65, YOD_CANLAD_85,
};
use crate::error::{Result, YodError};
use crate::geometric::export::Destination;
use crate::geometric::road::NormalizeParams;
use crate::geometric::zonal::SamplingParams;

/// One disturbance-year raster and the property it feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Output property, e.g. `yod_canlad_65`
    pub property: String,
    /// GeoTIFF location; must be set before the catalog is opened
    pub path: Option<PathBuf>,
    /// 1-based band index
    #[serde(default = "default_band")]
    pub band: usize,
    /// Inclusive range of valid disturbance years, anything else is masked
    pub years: (u16, u16),
}

fn default_band() -> usize {
    1
}

impl LayerConfig {
    pub fn new(property: &str, years: (u16, u16)) -> Self {
        LayerConfig {
            property: property.to_string(),
            path: None,
            band: default_band(),
            years,
        }
    }
}

/// Run configuration, usually read from a JSON file and patched from the CLI.
///
/// Every field has a default so a config file only needs the entries it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YodConfig {
    /// GeoJSON FeatureCollection of road lines
    pub roads: Option<PathBuf>,
    /// EPSG of the road file when it differs from `epsg`
    pub input_epsg: Option<i32>,
    /// Working CRS of the rasters, in which all distances are measured
    pub epsg: i32,
    pub layers: Vec<LayerConfig>,
    pub normalize: NormalizeParams,
    pub sampling: SamplingParams,
    pub destination: Destination,
    /// Also write the attributed collection as GeoJSON
    pub geojson: bool,
    /// Number of output rows to log once the run completes
    pub preview: usize,
}

impl Default for YodConfig {
    fn default() -> Self {
        YodConfig {
            roads: None,
            input_epsg: None,
            epsg: DEFAULT_EPSG,
            layers: vec![
                LayerConfig::new(YOD_CANLAD_65, CANLAD_65_YEARS),
                LayerConfig::new(YOD_CANLAD_85, CANLAD_85_YEARS),
            ],
            normalize: NormalizeParams::default(),
            sampling: SamplingParams::default(),
            destination: Destination::default(),
            geojson: false,
            preview: 0,
        }
    }
}

impl YodConfig {
    /// Load a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: YodConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Point the layer feeding `property` at a raster file
    pub fn set_layer_path(&mut self, property: &str, path: PathBuf) -> Result<()> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.property == property)
            .ok_or_else(|| YodError::InvalidParameter(format!("no layer named `{}`", property)))?;
        layer.path = Some(path);
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.normalize.validate()?;
        self.sampling.validate()?;

        if self.layers.is_empty() {
            return Err(YodError::InvalidParameter(
                "at least one raster layer is required".to_string(),
            ));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.band == 0 {
                return Err(YodError::InvalidParameter(format!(
                    "layer `{}`: bands are numbered from 1",
                    layer.property
                )));
            }
            if layer.years.0 == 0 || layer.years.0 > layer.years.1 {
                return Err(YodError::InvalidParameter(format!(
                    "layer `{}`: empty year range {:?}",
                    layer.property, layer.years
                )));
            }
            if self.layers[..i].iter().any(|l| l.property == layer.property) {
                return Err(YodError::InvalidParameter(format!(
                    "layer `{}` is declared twice",
                    layer.property
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::export::ExportFormat;

    #[test]
    fn test_default_config() {
        let config = YodConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layers[0].property, "yod_canlad_65");
        assert_eq!(config.layers[1].years, (1985, 2020));
        assert_eq!(config.normalize.length_threshold, 180.0);
        assert_eq!(config.sampling.buffer_radius, 30.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: YodConfig = serde_json::from_str(
            r#"{ "epsg": 3978, "destination": { "folder": "out", "format": "json" } }"#,
        )
        .unwrap();
        assert_eq!(config.epsg, 3978);
        assert_eq!(config.destination.folder, PathBuf::from("out"));
        assert_eq!(config.destination.format, ExportFormat::Json);
        assert_eq!(
            config.destination.file_name_prefix,
            "canlad_years_unpaved_roads"
        );
        assert_eq!(config.layers.len(), 2);
    }

    #[test]
    fn test_set_layer_path() {
        let mut config = YodConfig::default();
        config
            .set_layer_path("yod_canlad_85", PathBuf::from("b.tif"))
            .unwrap();
        assert_eq!(config.layers[1].path, Some(PathBuf::from("b.tif")));
        assert!(config.set_layer_path("nope", PathBuf::from("c.tif")).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_layer() {
        let mut config = YodConfig::default();
        config.layers[1].property = "yod_canlad_65".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_year_zero() {
        let mut config = YodConfig::default();
        config.layers[0].years = (0, 1984);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "preview": 10, "geojson": true }"#).unwrap();
        let config = YodConfig::from_file(&path).unwrap();
        assert_eq!(config.preview, 10);
        assert!(config.geojson);
    }
}
