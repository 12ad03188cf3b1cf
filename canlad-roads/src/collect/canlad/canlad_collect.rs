use log::{debug, info, warn};

use crate::commons::config::YodConfig;
use crate::error::{Result, YodError};
use crate::geo_core::BoundingBox;
use crate::geometric::disturbance::{DisturbanceRaster, RasterQuery};

/// Catalog of the CanLaD disturbance-year layers used for a run.
///
/// Opened from a [`YodConfig`] before sampling starts and released when
/// dropped; nothing outlives the run that opened it. Only the part of each
/// raster covering `area` is read.
pub struct CanladCollect {
    layers: Vec<Box<dyn RasterQuery>>,
}

impl CanladCollect {
    /// Read every layer declared in `config` over `area`
    pub fn open(config: &YodConfig, area: &BoundingBox) -> Result<Self> {
        config.validate()?;

        let mut layers: Vec<Box<dyn RasterQuery>> = Vec::with_capacity(config.layers.len());
        for layer in &config.layers {
            let path = layer.path.as_ref().ok_or_else(|| {
                YodError::InvalidParameter(format!("no raster path for layer `{}`", layer.property))
            })?;
            info!(
                "Opening CanLaD layer {} ({}-{}) from {:?}",
                layer.property, layer.years.0, layer.years.1, path
            );

            let raster =
                DisturbanceRaster::open(path, &layer.property, layer.band, layer.years, area)?;
            let valid = raster.valid_count();
            if valid == 0 {
                warn!(
                    "Layer {} has no pixel within {:?} around the roads",
                    layer.property, layer.years
                );
            }
            debug!(
                "Layer {}: window extent {:?}, {} valid pixels",
                layer.property,
                raster.extent(),
                valid
            );
            layers.push(Box::new(raster));
        }

        Ok(CanladCollect { layers })
    }

    pub fn layers(&self) -> &[Box<dyn RasterQuery>] {
        &self.layers
    }
}

impl Drop for CanladCollect {
    fn drop(&mut self) {
        debug!("Releasing {} CanLaD layers", self.layers.len());
    }
}
