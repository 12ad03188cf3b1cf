use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::collect::global_variables::{BUFFER_RADIUS, PERCENTILE, SCALE};
use crate::commons::basic_functions::percentile_nearest_rank;
use crate::error::{Result, YodError};
use crate::geometric::disturbance::RasterQuery;
use crate::geometric::region::{buffer_region, BufferedRegion};
use crate::geometric::road::{RoadFeature, Roads};

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Reduces the pixel values of one region to a single statistic
pub trait Aggregator: Send + Sync {
    fn name(&self) -> String;

    /// `None` when `values` is empty
    fn aggregate(&self, values: &mut [f64]) -> Option<f64>;
}

/// Built-in aggregators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Nearest-rank percentile, 0..=100
    Percentile(f64),
    Min,
    Mean,
}

impl Default for Reducer {
    fn default() -> Self {
        Reducer::Percentile(PERCENTILE)
    }
}

impl Aggregator for Reducer {
    fn name(&self) -> String {
        match self {
            Reducer::Percentile(p) => format!("p{}", p),
            Reducer::Min => "min".to_string(),
            Reducer::Mean => "mean".to_string(),
        }
    }

    fn aggregate(&self, values: &mut [f64]) -> Option<f64> {
        match self {
            Reducer::Percentile(p) => percentile_nearest_rank(values, *p),
            Reducer::Min => values.iter().copied().reduce(f64::min),
            Reducer::Mean if values.is_empty() => None,
            Reducer::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        }
    }
}

/// Buffer, resolution and reducer used for every road
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub buffer_radius: f64,
    pub scale: f64,
    pub reducer: Reducer,
}

impl Default for SamplingParams {
    fn default() -> Self {
        SamplingParams {
            buffer_radius: BUFFER_RADIUS,
            scale: SCALE,
            reducer: Reducer::default(),
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_radius.is_finite() && self.buffer_radius >= 0.0) {
            return Err(YodError::InvalidParameter(format!(
                "buffer radius must be non-negative, got {}",
                self.buffer_radius
            )));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(YodError::InvalidParameter(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        if let Reducer::Percentile(p) = self.reducer {
            if !(0.0..=100.0).contains(&p) {
                return Err(YodError::InvalidParameter(format!(
                    "percentile must be within 0..=100, got {}",
                    p
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate the valid pixels of `raster` inside `region`.
///
/// A region without valid pixels yields `Ok(None)`; only a failing raster
/// source is an error.
pub fn zonal_statistic(
    raster: &dyn RasterQuery,
    region: &BufferedRegion,
    scale: f64,
    aggregator: &dyn Aggregator,
) -> Result<Option<f64>> {
    let mut values = raster.sample(region, scale)?;
    values.retain(|v| v.is_finite());
    Ok(aggregator.aggregate(&mut values))
}

/// A normalized road with one statistic per raster layer, in layer order
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedRoad {
    pub road: RoadFeature,
    pub attributes: Vec<(String, Option<f64>)>,
}

impl AttributedRoad {
    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }
}

fn attribute_road(
    road: &RoadFeature,
    layers: &[Box<dyn RasterQuery>],
    params: &SamplingParams,
) -> Result<AttributedRoad> {
    let region = buffer_region(&road.geometry, params.buffer_radius);
    let attributes = layers
        .iter()
        .map(|layer| {
            let value = zonal_statistic(layer.as_ref(), &region, params.scale, &params.reducer)?;
            Ok((layer.name().to_string(), value))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AttributedRoad {
        road: road.clone(),
        attributes,
    })
}

/// Compute every layer's statistic for every road.
///
/// Roads are independent, so the work is spread over the rayon pool when the
/// `rayon` feature is on. Any raster failure aborts the whole extraction; the
/// output order follows `roads`.
pub fn extract_statistics(
    roads: &Roads,
    layers: &[Box<dyn RasterQuery>],
    params: &SamplingParams,
) -> Result<Vec<AttributedRoad>> {
    params.validate()?;
    info!(
        "Extracting {} of {} layers in {} unit buffers at {} unit scale for {} roads",
        params.reducer.name(),
        layers.len(),
        params.buffer_radius,
        params.scale,
        roads.len()
    );

    #[cfg(feature = "indicatif")]
    let pb = {
        let pb = ProgressBar::new(roads.len() as u64);
        pb.set_style(progress_style());
        pb.set_message("Roads");
        pb
    };

    #[cfg(feature = "rayon")]
    let attributed: Result<Vec<AttributedRoad>> = roads
        .features()
        .par_iter()
        .map(|road| {
            let res = attribute_road(road, layers, params);
            #[cfg(feature = "indicatif")]
            pb.inc(1);
            res
        })
        .collect();

    #[cfg(not(feature = "rayon"))]
    let attributed: Result<Vec<AttributedRoad>> = roads
        .features()
        .iter()
        .map(|road| {
            let res = attribute_road(road, layers, params);
            #[cfg(feature = "indicatif")]
            pb.inc(1);
            res
        })
        .collect();

    #[cfg(feature = "indicatif")]
    pb.finish_with_message("All roads sampled");

    let attributed = attributed?;

    for layer in layers {
        let found = attributed
            .iter()
            .filter(|a| matches!(a.get(layer.name()), Some(Some(_))))
            .count();
        if found == 0 && !attributed.is_empty() {
            warn!("Layer {} produced no value for any road", layer.name());
        } else {
            debug!("Layer {}: {}/{} roads with a value", layer.name(), found, attributed.len());
        }
    }

    Ok(attributed)
}
