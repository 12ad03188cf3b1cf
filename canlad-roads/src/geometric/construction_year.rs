use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;

use crate::collect::canlad::canlad_collect::CanladCollect;
use crate::commons::config::YodConfig;
use crate::geo_core::{BoundingBox, GeoCore};
use crate::geometric::disturbance::RasterQuery;
use crate::geometric::export::{
    select_columns, write_geojson, ExportSink, FileSink, Row, Schema,
};
use crate::geometric::road::Roads;
use crate::geometric::zonal::{extract_statistics, AttributedRoad};

/// Road construction year estimation.
///
/// Loads the roads, trims long segments, samples every CanLaD layer in a
/// buffer around each road and exports `id` with one year column per layer.
pub struct ConstructionYear {
    config: YodConfig,
    /// Working CRS of the rasters
    pub geo_core: GeoCore,
    roads: Option<Roads>,
    normalized: Option<Roads>,
    attributed: Option<Vec<AttributedRoad>>,
}

impl ConstructionYear {
    pub fn new(config: YodConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let geo_core = GeoCore::new(config.epsg);
        Ok(ConstructionYear {
            config,
            geo_core,
            roads: None,
            normalized: None,
            attributed: None,
        })
    }

    /// Use an in-memory collection instead of `config.roads`
    pub fn set_roads(&mut self, roads: Roads) {
        self.roads = Some(roads);
        self.normalized = None;
        self.attributed = None;
    }

    /// Read `config.roads` unless roads were already provided
    pub fn load_roads(&mut self) -> Result<&Roads> {
        if self.roads.is_none() {
            let path = self
                .config
                .roads
                .as_ref()
                .context("No road file configured")?;
            let source_epsg = self.config.input_epsg.unwrap_or(self.config.epsg);
            let roads = Roads::from_file(path, source_epsg, &self.geo_core)
                .with_context(|| format!("Failed to load roads from {:?}", path))?;
            self.roads = Some(roads);
        }
        self.roads.as_ref().context("No roads loaded")
    }

    /// Raw road extent grown by the buffer radius; `None` without roads.
    ///
    /// Normalization only trims lines, so this also covers every buffer
    /// sampled after it.
    pub fn area_of_interest(&self) -> Option<BoundingBox> {
        self.roads
            .as_ref()?
            .bounding_box()
            .map(|bbox| bbox.expand(self.config.sampling.buffer_radius))
    }

    /// Open the CanLaD catalog, sample it and export the table
    pub fn run(mut self) -> Result<Self> {
        self.run_internal()?;
        Ok(self)
    }

    /// Internal run method that can be called mutably
    pub fn run_internal(&mut self) -> Result<()> {
        self.load_roads()?;
        match self.area_of_interest() {
            Some(area) => {
                let catalog = CanladCollect::open(&self.config, &area)
                    .context("Failed to open CanLaD layers")?;
                self.compute(catalog.layers())?;
            }
            None => {
                warn!("No road geometry to sample, skipping the CanLaD layers");
                self.compute(&[])?;
            }
        }
        self.export()?;

        if self.config.geojson {
            self.to_geojson(None)?;
        }
        self.preview(self.config.preview);
        Ok(())
    }

    /// Normalize the roads and sample `layers`; no output is written
    pub fn compute(&mut self, layers: &[Box<dyn RasterQuery>]) -> Result<&[AttributedRoad]> {
        self.load_roads()?;
        let roads = self.roads.as_ref().context("No roads loaded")?;
        let normalized = roads.normalize(&self.config.normalize);
        info!(
            "Normalized {} roads (threshold {}, margin {})",
            normalized.len(),
            self.config.normalize.length_threshold,
            self.config.normalize.shorten_margin
        );

        let attributed = extract_statistics(&normalized, layers, &self.config.sampling)
            .context("Failed to extract CanLaD statistics")?;

        self.normalized = Some(normalized);
        let attributed = self.attributed.insert(attributed);
        Ok(attributed.as_slice())
    }

    pub fn get_normalized(&self) -> Option<&Roads> {
        self.normalized.as_ref()
    }

    pub fn get_attributed(&self) -> Option<&[AttributedRoad]> {
        self.attributed.as_deref()
    }

    /// Project the attributed roads onto the configured selectors
    pub fn rows(&self) -> Result<(Schema, Vec<Row>)> {
        let attributed = self
            .get_attributed()
            .context("No statistics available. Call run() first.")?;
        let table = select_columns(attributed, &self.config.destination.selectors)
            .context("Failed to select export columns")?;
        Ok(table)
    }

    /// Write the table to the configured destination
    pub fn export(&self) -> Result<PathBuf> {
        self.export_with(&FileSink)
    }

    pub fn export_with(&self, sink: &dyn ExportSink) -> Result<PathBuf> {
        let (schema, rows) = self.rows()?;
        let path = sink
            .export(&schema, &rows, &self.config.destination)
            .with_context(|| format!("Failed to export to {:?}", self.config.destination.path()))?;
        Ok(path)
    }

    /// Save the attributed roads, geometry included, next to the table
    pub fn to_geojson(&self, name: Option<&str>) -> Result<PathBuf> {
        let attributed = self
            .get_attributed()
            .context("No statistics available. Call run() first.")?;
        let destination = &self.config.destination;
        let name = name.unwrap_or(&destination.file_name_prefix);
        let path = destination.folder.join(format!("{}.geojson", name));
        write_geojson(attributed, &path)
            .with_context(|| format!("Failed to write GeoJSON file: {:?}", path))?;
        Ok(path)
    }

    /// Log the first `n` rows
    pub fn preview(&self, n: usize) {
        if n == 0 {
            return;
        }
        match self.rows() {
            Ok((schema, rows)) => {
                info!(
                    "Preview ({} of {} rows): {}",
                    n.min(rows.len()),
                    rows.len(),
                    schema.columns.join(", ")
                );
                for row in rows.iter().take(n) {
                    let cells: Vec<String> = row.0.iter().map(|v| v.to_string()).collect();
                    info!("  {}", cells.join(", "));
                }
            }
            Err(e) => warn!("No preview: {:#}", e),
        }
    }
}
