use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use canlad_roads::collect::global_variables::{YOD_CANLAD_65, YOD_CANLAD_85};
use canlad_roads::commons::config::YodConfig;
use canlad_roads::geometric::export::ExportFormat;
use canlad_roads::ConstructionYear;

/// Estimate the construction year of unpaved roads from CanLaD rasters.
#[derive(Parser, Debug)]
#[command(name = "canlad-roads", version)]
struct Args {
    /// JSON run configuration; flags below override its entries
    #[arg(long)]
    config: Option<PathBuf>,

    /// GeoJSON FeatureCollection of road lines
    #[arg(long)]
    roads: Option<PathBuf>,

    /// CanLaD 1965-1984 disturbance-year GeoTIFF
    #[arg(long)]
    canlad_65: Option<PathBuf>,

    /// CanLaD 1985-2020 disturbance-year GeoTIFF
    #[arg(long)]
    canlad_85: Option<PathBuf>,

    #[arg(long)]
    output_folder: Option<PathBuf>,

    /// File name without extension
    #[arg(long)]
    prefix: Option<String>,

    /// csv or json
    #[arg(long)]
    format: Option<ExportFormat>,

    /// Also write the attributed roads as GeoJSON
    #[arg(long, default_value_t = false)]
    geojson: bool,

    /// Log the first N rows of the table
    #[arg(long)]
    preview: Option<usize>,

    /// Working CRS of the rasters
    #[arg(long)]
    epsg: Option<i32>,

    /// CRS of the road file, when different
    #[arg(long)]
    input_epsg: Option<i32>,
}

impl Args {
    fn into_config(self) -> Result<YodConfig> {
        let mut config = match &self.config {
            Some(path) => YodConfig::from_file(path)
                .with_context(|| format!("Failed to read config {:?}", path))?,
            None => YodConfig::default(),
        };

        if let Some(roads) = self.roads {
            config.roads = Some(roads);
        }
        if let Some(path) = self.canlad_65 {
            config.set_layer_path(YOD_CANLAD_65, path)?;
        }
        if let Some(path) = self.canlad_85 {
            config.set_layer_path(YOD_CANLAD_85, path)?;
        }
        if let Some(folder) = self.output_folder {
            config.destination.folder = folder;
        }
        if let Some(prefix) = self.prefix {
            config.destination.file_name_prefix = prefix;
        }
        if let Some(format) = self.format {
            config.destination.format = format;
        }
        if let Some(n) = self.preview {
            config.preview = n;
        }
        if let Some(epsg) = self.epsg {
            config.epsg = epsg;
        }
        if self.input_epsg.is_some() {
            config.input_epsg = self.input_epsg;
        }
        config.geojson |= self.geojson;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    let output = config.destination.path();

    let pipeline = ConstructionYear::new(config)?.run()?;
    let rows = pipeline.get_attributed().map_or(0, |a| a.len());
    info!("Done: {} roads written to {:?}", rows, output);
    Ok(())
}
