// Example: Estimating road construction years from CanLaD GeoTIFFs
// Usage: cargo run --example construction_year_from_files -- roads.geojson canlad_65.tif canlad_85.tif
use anyhow::{Context, Result};
use std::path::PathBuf;

use canlad_roads::collect::global_variables::{YOD_CANLAD_65, YOD_CANLAD_85};
use canlad_roads::commons::config::YodConfig;
use canlad_roads::ConstructionYear;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Example: Construction year from local files ===\n");

    let mut args = std::env::args().skip(1);
    let roads = PathBuf::from(args.next().unwrap_or_else(|| "./data/roads.geojson".to_string()));
    let canlad_65 = PathBuf::from(args.next().unwrap_or_else(|| "./data/canlad_65.tif".to_string()));
    let canlad_85 = PathBuf::from(args.next().unwrap_or_else(|| "./data/canlad_85.tif".to_string()));

    println!("Roads: {:?}", roads);
    println!("CanLaD 1965-1984: {:?}", canlad_65);
    println!("CanLaD 1985-2020: {:?}", canlad_85);

    let mut config = YodConfig::default();
    config.roads = Some(roads);
    config.set_layer_path(YOD_CANLAD_65, canlad_65)?;
    config.set_layer_path(YOD_CANLAD_85, canlad_85)?;
    config.destination.folder = PathBuf::from("./output");
    config.destination.file_name_prefix = "yod_roads".to_string();
    config.preview = 5;
    std::fs::create_dir_all(&config.destination.folder)
        .context("Failed to create the output folder")?;
    let output = config.destination.path();

    // Normalize, sample both layers and write the table
    let pipeline = ConstructionYear::new(config)?.run()?;

    let attributed = pipeline.get_attributed().unwrap_or_default();
    let dated = attributed
        .iter()
        .filter(|road| road.get(YOD_CANLAD_65).flatten().is_some())
        .count();
    println!("\nRoads processed: {}", attributed.len());
    println!("Roads dated by the 1965-1984 layer: {}", dated);
    println!("Table written to {:?}", output);

    let geojson = pipeline.to_geojson(None)?;
    println!("Attributed roads saved to {:?}", geojson);

    Ok(())
}
