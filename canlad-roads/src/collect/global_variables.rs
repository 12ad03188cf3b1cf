use std::path::PathBuf;

/// Roads at or below this length are sampled as-is
pub const LENGTH_THRESHOLD: f64 = 180.0;

/// Arc length removed from each end of a long road
/// (reduces the chance of sampling clearings of perpendicular roads)
pub const SHORTEN_MARGIN: f64 = 90.0;

/// Shortest residual line a clamped shortening may leave behind
pub const MIN_RESIDUAL_LENGTH: f64 = 1.0;

/// Buffer radius around each road, in CRS units
pub const BUFFER_RADIUS: f64 = 30.0;

/// Sampling resolution, in CRS units
pub const SCALE: f64 = 30.0;

/// Percentile of the in-buffer pixel distribution
pub const PERCENTILE: f64 = 5.0;

/// NAD83(CSRS) / Canada Atlas Lambert
pub const DEFAULT_EPSG: i32 = 3979;

pub const ID_FIELD: &str = "id";
pub const LENGTH_FIELD: &str = "length";

/// CanLaD 1965-1984 harvest year product
pub const YOD_CANLAD_65: &str = "yod_canlad_65";
pub const CANLAD_65_YEARS: (u16, u16) = (1965, 1984);

/// CanLaD 1985-2020 harvest year product
pub const YOD_CANLAD_85: &str = "yod_canlad_85";
pub const CANLAD_85_YEARS: (u16, u16) = (1985, 2020);

pub const OUTPUT_FOLDER: &str = "logging_roads";
pub const FILE_NAME_PREFIX: &str = "canlad_years_unpaved_roads";

/// Columns of the tabular export, in order
pub const SELECTORS: [&str; 3] = [ID_FIELD, YOD_CANLAD_65, YOD_CANLAD_85];

pub fn get_output_folder() -> PathBuf {
    PathBuf::from(OUTPUT_FOLDER)
}
