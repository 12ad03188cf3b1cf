use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading roads, sampling rasters or writing exports
#[derive(Debug, Error)]
pub enum YodError {
    #[error("feature #{index} has no `{field}` attribute")]
    MissingId { index: usize, field: String },

    #[error("road id `{0}` appears more than once")]
    DuplicateId(String),

    #[error("road `{id}`: unsupported geometry type {kind}")]
    UnsupportedGeometry { id: String, kind: String },

    #[error("expected a GeoJSON FeatureCollection, found {0}")]
    NotAFeatureCollection(String),

    #[error("raster {path:?}: {reason}")]
    Raster { path: PathBuf, reason: String },

    #[error("unknown export column `{0}`")]
    UnknownColumn(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("EPSG:{from} roads cannot be sampled against EPSG:{to} rasters without the `proj` feature")]
    CrsMismatch { from: i32, to: i32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gdal")]
    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),

    #[cfg(feature = "proj")]
    #[error(transparent)]
    Proj(#[from] proj::ProjError),

    #[cfg(feature = "proj")]
    #[error(transparent)]
    ProjCreate(#[from] proj::ProjCreateError),
}

impl YodError {
    pub fn raster(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        YodError::Raster {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, YodError>;
