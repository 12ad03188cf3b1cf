pub mod collect;
pub mod commons;
pub mod error;
pub mod geo_core;
pub mod geometric;

pub use error::{Result, YodError};

// Pipeline entry point: normalize roads, sample the CanLaD layers, export
pub use geometric::construction_year::ConstructionYear;
