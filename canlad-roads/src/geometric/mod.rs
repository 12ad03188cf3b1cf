pub mod construction_year;
pub mod disturbance;
pub mod export;
pub mod line_tools;
pub mod region;
pub mod road;
pub mod zonal;
