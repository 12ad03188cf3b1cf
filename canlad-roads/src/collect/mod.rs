pub mod canlad;
pub mod global_variables;
