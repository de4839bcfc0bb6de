//! CRS adapter. Implements ReprojectorPort on top of proj4rs (pure Rust PROJ.4).

pub mod proj4;

pub use proj4::Proj4Reprojector;
