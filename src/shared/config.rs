//! Application configuration. Directories, limits, upstream endpoints.
//!
//! Read from `CATASTRO_*` environment variables (and `.env`), plus an optional
//! file named by `CATASTRO_CONFIG`.

use crate::adapters::cadastre::DEFAULT_GEO_URL;
use crate::domain::Crs;
use crate::usecases::{DEFAULT_AFFECTION_KEYWORDS, DEFAULT_LOAD_TIMEOUT, DEFAULT_MAX_CONCURRENT_SCANS};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Layer registry root (`gpkg/`, `shapefiles/`, `wms/`). Read from CATASTRO_LAYERS_DIR.
    #[serde(default)]
    pub layers_dir: Option<String>,

    /// Where reports and intersections.json are written. Read from CATASTRO_OUTPUT_DIR.
    #[serde(default)]
    pub output_dir: Option<String>,

    /// Scratch directory for downloaded parcel geometry. Read from CATASTRO_TEMP_DIR.
    #[serde(default)]
    pub temp_dir: Option<String>,

    /// Upper bound on a single layer load, seconds (default 300). Read from CATASTRO_LOAD_TIMEOUT_SECS.
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,

    /// Layers compared concurrently per scan (default 4). Read from CATASTRO_MAX_CONCURRENT_SCANS.
    #[serde(default)]
    pub max_concurrent_scans: Option<usize>,

    /// Projected CRS for parcel areas (default 25830). Read from CATASTRO_AREA_EPSG.
    #[serde(default)]
    pub area_epsg: Option<u32>,

    /// Cadastre geometry endpoint. Read from CATASTRO_CADASTRE_GEO_URL.
    #[serde(default)]
    pub cadastre_geo_url: Option<String>,

    /// Comma-separated affection keywords. Read from CATASTRO_AFFECTION_KEYWORDS.
    #[serde(default)]
    pub affection_keywords: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("CATASTRO"));
        if let Ok(path) = std::env::var("CATASTRO_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn layers_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.layers_dir.as_deref().unwrap_or("./capas"))
    }

    pub fn output_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.output_dir.as_deref().unwrap_or("./outputs"))
    }

    pub fn temp_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.temp_dir.as_deref().unwrap_or("./temp"))
    }

    /// Zero is treated as unset.
    pub fn load_timeout_or_default(&self) -> Duration {
        self.load_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LOAD_TIMEOUT)
    }

    pub fn max_concurrent_scans_or_default(&self) -> usize {
        self.max_concurrent_scans
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_SCANS)
    }

    pub fn area_crs_or_default(&self) -> Crs {
        match self.area_epsg {
            Some(code) if code > 0 => {
                let crs = Crs::from_epsg(code);
                if crs.is_geographic() {
                    warn!(%crs, "area CRS is geographic; falling back to EPSG:25830");
                    Crs::ETRS89_UTM30N
                } else {
                    crs
                }
            }
            _ => Crs::ETRS89_UTM30N,
        }
    }

    pub fn cadastre_geo_url_or_default(&self) -> String {
        self.cadastre_geo_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEO_URL.to_string())
    }

    /// Lowercased, trimmed keywords. Falls back to the default vocabulary when empty.
    pub fn affection_keywords_or_default(&self) -> Vec<String> {
        let parsed: Vec<String> = self
            .affection_keywords
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if parsed.is_empty() {
            DEFAULT_AFFECTION_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            parsed
        }
    }
}
