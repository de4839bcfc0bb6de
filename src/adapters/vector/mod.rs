//! Vector file adapters. One reader per on-disk format, dispatched by extension.
//!
//! Implements LayerReaderPort (catalog layers) and GeometrySourcePort (query files).

pub mod geojson;
pub mod gpkg;
pub mod shapefile;

use crate::domain::{DomainError, LayerDescriptor, LoadedLayer, QueryGeometry};
use crate::ports::{GeometrySourcePort, LayerReaderPort};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// Supported on-disk vector formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFormat {
    GeoPackage,
    Shapefile,
    GeoJson,
}

impl VectorFormat {
    /// Detect by extension, case-insensitive. `.json` counts as GeoJSON.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gpkg" => Some(Self::GeoPackage),
            "shp" => Some(Self::Shapefile),
            "geojson" | "json" => Some(Self::GeoJson),
            _ => None,
        }
    }

    /// Formats the catalog registers as layers.
    pub fn is_layer_format(self) -> bool {
        matches!(self, Self::GeoPackage | Self::Shapefile)
    }

    /// Lower wins when two files share a layer name.
    pub fn priority(self) -> u8 {
        match self {
            Self::GeoPackage => 0,
            Self::Shapefile => 1,
            Self::GeoJson => 2,
        }
    }
}

/// Reads GeoPackage, Shapefile and GeoJSON into memory.
#[derive(Debug, Default, Clone)]
pub struct VectorFileReader;

impl VectorFileReader {
    pub fn new() -> Self {
        Self
    }

    async fn read_path(&self, path: &Path, name: &str) -> Result<LoadedLayer, DomainError> {
        let format = VectorFormat::from_path(path)
            .ok_or_else(|| DomainError::UnsupportedFormat(path.display().to_string()))?;
        debug!(layer = %name, path = %path.display(), ?format, "reading vector file");
        match format {
            VectorFormat::GeoPackage => {
                // libsql's local backend does its I/O inline; off the workers it stays cancellable.
                let handle = tokio::runtime::Handle::current();
                let owned = path.to_path_buf();
                let layer_name = name.to_string();
                tokio::task::spawn_blocking(move || {
                    handle.block_on(gpkg::read_gpkg(&owned, &layer_name))
                })
                .await
                .map_err(|e| DomainError::LayerLoad(format!("GeoPackage reader task: {}", e)))?
            }
            VectorFormat::Shapefile => {
                let owned = path.to_path_buf();
                let layer_name = name.to_string();
                tokio::task::spawn_blocking(move || shapefile::read_shapefile(&owned, &layer_name))
                    .await
                    .map_err(|e| DomainError::LayerLoad(format!("shapefile reader task: {}", e)))?
            }
            VectorFormat::GeoJson => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| DomainError::LayerLoad(format!("{}: {}", path.display(), e)))?;
                let parsed = geojson::parse_geojson(&text)?;
                Ok(LoadedLayer {
                    name: name.to_string(),
                    features: parsed.features,
                    crs: parsed.crs,
                })
            }
        }
    }
}

#[async_trait]
impl LayerReaderPort for VectorFileReader {
    async fn read_layer(&self, descriptor: &LayerDescriptor) -> Result<LoadedLayer, DomainError> {
        let path = descriptor
            .path()
            .ok_or_else(|| DomainError::NotFound(descriptor.name.clone()))?;
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(DomainError::NotFound(descriptor.name.clone()));
        }
        self.read_path(path, &descriptor.name).await
    }
}

#[async_trait]
impl GeometrySourcePort for VectorFileReader {
    async fn load(&self, path: &Path) -> Result<QueryGeometry, DomainError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("query")
            .to_string();
        let layer = self.read_path(path, &name).await.map_err(|e| match e {
            DomainError::UnsupportedFormat(_) => e,
            other => DomainError::GeometrySource(other.to_string()),
        })?;
        info!(
            path = %path.display(),
            features = layer.len(),
            crs = ?layer.crs,
            "query geometry loaded"
        );
        Ok(QueryGeometry::new(layer.features, layer.crs))
    }
}
