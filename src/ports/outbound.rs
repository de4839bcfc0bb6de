//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{AnalysisReport, Crs, DomainError, LayerDescriptor, LoadedLayer, QueryGeometry};
use geo::Geometry;
use std::path::{Path, PathBuf};

/// Layer registry. Enumerates vector files and remote layer references.
#[async_trait::async_trait]
pub trait LayerCatalogPort: Send + Sync {
    /// Fresh enumeration on every call, in deterministic catalog order.
    /// A missing registry root yields an empty list, not an error.
    async fn list_layers(&self) -> Result<Vec<LayerDescriptor>, DomainError>;
}

/// Reads a catalog layer's vector data into memory.
#[async_trait::async_trait]
pub trait LayerReaderPort: Send + Sync {
    /// Load every feature of `descriptor`. Format is chosen by file extension.
    async fn read_layer(&self, descriptor: &LayerDescriptor) -> Result<LoadedLayer, DomainError>;
}

/// Loads caller-supplied query geometry (uploaded file, cadastre download).
#[async_trait::async_trait]
pub trait GeometrySourcePort: Send + Sync {
    async fn load(&self, path: &Path) -> Result<QueryGeometry, DomainError>;
}

/// Coordinate transformation between EPSG-coded systems.
pub trait ReprojectorPort: Send + Sync {
    fn reproject(
        &self,
        geometry: &Geometry<f64>,
        from: Crs,
        to: Crs,
    ) -> Result<Geometry<f64>, DomainError>;
}

/// Upstream cadastre service.
#[async_trait::async_trait]
pub trait CadastrePort: Send + Sync {
    /// Download the parcel boundary for `reference` into `dest_dir`.
    /// Returns None when the service has no geometry for it.
    async fn fetch_geometry(
        &self,
        reference: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, DomainError>;
}

/// Turns an analysis report into a document at `dest`.
#[async_trait::async_trait]
pub trait ReportRendererPort: Send + Sync {
    async fn render(&self, report: &AnalysisReport, dest: &Path) -> Result<(), DomainError>;

    /// File extension (without dot) of the produced document.
    fn extension(&self) -> &'static str;
}
