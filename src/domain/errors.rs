//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Layer name absent from the catalog, remote-only, or source file missing.
    #[error("Layer not found: {0}")]
    NotFound(String),

    /// I/O error or malformed file while reading a layer. Never cached; retried on next access.
    #[error("Layer load failed: {0}")]
    LayerLoad(String),

    #[error("Layer load timed out after {seconds} seconds: {layer}")]
    LoadTimeout { layer: String, seconds: u64 },

    /// Invalid or degenerate geometry, isolated to one layer comparison.
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("CRS error: {0}")]
    Crs(String),

    #[error("Unsupported vector format: {0}")]
    UnsupportedFormat(String),

    /// Query geometry could not be read at all.
    #[error("Geometry source error: {0}")]
    GeometrySource(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Cadastre client error: {0}")]
    Cadastre(String),

    #[error("Invalid cadastral reference: {0}")]
    InvalidReference(String),

    #[error("UI error: {0}")]
    Ui(String),
}

impl DomainError {
    /// True for failures a later retry may clear (I/O, timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LayerLoad(_) | Self::LoadTimeout { .. })
    }
}
