//! Core domain layer. No external I/O dependencies.
//!
//! Entities, CRS model and the pure spatial join live here. Dependencies flow inward.

pub mod crs;
pub mod entities;
pub mod errors;
pub mod spatial;

pub use crs::Crs;
pub use entities::{
    AffectedZone, Affection, AnalysisReport, Attributes, CadastralReference, Feature,
    GenericParameter, IntersectionReport, IntersectionResult, LayerDescriptor, LayerKind,
    LayerSource, LayerSummary, LoadedLayer, ParcelArea, PointCheck, Predicate, QueryGeometry,
    UrbanisticParameters,
};
pub use errors::DomainError;
