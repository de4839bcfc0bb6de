//! Domain entities. Pure data structures for the core business.
//!
//! No file-format or HTTP types here; adapters map into these.

use chrono::{DateTime, Utc};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{Crs, DomainError};

/// Feature attributes, keyed by column/property name.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Where a catalog layer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Local vector file (GeoPackage or Shapefile), loadable into memory.
    VectorFile,
    /// Remote (WMS-style) reference. Listed, never loaded.
    Remote,
}

/// Catalog entry. Immutable once scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    pub kind: LayerKind,
    pub source: LayerSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSource {
    Path(PathBuf),
    Url(String),
}

impl LayerDescriptor {
    pub fn vector_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::VectorFile,
            source: LayerSource::Path(path.into()),
        }
    }

    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Remote,
            source: LayerSource::Url(url.into()),
        }
    }

    pub fn is_vector(&self) -> bool {
        self.kind == LayerKind::VectorFile
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        match &self.source {
            LayerSource::Path(p) => Some(p.as_path()),
            LayerSource::Url(_) => None,
        }
    }
}

/// A geometry with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(geometry: impl Into<Geometry<f64>>, attributes: Attributes) -> Self {
        Self {
            geometry: geometry.into(),
            attributes,
        }
    }
}

/// Vector layer data held by the layer cache. Read-only after load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedLayer {
    pub name: String,
    pub features: Vec<Feature>,
    /// None when the source carries no CRS metadata.
    pub crs: Option<Crs>,
}

impl LoadedLayer {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Caller-supplied input shape(s). Transient.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryGeometry {
    pub features: Vec<Feature>,
    /// Declared CRS. None means EPSG:4326 for intersection, and "unknown" for area.
    pub crs: Option<Crs>,
}

impl QueryGeometry {
    pub fn new(features: Vec<Feature>, crs: Option<Crs>) -> Self {
        Self { features, crs }
    }

    /// Single WGS 84 point, as used by point-in-polygon checks.
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            features: vec![Feature::new(geo::Point::new(lon, lat))],
            crs: Some(Crs::WGS84),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// CRS used for intersection: declared, or WGS 84 when missing.
    pub fn effective_crs(&self) -> Crs {
        self.crs.unwrap_or(Crs::WGS84)
    }
}

/// Spatial relationship tested by a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    /// Query feature shares any point with a target feature.
    Intersects,
    /// Query feature lies wholly inside a target feature.
    Within,
}

/// Outcome of one (query, layer) comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionResult {
    pub layer: String,
    /// Distinct query features matched. Absent when `error` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_features: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntersectionResult {
    pub fn matched(layer: impl Into<String>, count: usize) -> Self {
        Self {
            layer: layer.into(),
            matched_features: Some(count),
            error: None,
        }
    }

    pub fn failed(layer: impl Into<String>, error: &DomainError) -> Self {
        Self {
            layer: layer.into(),
            matched_features: None,
            error: Some(error.to_string()),
        }
    }

    /// True when the comparison succeeded with at least one match.
    pub fn is_hit(&self) -> bool {
        self.matched_features.is_some_and(|n| n > 0)
    }
}

/// Parcel surface in a projected CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelArea {
    /// Square meters, rounded to 2 decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub unit: String,
    /// Hectares, rounded to 4 decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_hectares: Option<f64>,
    /// Set instead of a value when the area could not be computed reliably.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParcelArea {
    pub fn measured(square_meters: f64) -> Self {
        Self {
            value: Some(round_to(square_meters, 2)),
            unit: "m²".to_string(),
            value_hectares: Some(round_to(square_meters / 10_000.0, 4)),
            error: None,
        }
    }

    pub fn unreliable(reason: impl Into<String>) -> Self {
        Self {
            value: None,
            unit: "m²".to_string(),
            value_hectares: None,
            error: Some(reason.into()),
        }
    }

    pub fn hectares(&self) -> f64 {
        self.value_hectares.unwrap_or(0.0)
    }
}

/// Zone layer affecting the parcel (nonzero match).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedZone {
    pub layer: String,
    pub matched_features: usize,
}

/// Keyword-classified affection (risk, protection, public domain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affection {
    #[serde(rename = "type")]
    pub kind: String,
    pub layer: String,
    pub matched_features: usize,
}

/// Illustrative coefficient. Never derived from an actual ordinance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericParameter {
    pub value: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrbanisticParameters {
    pub parcel_area: Option<ParcelArea>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy_coefficient: Option<GenericParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buildability: Option<GenericParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<GenericParameter>,
    pub disclaimer: String,
}

/// Consolidated per-parcel analysis handed to report renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub reference: String,
    pub timestamp: DateTime<Utc>,
    pub parcel_area: Option<ParcelArea>,
    pub affected_zones: Vec<AffectedZone>,
    pub urbanistic_parameters: UrbanisticParameters,
    pub affections: Vec<Affection>,
    pub recommendations: Vec<String>,
    /// Inline degradation diagnostics (missing geometry, no layers evaluated, ...).
    pub notes: Vec<String>,
}

/// Bulk scan of an input file against every vector layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionReport {
    pub input_file: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub input_features: usize,
    pub layers_analyzed: Vec<String>,
    /// One entry per vector layer, including failed comparisons.
    pub intersections: Vec<IntersectionResult>,
}

/// Point-in-polygon membership over every vector layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCheck {
    pub lon: f64,
    pub lat: f64,
    pub affected_layers: Vec<IntersectionResult>,
}

/// Catalog entry with its feature count, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub descriptor: LayerDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Spanish cadastral reference: 14 (parcel) to 20 (property) alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CadastralReference(String);

impl CadastralReference {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let s = raw.trim().to_ascii_uppercase();
        if !(14..=20).contains(&s.len()) {
            return Err(DomainError::InvalidReference(format!(
                "'{}' must be 14 to 20 characters",
                raw.trim()
            )));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidReference(format!(
                "'{}' must be alphanumeric",
                raw.trim()
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CadastralReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parcel_area_rounding() {
        let area = ParcelArea::measured(10_000.0);
        assert_eq!(area.value, Some(10_000.0));
        assert_eq!(area.value_hectares, Some(1.0));

        let area = ParcelArea::measured(12_345.6789);
        assert_eq!(area.value, Some(12_345.68));
        assert_eq!(area.value_hectares, Some(1.2346));
    }

    #[test]
    fn test_unreliable_area_has_no_value() {
        let area = ParcelArea::unreliable("no CRS");
        assert!(area.value.is_none());
        assert_eq!(area.hectares(), 0.0);
        let json = serde_json::to_value(&area).unwrap();
        assert!(json.get("value").is_none());
        assert_eq!(json["error"], "no CRS");
    }

    #[test]
    fn test_intersection_result_hit() {
        assert!(IntersectionResult::matched("a", 2).is_hit());
        assert!(!IntersectionResult::matched("a", 0).is_hit());
        let err = DomainError::NotFound("a".into());
        let failed = IntersectionResult::failed("a", &err);
        assert!(!failed.is_hit());
        assert!(failed.matched_features.is_none());
        assert_eq!(failed.error.as_deref(), Some("Layer not found: a"));
    }

    #[test]
    fn test_cadastral_reference() {
        let r = CadastralReference::parse(" 9812301xf4691s0001pi ").unwrap();
        assert_eq!(r.as_str(), "9812301XF4691S0001PI");
        assert!(CadastralReference::parse("123").is_err());
        assert!(CadastralReference::parse("9812301-F4691S").is_err());
    }

    #[test]
    fn test_query_effective_crs_defaults_to_wgs84() {
        let q = QueryGeometry::new(vec![], None);
        assert_eq!(q.effective_crs(), Crs::WGS84);
    }
}
