//! Urbanistic analysis: composes intersection passes and parcel area into one report.
//!
//! Single pass per request; the only shared state is the layer cache behind the engine.

use crate::domain::entities::round_to;
use crate::domain::{
    AffectedZone, Affection, AnalysisReport, Crs, DomainError, GenericParameter,
    IntersectionResult, ParcelArea, Predicate, QueryGeometry, UrbanisticParameters,
};
use crate::ports::{GeometrySourcePort, ReprojectorPort};
use crate::usecases::intersection_service::{IntersectionEngine, reproject_features};
use chrono::Utc;
use geo::Area;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Layer-name fragments marking risk, protection and public-domain layers (case-insensitive).
pub const DEFAULT_AFFECTION_KEYWORDS: &[&str] = &["afeccion", "riesgo", "proteccion", "dominio"];

const RECOMMENDATIONS: &[&str] = &[
    "Consult the current Plan General de Ordenación Urbana (PGOU).",
    "Verify correspondence with the land registry (Registro de la Propiedad).",
    "Confirm urbanistic parameters with the town council.",
    "This analysis is informative only.",
];

const GENERIC_DISCLAIMER: &str = "Generic illustrative coefficients, not derived from the applicable \
     zoning ordinance. Confirm actual values with the municipal planning office.";

const NOTE_NO_GEOMETRY: &str = "No geometry available for analysis";
const NOTE_NO_ZONES: &str = "No zoning layers intersect the parcel";
const NOTE_NO_AFFECTIONS: &str = "No affections detected";

/// Aggregator service. Owns no state beyond shared handles.
pub struct UrbanAnalyzer {
    engine: IntersectionEngine,
    source: Arc<dyn GeometrySourcePort>,
    reprojector: Arc<dyn ReprojectorPort>,
    area_crs: Crs,
    keywords: Vec<String>,
}

impl UrbanAnalyzer {
    /// Create the analyzer.
    ///
    /// # Arguments
    /// * `engine` - Intersection engine (shares the layer cache)
    /// * `source` - Loader for the parcel geometry file
    /// * `reprojector` - Used for the metric area computation
    /// * `area_crs` - Projected CRS in which parcel area is measured
    /// * `keywords` - Affection vocabulary matched against layer names
    pub fn new(
        engine: IntersectionEngine,
        source: Arc<dyn GeometrySourcePort>,
        reprojector: Arc<dyn ReprojectorPort>,
        area_crs: Crs,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            engine,
            source,
            reprojector,
            area_crs,
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Analyze a parcel whose geometry lives at `source`.
    ///
    /// With no source a degraded report is returned. A source that cannot be read
    /// at all is the only failure of the whole call.
    pub async fn analyze(
        &self,
        reference: &str,
        source: Option<&Path>,
    ) -> Result<AnalysisReport, DomainError> {
        info!(reference, "starting urbanistic analysis");
        let query = match source {
            Some(path) => Some(self.source.load(path).await.map_err(|e| {
                warn!(reference, path = %path.display(), error = %e, "parcel geometry unreadable");
                e
            })?),
            None => None,
        };
        Ok(self.analyze_geometry(reference, query).await)
    }

    /// Same pipeline on an in-memory geometry. Always produces a report.
    pub async fn analyze_geometry(
        &self,
        reference: &str,
        query: Option<QueryGeometry>,
    ) -> AnalysisReport {
        let mut notes = Vec::new();

        let Some(query) = query else {
            notes.push(NOTE_NO_GEOMETRY.to_string());
            return AnalysisReport {
                reference: reference.to_string(),
                timestamp: Utc::now(),
                parcel_area: None,
                affected_zones: Vec::new(),
                urbanistic_parameters: urbanistic_parameters(None),
                affections: Vec::new(),
                recommendations: recommendations(),
                notes,
            };
        };

        let area = self.parcel_area(&query);
        if let Some(err) = &area.error {
            notes.push(format!("Parcel area unavailable: {}", err));
        }

        let layers = match self.engine.vector_layers().await {
            Ok(layers) => layers,
            Err(e) => {
                warn!(reference, error = %e, "layer catalog unavailable");
                notes.push(format!("Layer catalog unavailable: {}", e));
                Vec::new()
            }
        };
        let affection_layers: Vec<String> = layers
            .iter()
            .filter(|name| self.is_affection_layer(name))
            .cloned()
            .collect();

        // Two independent passes: the keyword subset is re-scanned, not filtered from the first.
        let (zone_results, affection_results) = tokio::join!(
            self.engine.scan(&query, layers, Predicate::Intersects),
            self.engine
                .scan(&query, affection_layers, Predicate::Intersects),
        );

        let affected_zones: Vec<AffectedZone> = hits(&zone_results)
            .map(|(layer, n)| AffectedZone {
                layer,
                matched_features: n,
            })
            .collect();
        if affected_zones.is_empty() {
            if !zone_results.is_empty() && zone_results.iter().all(|r| r.error.is_some()) {
                notes.push("No zoning layers could be evaluated".to_string());
            } else {
                notes.push(NOTE_NO_ZONES.to_string());
            }
        }

        let affections: Vec<Affection> = hits(&affection_results)
            .map(|(layer, n)| Affection {
                kind: "general".to_string(),
                layer,
                matched_features: n,
            })
            .collect();
        if affections.is_empty() {
            notes.push(NOTE_NO_AFFECTIONS.to_string());
        }

        info!(
            reference,
            zones = affected_zones.len(),
            affections = affections.len(),
            hectares = area.hectares(),
            "urbanistic analysis complete"
        );

        AnalysisReport {
            reference: reference.to_string(),
            timestamp: Utc::now(),
            urbanistic_parameters: urbanistic_parameters(Some(&area)),
            parcel_area: Some(area),
            affected_zones,
            affections,
            recommendations: recommendations(),
            notes,
        }
    }

    /// Area in the configured metric CRS. Missing CRS metadata flags the value instead of guessing.
    fn parcel_area(&self, query: &QueryGeometry) -> ParcelArea {
        let Some(crs) = query.crs else {
            return ParcelArea::unreliable("input geometry has no CRS metadata");
        };
        match reproject_features(
            self.reprojector.as_ref(),
            &query.features,
            crs,
            self.area_crs,
        ) {
            Ok(projected) => {
                ParcelArea::measured(projected.iter().map(|f| f.geometry.unsigned_area()).sum())
            }
            Err(e) => ParcelArea::unreliable(e.to_string()),
        }
    }

    fn is_affection_layer(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

fn hits(results: &[IntersectionResult]) -> impl Iterator<Item = (String, usize)> + '_ {
    results
        .iter()
        .filter_map(|r| match r.matched_features {
            Some(n) if n > 0 => Some((r.layer.clone(), n)),
            _ => None,
        })
}

/// Placeholder coefficients scaled by parcel area; only emitted for a positive area.
fn urbanistic_parameters(area: Option<&ParcelArea>) -> UrbanisticParameters {
    let hectares = area.map(ParcelArea::hectares).unwrap_or(0.0);
    let generic = hectares > 0.0;
    UrbanisticParameters {
        parcel_area: area.cloned(),
        occupancy_coefficient: generic.then(|| GenericParameter {
            value: 0.5,
            note: "50% (generic value)".to_string(),
        }),
        buildability: generic.then(|| GenericParameter {
            value: round_to(hectares * 1.5, 2),
            note: "1.5 m²/m² (generic value)".to_string(),
        }),
        max_height: generic.then(|| GenericParameter {
            value: 12.0,
            note: "12 meters (generic value)".to_string(),
        }),
        disclaimer: GENERIC_DISCLAIMER.to_string(),
    }
}

fn recommendations() -> Vec<String> {
    RECOMMENDATIONS.iter().map(|s| s.to_string()).collect()
}
