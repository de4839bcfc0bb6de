//! GeoJSON reader. Feature properties become attributes.
//!
//! The CRS comes from the legacy top-level `crs` member (`{"type":"name","properties":{"name":...}}`);
//! without it the document is WGS 84 longitude/latitude.

use crate::domain::{Attributes, Crs, DomainError, Feature, QueryGeometry};
use ::geojson::{GeoJson, JsonObject};
use tracing::warn;

pub fn parse_geojson(text: &str) -> Result<QueryGeometry, DomainError> {
    let doc: GeoJson = text
        .parse()
        .map_err(|e: ::geojson::Error| DomainError::LayerLoad(format!("invalid GeoJSON: {}", e)))?;

    let (raw, foreign) = match doc {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(f) => {
            let foreign = f.foreign_members.clone();
            (vec![f], foreign)
        }
        GeoJson::Geometry(g) => (vec![::geojson::Feature::from(g)], None),
    };

    let crs = declared_crs(foreign.as_ref())?.unwrap_or(Crs::WGS84);

    let mut features = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for f in raw {
        let Some(geometry) = f.geometry else {
            skipped += 1;
            continue;
        };
        let geometry = geo::Geometry::<f64>::try_from(geometry)
            .map_err(|e| DomainError::LayerLoad(format!("GeoJSON geometry: {}", e)))?;
        let attributes: Attributes = f.properties.unwrap_or_default();
        features.push(Feature::with_attributes(geometry, attributes));
    }
    if skipped > 0 {
        warn!(skipped, "GeoJSON features without geometry ignored");
    }
    Ok(QueryGeometry::new(features, Some(crs)))
}

fn declared_crs(foreign: Option<&JsonObject>) -> Result<Option<Crs>, DomainError> {
    let Some(name) = foreign
        .and_then(|m| m.get("crs"))
        .and_then(|c| c.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
    else {
        return Ok(None);
    };
    name.parse().map(Some)
}
