//! ESRI Shapefile reader. Blocking I/O; callers run it on the blocking pool.
//!
//! The CRS is taken from the `.prj` sidecar: an EPSG authority code when present,
//! otherwise a handful of well-known ESRI names. Unrecognized projections yield None.

use crate::domain::{Attributes, Crs, DomainError, Feature, LoadedLayer};
use ::shapefile::dbase::FieldValue;
use ::shapefile::{Reader, Shape};
use std::path::Path;
use tracing::{debug, warn};

pub fn read_shapefile(path: &Path, name: &str) -> Result<LoadedLayer, DomainError> {
    let mut reader = Reader::from_path(path)
        .map_err(|e| DomainError::LayerLoad(format!("{}: {}", path.display(), e)))?;

    let mut features = Vec::new();
    let mut skipped = 0usize;
    for item in reader.iter_shapes_and_records() {
        let (shape, record) =
            item.map_err(|e| DomainError::LayerLoad(format!("{}: {}", path.display(), e)))?;
        if matches!(shape, Shape::NullShape) {
            skipped += 1;
            continue;
        }
        let geometry = geo::Geometry::<f64>::try_from(shape)
            .map_err(|e| DomainError::LayerLoad(format!("{}: {:?}", path.display(), e)))?;
        let attributes: Attributes = record
            .into_iter()
            .map(|(field, value)| (field, field_to_json(value)))
            .collect();
        features.push(Feature::with_attributes(geometry, attributes));
    }
    if skipped > 0 {
        warn!(layer = %name, skipped, "null shapes ignored");
    }

    let crs = match std::fs::read_to_string(path.with_extension("prj")) {
        Ok(wkt) => {
            let crs = crs_from_prj(&wkt);
            if crs.is_none() {
                warn!(layer = %name, "unrecognized .prj projection");
            }
            crs
        }
        Err(_) => None,
    };
    debug!(layer = %name, features = features.len(), ?crs, "shapefile read");

    Ok(LoadedLayer {
        name: name.to_string(),
        features,
        crs,
    })
}

fn field_to_json(value: FieldValue) -> serde_json::Value {
    use serde_json::Value;
    let number = |f: f64| {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    };
    match value {
        FieldValue::Character(Some(s)) => Value::String(s.trim_end().to_string()),
        FieldValue::Numeric(Some(n)) => number(n),
        FieldValue::Float(Some(f)) => number(f64::from(f)),
        FieldValue::Integer(i) => Value::from(i),
        FieldValue::Double(d) => number(d),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Memo(s) => Value::String(s),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None) => Value::Null,
        other => Value::String(format!("{:?}", other)),
    }
}

/// EPSG code for an ESRI/OGC WKT projection string.
pub(crate) fn crs_from_prj(wkt: &str) -> Option<Crs> {
    // Outermost AUTHORITY closes the WKT, so the last one names the whole CRS.
    if let Some(idx) = wkt.rfind("AUTHORITY[\"EPSG\"") {
        let code: String = wkt[idx..]
            .chars()
            .skip_while(|c| *c != ',')
            .skip(1)
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = code.parse::<u32>() {
            return Some(Crs::from_epsg(code));
        }
    }

    let name = wkt
        .split('"')
        .nth(1)
        .unwrap_or_default()
        .replace(' ', "_")
        .to_ascii_uppercase();
    let utm_zone = |prefix: &str| -> Option<u32> {
        let rest = name.strip_prefix(prefix)?;
        let zone: u32 = rest.strip_suffix('N')?.parse().ok()?;
        (1..=60).contains(&zone).then_some(zone)
    };

    if let Some(zone) = utm_zone("ETRS_1989_UTM_ZONE_").or_else(|| utm_zone("ETRS89_/_UTM_ZONE_")) {
        return Some(Crs::from_epsg(25800 + zone));
    }
    if let Some(zone) = utm_zone("ED_1950_UTM_ZONE_").or_else(|| utm_zone("ED50_/_UTM_ZONE_")) {
        return Some(Crs::from_epsg(23000 + zone));
    }
    if let Some(zone) = utm_zone("WGS_1984_UTM_ZONE_").or_else(|| utm_zone("WGS_84_/_UTM_ZONE_")) {
        return Some(Crs::from_epsg(32600 + zone));
    }
    if name.contains("PSEUDO_MERCATOR") || name.contains("WEB_MERCATOR") {
        return Some(Crs::from_epsg(3857));
    }
    if wkt.trim_start().starts_with("GEOGCS") {
        return match name.as_str() {
            "GCS_WGS_1984" | "WGS_84" => Some(Crs::WGS84),
            "GCS_ETRS_1989" | "ETRS89" => Some(Crs::from_epsg(4258)),
            "GCS_EUROPEAN_1950" | "ED50" => Some(Crs::from_epsg(4230)),
            _ => None,
        };
    }
    None
}
