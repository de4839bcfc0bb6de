//! GeoPackage reader via libsql. Reads the first feature table listed in
//! `gpkg_geometry_columns`; geometry blobs are decoded with geozero.

use crate::domain::{Attributes, Crs, DomainError, Feature, LoadedLayer};
use geozero::ToGeo;
use geozero::wkb::GpkgWkb;
use libsql::{Connection, Value, params};
use std::path::Path;
use tracing::{debug, warn};

const GEOMETRY_COLUMNS: &str = "SELECT table_name, column_name, srs_id FROM gpkg_geometry_columns ORDER BY table_name LIMIT 1";
const SPATIAL_REF_SYS: &str = "SELECT organization, organization_coordsys_id FROM gpkg_spatial_ref_sys WHERE srs_id = ?1";

fn load_err(path: &Path, e: impl std::fmt::Display) -> DomainError {
    DomainError::LayerLoad(format!("{}: {}", path.display(), e))
}

pub async fn read_gpkg(path: &Path, name: &str) -> Result<LoadedLayer, DomainError> {
    let path_str = path.to_string_lossy();
    let db = libsql::Builder::new_local(path_str.as_ref())
        .build()
        .await
        .map_err(|e| load_err(path, e))?;
    let conn = db.connect().map_err(|e| load_err(path, e))?;

    let mut rows = conn
        .query(GEOMETRY_COLUMNS, ())
        .await
        .map_err(|e| load_err(path, format!("not a GeoPackage ({})", e)))?;
    let row = rows
        .next()
        .await
        .map_err(|e| load_err(path, e))?
        .ok_or_else(|| load_err(path, "no feature table"))?;
    let table: String = row.get(0).map_err(|e| load_err(path, e))?;
    let geom_column: String = row.get(1).map_err(|e| load_err(path, e))?;
    let srs_id: i64 = row.get(2).map_err(|e| load_err(path, e))?;

    let crs = resolve_srs(&conn, srs_id).await.map_err(|e| load_err(path, e))?;

    let sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
    let mut rows = conn.query(&sql, ()).await.map_err(|e| load_err(path, e))?;
    let columns: Vec<String> = (0..rows.column_count())
        .map(|i| rows.column_name(i).unwrap_or_default().to_string())
        .collect();

    let mut features = Vec::new();
    let mut skipped = 0usize;
    while let Some(row) = rows.next().await.map_err(|e| load_err(path, e))? {
        let mut geometry = None;
        let mut attributes = Attributes::new();
        for (i, column) in columns.iter().enumerate() {
            let value = row.get_value(i as i32).map_err(|e| load_err(path, e))?;
            if *column == geom_column {
                if let Value::Blob(blob) = value {
                    geometry = GpkgWkb(blob).to_geo().ok();
                }
                continue;
            }
            attributes.insert(column.clone(), to_json(value));
        }
        match geometry {
            Some(g) => features.push(Feature::with_attributes(g, attributes)),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(layer = %name, skipped, "GeoPackage rows with empty or undecodable geometry ignored");
    }
    debug!(layer = %name, table = %table, features = features.len(), ?crs, "GeoPackage read");

    Ok(LoadedLayer {
        name: name.to_string(),
        features,
        crs,
    })
}

/// EPSG code for a GeoPackage srs_id. The reserved ids 0 and -1 (undefined) map to None.
async fn resolve_srs(conn: &Connection, srs_id: i64) -> Result<Option<Crs>, libsql::Error> {
    if srs_id <= 0 {
        return Ok(None);
    }
    let mut rows = conn.query(SPATIAL_REF_SYS, params![srs_id]).await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    let organization: String = row.get::<String>(0).unwrap_or_default();
    let code: i64 = row.get(1)?;
    if organization.eq_ignore_ascii_case("epsg") && code > 0 {
        Ok(u32::try_from(code).ok().map(Crs::from_epsg))
    } else {
        Ok(None)
    }
}

fn to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => i.into(),
        Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s),
        Value::Blob(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Standard GeoPackage header (magic, version, flags=little-endian/no envelope, srs_id)
    /// followed by an ISO WKB polygon.
    fn gpkg_polygon(srs_id: i32, ring: &[(f64, f64)]) -> Vec<u8> {
        let mut blob = vec![b'G', b'P', 0, 0x01];
        blob.extend_from_slice(&srs_id.to_le_bytes());
        blob.push(1);
        blob.extend_from_slice(&3u32.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes());
        blob.extend_from_slice(&(ring.len() as u32).to_le_bytes());
        for (x, y) in ring {
            blob.extend_from_slice(&x.to_le_bytes());
            blob.extend_from_slice(&y.to_le_bytes());
        }
        blob
    }

    /// GeoPackage with table `zonas` (EPSG:25830): `rows` copies of a 100 m square
    /// plus one row without geometry.
    pub(crate) async fn build_gpkg(path: &Path, rows: usize) {
        let db = libsql::Builder::new_local(path.to_string_lossy().as_ref())
            .build()
            .await
            .unwrap();
        let conn = db.connect().unwrap();
        conn.execute(
            "CREATE TABLE gpkg_spatial_ref_sys (srs_name TEXT, srs_id INTEGER PRIMARY KEY, organization TEXT, organization_coordsys_id INTEGER, definition TEXT)",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO gpkg_spatial_ref_sys VALUES ('ETRS89 / UTM zone 30N', 25830, 'EPSG', 25830, '')",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT, geometry_type_name TEXT, srs_id INTEGER, z INTEGER, m INTEGER)",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO gpkg_geometry_columns VALUES ('zonas', 'geom', 'POLYGON', 25830, 0, 0)",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "CREATE TABLE zonas (fid INTEGER PRIMARY KEY, geom BLOB, tipo TEXT, superficie REAL)",
            (),
        )
        .await
        .unwrap();
        let square = gpkg_polygon(
            25830,
            &[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0), (0.0, 0.0)],
        );
        conn.execute(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < ?2) \
             INSERT INTO zonas (geom, tipo, superficie) SELECT ?1, 'urbano', 10000.0 FROM n",
            params![square, rows as i64],
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO zonas (geom, tipo, superficie) VALUES (NULL, 'vacio', 0.0)",
            (),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_reads_features_crs_and_attributes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("zonas.gpkg");
        build_gpkg(&path, 1).await;

        let layer = read_gpkg(&path, "zonas").await.unwrap();
        assert_eq!(layer.name, "zonas");
        assert_eq!(layer.crs, Some(Crs::ETRS89_UTM30N));
        assert_eq!(layer.len(), 1);
        let f = &layer.features[0];
        assert!(matches!(f.geometry, geo::Geometry::Polygon(_)));
        assert_eq!(f.attributes["tipo"], "urbano");
        assert_eq!(f.attributes["superficie"], 10000.0);
        assert!(!f.attributes.contains_key("geom"));
    }

    #[tokio::test]
    async fn test_plain_sqlite_is_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plain.gpkg");
        let db = libsql::Builder::new_local(path.to_string_lossy().as_ref())
            .build()
            .await
            .unwrap();
        db.connect()
            .unwrap()
            .execute("CREATE TABLE t (x INTEGER)", ())
            .await
            .unwrap();

        let err = read_gpkg(&path, "plain").await.unwrap_err();
        assert!(matches!(err, DomainError::LayerLoad(_)));
    }
}
