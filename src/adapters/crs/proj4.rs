//! proj4rs-backed reprojection between the EPSG systems used by Spanish cadastre data.
//!
//! proj4rs works in radians for geographic systems; degrees are converted at the edges.

use crate::domain::{Crs, DomainError};
use crate::ports::ReprojectorPort;
use geo::{Coord, Geometry, MapCoords};
use proj4rs::proj::Proj;

/// Stateless reprojector. Projections are built per call (cheap compared to the geometry walk).
#[derive(Debug, Default, Clone, Copy)]
pub struct Proj4Reprojector;

impl Proj4Reprojector {
    pub fn new() -> Self {
        Self
    }
}

/// PROJ.4 definition for a supported EPSG code.
fn proj_string(crs: Crs) -> Result<String, DomainError> {
    let code = crs.epsg();
    let def = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        // ETRS89, REGCAN95, SIRGAS 2000: GRS80, null shift to WGS 84.
        4258 | 4081 | 4674 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
        4230 => "+proj=longlat +ellps=intl +towgs84=-87,-98,-121,0,0,0,0 +no_defs".to_string(),
        3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            .to_string(),
        // REGCAN95 / UTM 28N (Canary Islands).
        4083 => "+proj=utm +zone=28 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs".to_string(),
        // ETRS89 / UTM 28N..38N.
        25828..=25838 => format!(
            "+proj=utm +zone={} +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
            code - 25800
        ),
        // ED50 / UTM 28N..31N.
        23028..=23031 => format!(
            "+proj=utm +zone={} +ellps=intl +towgs84=-87,-98,-121,0,0,0,0 +units=m +no_defs",
            code - 23000
        ),
        // WGS 84 / UTM north and south.
        32601..=32660 => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", code - 32600),
        32701..=32760 => format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            code - 32700
        ),
        _ => return Err(DomainError::Crs(format!("unsupported CRS {}", crs))),
    };
    Ok(def)
}

fn projection(crs: Crs) -> Result<Proj, DomainError> {
    let def = proj_string(crs)?;
    Proj::from_proj_string(&def)
        .map_err(|e| DomainError::Crs(format!("invalid definition for {}: {}", crs, e)))
}

impl ReprojectorPort for Proj4Reprojector {
    fn reproject(
        &self,
        geometry: &Geometry<f64>,
        from: Crs,
        to: Crs,
    ) -> Result<Geometry<f64>, DomainError> {
        if from == to {
            return Ok(geometry.clone());
        }
        let src = projection(from)?;
        let dst = projection(to)?;
        let (src_geographic, dst_geographic) = (from.is_geographic(), to.is_geographic());
        let (src, dst) = (&src, &dst);

        geometry.try_map_coords(|c: Coord<f64>| -> Result<Coord<f64>, DomainError> {
            let mut point = if src_geographic {
                (c.x.to_radians(), c.y.to_radians(), 0.0)
            } else {
                (c.x, c.y, 0.0)
            };
            proj4rs::transform::transform(src, dst, &mut point).map_err(|e| {
                DomainError::Crs(format!("{} -> {} at ({}, {}): {}", from, to, c.x, c.y, e))
            })?;
            Ok(if dst_geographic {
                Coord {
                    x: point.0.to_degrees(),
                    y: point.1.to_degrees(),
                }
            } else {
                Coord {
                    x: point.0,
                    y: point.1,
                }
            })
        })
    }
}
