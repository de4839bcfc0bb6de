//! Coordinate reference systems, identified by EPSG code.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// EPSG-coded coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(u32);

impl Crs {
    /// WGS 84 geographic. Canonical frame for every intersection test.
    pub const WGS84: Crs = Crs(4326);
    /// ETRS89 / UTM zone 30N. Default metric frame for parcel areas (peninsular Spain).
    pub const ETRS89_UTM30N: Crs = Crs(25830);

    pub const fn from_epsg(code: u32) -> Self {
        Self(code)
    }

    pub fn epsg(self) -> u32 {
        self.0
    }

    /// Geographic (degree-based) systems handled by the reprojector.
    pub fn is_geographic(self) -> bool {
        matches!(self.0, 4326 | 4258 | 4230 | 4081 | 4674)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = DomainError;

    /// Accepts `EPSG:25830`, `epsg:25830`, `25830`, `urn:ogc:def:crs:EPSG::25830`
    /// and the OGC CRS84 URN (longitude/latitude WGS 84).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let lower = t.to_ascii_lowercase();
        if lower.ends_with("crs84") {
            return Ok(Self::WGS84);
        }
        let code = if let Some(idx) = lower.rfind("epsg") {
            lower[idx + 4..].trim_start_matches(':').to_string()
        } else {
            lower
        };
        code.parse::<u32>()
            .ok()
            .filter(|c| *c > 0)
            .map(Self)
            .ok_or_else(|| DomainError::Crs(format!("unrecognized CRS identifier '{}'", t)))
    }
}

impl Serialize for Crs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Crs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
