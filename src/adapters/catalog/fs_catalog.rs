//! Implements LayerCatalogPort by scanning the layer registry folder.
//!
//! Layout under the root:
//! - `gpkg/`        GeoPackage files (Shapefiles are accepted here too)
//! - `shapefiles/`  Shapefiles
//! - `wms/capas_wms.csv`  remote layer registry (`nombre`/`name`, `ruta_wms`/`url`)
//!
//! No caching: every call re-reads the directories.

use crate::adapters::vector::VectorFormat;
use crate::domain::{DomainError, LayerDescriptor};
use crate::ports::LayerCatalogPort;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub const GPKG_DIR: &str = "gpkg";
pub const SHAPEFILE_DIR: &str = "shapefiles";
pub const WMS_DIR: &str = "wms";
pub const WMS_REGISTRY: &str = "capas_wms.csv";

/// Registry row. Header names follow the original Spanish registry, English accepted.
#[derive(Debug, Deserialize)]
struct RegistryRow {
    #[serde(alias = "nombre")]
    name: Option<String>,
    #[serde(alias = "ruta_wms", alias = "reference_url", default)]
    url: Option<String>,
}

/// Filesystem catalog rooted at the configured layers directory.
pub struct FsLayerCatalog {
    root: PathBuf,
}

impl FsLayerCatalog {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `gpkg/`, `shapefiles/` and `wms/` if absent. Idempotent; failures are logged only.
    async fn ensure_structure(&self) {
        for sub in [GPKG_DIR, SHAPEFILE_DIR, WMS_DIR] {
            let dir = self.root.join(sub);
            if let Err(e) = fs::create_dir_all(&dir).await {
                warn!(path = %dir.display(), error = %e, "could not create layer directory");
            }
        }
    }

    /// (stem, path, format) for every recognized vector file directly inside `dir`.
    async fn scan_dir(dir: &Path) -> Result<Vec<(String, PathBuf, VectorFormat)>, DomainError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DomainError::Catalog(format!(
                    "read {}: {}",
                    dir.display(),
                    e
                )));
            }
        };
        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::Catalog(e.to_string()))?
        {
            let path = entry.path();
            let Some(format) = VectorFormat::from_path(&path).filter(|f| f.is_layer_format()) else {
                continue;
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            found.push((stem.to_string(), path.clone(), format));
        }
        Ok(found)
    }

    async fn read_registry(&self) -> Vec<LayerDescriptor> {
        let path = self.root.join(WMS_DIR).join(WMS_REGISTRY);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "remote layer registry unreadable");
                return Vec::new();
            }
        };
        parse_registry(&content)
    }
}

/// Parse the remote layer registry. Malformed or nameless rows are skipped and logged.
pub(crate) fn parse_registry(content: &str) -> Vec<LayerDescriptor> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut layers = Vec::new();
    for (i, row) in rdr.deserialize::<RegistryRow>().enumerate() {
        let line = i + 2;
        match row {
            Ok(RegistryRow {
                name: Some(name),
                url,
            }) if !name.is_empty() => {
                layers.push(LayerDescriptor::remote(name, url.unwrap_or_default()));
            }
            Ok(_) => warn!(line, "registry row without layer name skipped"),
            Err(e) => warn!(line, error = %e, "malformed registry row skipped"),
        }
    }
    layers
}

#[async_trait::async_trait]
impl LayerCatalogPort for FsLayerCatalog {
    async fn list_layers(&self) -> Result<Vec<LayerDescriptor>, DomainError> {
        self.ensure_structure().await;

        // name -> (path, format); GeoPackage beats Shapefile for the same name.
        let mut vectors: BTreeMap<String, (PathBuf, VectorFormat)> = BTreeMap::new();
        for sub in [GPKG_DIR, SHAPEFILE_DIR] {
            for (name, path, format) in Self::scan_dir(&self.root.join(sub)).await? {
                match vectors.get(&name) {
                    Some((_, existing)) if existing.priority() <= format.priority() => {
                        debug!(layer = %name, path = %path.display(), "shadowed by higher-priority format");
                    }
                    _ => {
                        vectors.insert(name, (path, format));
                    }
                }
            }
        }

        let mut seen: HashSet<String> = vectors.keys().cloned().collect();
        let mut layers: Vec<LayerDescriptor> = vectors
            .into_iter()
            .map(|(name, (path, _))| LayerDescriptor::vector_file(name, path))
            .collect();

        for remote in self.read_registry().await {
            if seen.insert(remote.name.clone()) {
                layers.push(remote);
            } else {
                warn!(layer = %remote.name, "duplicate layer name in registry skipped");
            }
        }
        debug!(count = layers.len(), root = %self.root.display(), "catalog scanned");
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LayerKind, LayerSource};

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[tokio::test]
    async fn test_missing_root_is_empty_and_structure_created() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("capas");
        let catalog = FsLayerCatalog::new(&root);

        let layers = catalog.list_layers().await.unwrap();
        assert!(layers.is_empty());
        for sub in [GPKG_DIR, SHAPEFILE_DIR, WMS_DIR] {
            assert!(root.join(sub).is_dir());
        }
        // Idempotent.
        assert!(catalog.list_layers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lists_vectors_sorted_then_remote() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = FsLayerCatalog::new(tmp.path());
        catalog.list_layers().await.unwrap();

        touch(&tmp.path().join(GPKG_DIR).join("zonas_inundables.gpkg"));
        touch(&tmp.path().join(GPKG_DIR).join("readme.txt"));
        touch(&tmp.path().join(SHAPEFILE_DIR).join("espacios_protegidos.shp"));
        touch(&tmp.path().join(SHAPEFILE_DIR).join("espacios_protegidos.dbf"));
        std::fs::write(
            tmp.path().join(WMS_DIR).join(WMS_REGISTRY),
            "nombre,ruta_wms\npnoa,https://www.ign.es/wms-inspire/pnoa-ma\n",
        )
        .unwrap();

        let layers = catalog.list_layers().await.unwrap();
        let names: Vec<_> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["espacios_protegidos", "zonas_inundables", "pnoa"]);
        assert_eq!(layers[2].kind, LayerKind::Remote);
        assert_eq!(
            layers[2].source,
            LayerSource::Url("https://www.ign.es/wms-inspire/pnoa-ma".into())
        );
    }

    #[tokio::test]
    async fn test_geopackage_wins_over_shapefile() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = FsLayerCatalog::new(tmp.path());
        catalog.list_layers().await.unwrap();

        touch(&tmp.path().join(SHAPEFILE_DIR).join("riesgo.shp"));
        touch(&tmp.path().join(GPKG_DIR).join("riesgo.shp"));
        touch(&tmp.path().join(GPKG_DIR).join("riesgo.gpkg"));

        let layers = catalog.list_layers().await.unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(
            layers[0].path().unwrap(),
            tmp.path().join(GPKG_DIR).join("riesgo.gpkg")
        );
    }

    #[test]
    fn test_registry_skips_bad_rows() {
        let csv = "name,url\n\
                   ,https://nameless.example/wms\n\
                   catastro,https://ovc.catastro.meh.es/ovcservweb/OVCSWMS.asmx\n\
                   too,many,columns\n\
                   pnoa,\n";
        let layers = parse_registry(csv);
        let names: Vec<_> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["catastro", "pnoa"]);
        assert_eq!(layers[1].source, LayerSource::Url(String::new()));
    }
}
