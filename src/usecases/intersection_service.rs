//! Spatial intersection engine: CRS reconciliation + spatial join per (query, layer).
//!
//! - Query and layer are both brought to EPSG:4326 before any predicate is evaluated
//! - Per-layer failures become `IntersectionResult.error`; a batch never aborts on one layer
//! - Multi-layer scans fan out over a bounded pool and return results in catalog order

use crate::domain::spatial::count_matches;
use crate::domain::{
    Crs, DomainError, Feature, IntersectionReport, IntersectionResult, LayerSummary, PointCheck,
    Predicate, QueryGeometry,
};
use crate::ports::{GeometrySourcePort, LayerCatalogPort, ReprojectorPort};
use crate::usecases::layer_cache::LayerCache;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default number of layers compared concurrently.
pub const DEFAULT_MAX_CONCURRENT_SCANS: usize = 4;

/// File name of the bulk scan result written by `analyze_file`.
pub const INTERSECTIONS_FILE: &str = "intersections.json";

/// Intersection engine. Cheap to clone (shared handles only).
#[derive(Clone)]
pub struct IntersectionEngine {
    catalog: Arc<dyn LayerCatalogPort>,
    cache: Arc<LayerCache>,
    reprojector: Arc<dyn ReprojectorPort>,
    source: Arc<dyn GeometrySourcePort>,
    max_concurrent: usize,
}

impl IntersectionEngine {
    pub fn new(
        catalog: Arc<dyn LayerCatalogPort>,
        cache: Arc<LayerCache>,
        reprojector: Arc<dyn ReprojectorPort>,
        source: Arc<dyn GeometrySourcePort>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            catalog,
            cache,
            reprojector,
            source,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Compare `query` against one layer. Never fails: errors are carried in the result.
    pub async fn intersect(
        &self,
        query: &QueryGeometry,
        layer: &str,
        predicate: Predicate,
    ) -> IntersectionResult {
        match self.try_intersect(query, layer, predicate).await {
            Ok(count) => {
                debug!(layer, ?predicate, count, "intersection computed");
                IntersectionResult::matched(layer, count)
            }
            Err(e) => {
                warn!(layer, error = %e, "intersection failed for layer");
                IntersectionResult::failed(layer, &e)
            }
        }
    }

    async fn try_intersect(
        &self,
        query: &QueryGeometry,
        layer: &str,
        predicate: Predicate,
    ) -> Result<usize, DomainError> {
        let targets = self
            .cache
            .get_canonical_layer(layer, &self.reprojector)
            .await?;
        let query_features = to_canonical(
            self.reprojector.as_ref(),
            &query.features,
            query.effective_crs(),
        )?;

        // The join is CPU-bound over possibly huge layers.
        tokio::task::spawn_blocking(move || {
            count_matches(&query_features, &targets.features, predicate)
        })
        .await
        .map_err(|e| DomainError::Geometry(format!("join task failed: {}", e)))?
    }

    /// Compare `query` against every layer in `layers`, concurrently.
    /// Output order equals input order regardless of completion order.
    pub async fn scan(
        &self,
        query: &QueryGeometry,
        layers: Vec<String>,
        predicate: Predicate,
    ) -> Vec<IntersectionResult> {
        // Normalize once so each layer task skips query reprojection.
        let query = match to_canonical(
            self.reprojector.as_ref(),
            &query.features,
            query.effective_crs(),
        ) {
            Ok(features) => Arc::new(QueryGeometry::new(features, Some(Crs::WGS84))),
            Err(e) => {
                warn!(error = %e, "query reprojection failed; every layer reports it");
                return layers
                    .into_iter()
                    .map(|name| IntersectionResult::failed(name, &e))
                    .collect();
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let handles: Vec<_> = layers
            .into_iter()
            .map(|name| {
                let engine = self.clone();
                let query = Arc::clone(&query);
                let sem = Arc::clone(&semaphore);
                let task_name = name.clone();
                let handle = tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await;
                    engine.intersect(&query, &task_name, predicate).await
                });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(IntersectionResult::failed(
                    name,
                    &DomainError::Geometry(format!("scan task failed: {}", e)),
                )),
            }
        }
        results
    }

    /// Names of loadable (vector file) layers, in catalog order.
    pub async fn vector_layers(&self) -> Result<Vec<String>, DomainError> {
        Ok(self
            .catalog
            .list_layers()
            .await?
            .into_iter()
            .filter(|d| d.is_vector())
            .map(|d| d.name)
            .collect())
    }

    /// Scan an input file against every vector layer with `Intersects`.
    ///
    /// Failed layers are kept as error entries. When `output_dir` is given the
    /// report is also written there as `intersections.json`.
    pub async fn analyze_file(
        &self,
        path: &Path,
        output_dir: Option<&Path>,
    ) -> Result<IntersectionReport, DomainError> {
        info!(path = %path.display(), "scanning input file against catalog");
        let query = self.source.load(path).await?;
        let layers = self.vector_layers().await?;
        let intersections = self
            .scan(&query, layers.clone(), Predicate::Intersects)
            .await;

        let report = IntersectionReport {
            input_file: path.to_path_buf(),
            timestamp: Utc::now(),
            input_features: query.len(),
            layers_analyzed: layers,
            intersections,
        };

        if let Some(dir) = output_dir {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| DomainError::Report(format!("create output dir: {}", e)))?;
            let out = dir.join(INTERSECTIONS_FILE);
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| DomainError::Report(e.to_string()))?;
            fs::write(&out, json)
                .await
                .map_err(|e| DomainError::Report(format!("write {}: {}", out.display(), e)))?;
            info!(path = %out.display(), "intersection report written");
        }
        Ok(report)
    }

    /// Point-in-polygon membership (WGS 84 lon/lat) over every vector layer.
    /// Only layers containing the point are listed.
    pub async fn check_point(&self, lon: f64, lat: f64) -> Result<PointCheck, DomainError> {
        let query = QueryGeometry::point(lon, lat);
        let layers = self.vector_layers().await?;
        let affected_layers = self
            .scan(&query, layers, Predicate::Within)
            .await
            .into_iter()
            .filter(IntersectionResult::is_hit)
            .collect();
        Ok(PointCheck {
            lon,
            lat,
            affected_layers,
        })
    }

    /// Catalog listing with feature counts; vector layers are loaded through the cache.
    pub async fn describe_layers(&self) -> Result<Vec<LayerSummary>, DomainError> {
        let descriptors = self.catalog.list_layers().await?;
        let mut summaries = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let summary = if descriptor.is_vector() {
                match self.cache.get_layer(&descriptor.name).await {
                    Ok(layer) => LayerSummary {
                        feature_count: Some(layer.len()),
                        error: None,
                        descriptor,
                    },
                    Err(e) => LayerSummary {
                        feature_count: None,
                        error: Some(e.to_string()),
                        descriptor,
                    },
                }
            } else {
                LayerSummary {
                    descriptor,
                    feature_count: None,
                    error: None,
                }
            };
            summaries.push(summary);
        }
        Ok(summaries)
    }
}

/// Reproject features into EPSG:4326 (no-op when already there).
pub(crate) fn to_canonical(
    reprojector: &dyn ReprojectorPort,
    features: &[Feature],
    from: Crs,
) -> Result<Vec<Feature>, DomainError> {
    reproject_features(reprojector, features, from, Crs::WGS84)
}

pub(crate) fn reproject_features(
    reprojector: &dyn ReprojectorPort,
    features: &[Feature],
    from: Crs,
    to: Crs,
) -> Result<Vec<Feature>, DomainError> {
    if from == to {
        return Ok(features.to_vec());
    }
    features
        .iter()
        .map(|f| {
            Ok(Feature::with_attributes(
                reprojector.reproject(&f.geometry, from, to)?,
                f.attributes.clone(),
            ))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::crs::Proj4Reprojector;
    use crate::domain::{LayerDescriptor, LoadedLayer};
    use crate::ports::LayerReaderPort;
    use crate::usecases::layer_cache::DEFAULT_LOAD_TIMEOUT;
    use crate::usecases::layer_cache::tests::StaticCatalog;
    use geo::{Geometry, polygon};
    use std::collections::HashMap;
    use std::time::Duration;

    pub(crate) fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]
        .into()
    }

    /// Reader serving fixed in-memory layers; unknown names fail to load.
    pub(crate) struct MapReader {
        pub layers: HashMap<String, LoadedLayer>,
        pub delays: HashMap<String, Duration>,
    }

    impl MapReader {
        pub(crate) fn new(layers: Vec<LoadedLayer>) -> Self {
            Self {
                layers: layers.into_iter().map(|l| (l.name.clone(), l)).collect(),
                delays: HashMap::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl LayerReaderPort for MapReader {
        async fn read_layer(&self, d: &LayerDescriptor) -> Result<LoadedLayer, DomainError> {
            if let Some(delay) = self.delays.get(&d.name) {
                tokio::time::sleep(*delay).await;
            }
            self.layers
                .get(&d.name)
                .cloned()
                .ok_or_else(|| DomainError::LayerLoad(format!("no data for {}", d.name)))
        }
    }

    /// Geometry source returning a fixed query for any path.
    pub(crate) struct FixedSource(pub Option<QueryGeometry>);

    #[async_trait::async_trait]
    impl GeometrySourcePort for FixedSource {
        async fn load(&self, path: &Path) -> Result<QueryGeometry, DomainError> {
            self.0
                .clone()
                .ok_or_else(|| DomainError::GeometrySource(path.display().to_string()))
        }
    }

    pub(crate) fn layer(name: &str, geometries: Vec<Geometry<f64>>, crs: Option<Crs>) -> LoadedLayer {
        LoadedLayer {
            name: name.to_string(),
            features: geometries.into_iter().map(Feature::new).collect(),
            crs,
        }
    }

    pub(crate) fn engine_with(
        catalog_names: &[&str],
        reader: MapReader,
        query: Option<QueryGeometry>,
    ) -> IntersectionEngine {
        let catalog: Arc<dyn LayerCatalogPort> = Arc::new(StaticCatalog::new(catalog_names));
        let cache = Arc::new(LayerCache::new(
            Arc::clone(&catalog),
            Arc::new(reader),
            DEFAULT_LOAD_TIMEOUT,
        ));
        IntersectionEngine::new(
            catalog,
            cache,
            Arc::new(Proj4Reprojector::new()),
            Arc::new(FixedSource(query)),
            DEFAULT_MAX_CONCURRENT_SCANS,
        )
    }

    fn query(geometries: Vec<Geometry<f64>>) -> QueryGeometry {
        QueryGeometry::new(geometries.into_iter().map(Feature::new).collect(), None)
    }

    #[tokio::test]
    async fn test_inside_polygon_within_and_intersects() {
        let reader = MapReader::new(vec![layer(
            "zone",
            vec![square(-4.0, 40.0, 1.0)],
            Some(Crs::WGS84),
        )]);
        let engine = engine_with(&["zone"], reader, None);
        let q = query(vec![square(-3.8, 40.2, 0.01)]);

        let within = engine.intersect(&q, "zone", Predicate::Within).await;
        let intersects = engine.intersect(&q, "zone", Predicate::Intersects).await;
        assert_eq!(within.matched_features, Some(1));
        assert_eq!(intersects.matched_features, Some(1));
    }

    #[tokio::test]
    async fn test_missing_layer_is_reported_not_raised() {
        let engine = engine_with(&["zone"], MapReader::new(vec![]), None);
        let q = query(vec![square(0.0, 0.0, 1.0)]);

        let missing = engine.intersect(&q, "nope", Predicate::Intersects).await;
        assert!(missing.matched_features.is_none());
        assert!(missing.error.unwrap().contains("not found"));

        let unreadable = engine.intersect(&q, "zone", Predicate::Intersects).await;
        assert!(unreadable.error.unwrap().contains("no data"));
    }

    #[tokio::test]
    async fn test_projected_layer_is_reconciled_to_wgs84() {
        // 2 km square around Madrid in ETRS89 / UTM 30N.
        let reader = MapReader::new(vec![layer(
            "utm_zone",
            vec![square(439_000.0, 4_473_000.0, 2_000.0)],
            Some(Crs::ETRS89_UTM30N),
        )]);
        let engine = engine_with(&["utm_zone"], reader, None);
        let q = QueryGeometry::point(-3.7038, 40.4168);

        let r = engine.intersect(&q, "utm_zone", Predicate::Within).await;
        assert_eq!(r.matched_features, Some(1), "{:?}", r.error);
    }

    #[tokio::test]
    async fn test_projected_query_is_reconciled_to_wgs84() {
        let reader = MapReader::new(vec![layer(
            "geo_zone",
            vec![square(-3.8, 40.3, 0.2)],
            Some(Crs::WGS84),
        )]);
        let engine = engine_with(&["geo_zone"], reader, None);
        let q = QueryGeometry::new(
            vec![Feature::new(square(440_000.0, 4_474_000.0, 50.0))],
            Some(Crs::ETRS89_UTM30N),
        );

        let r = engine.intersect(&q, "geo_zone", Predicate::Intersects).await;
        assert_eq!(r.matched_features, Some(1), "{:?}", r.error);
    }

    #[tokio::test]
    async fn test_count_never_exceeds_query_features() {
        let reader = MapReader::new(vec![layer(
            "zone",
            vec![square(0.0, 0.0, 10.0), square(1.0, 1.0, 2.0)],
            None,
        )]);
        let engine = engine_with(&["zone"], reader, None);
        let q = query(vec![
            square(1.5, 1.5, 0.5),
            square(5.0, 5.0, 0.5),
            square(50.0, 50.0, 0.5),
        ]);

        let r = engine.intersect(&q, "zone", Predicate::Intersects).await;
        let n = r.matched_features.unwrap();
        assert_eq!(n, 2);
        assert!(n <= q.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scan_preserves_catalog_order() {
        let mut reader = MapReader::new(vec![
            layer("slow", vec![square(0.0, 0.0, 10.0)], None),
            layer("fast", vec![square(0.0, 0.0, 10.0)], None),
            layer("disjoint", vec![square(50.0, 50.0, 1.0)], None),
        ]);
        reader
            .delays
            .insert("slow".to_string(), Duration::from_millis(100));
        let engine = engine_with(&["slow", "missing", "fast", "disjoint"], reader, None);
        let q = query(vec![square(1.0, 1.0, 1.0)]);

        let layers = vec![
            "slow".to_string(),
            "missing".to_string(),
            "fast".to_string(),
            "disjoint".to_string(),
        ];
        let results = engine.scan(&q, layers, Predicate::Intersects).await;

        let names: Vec<_> = results.iter().map(|r| r.layer.as_str()).collect();
        assert_eq!(names, vec!["slow", "missing", "fast", "disjoint"]);
        assert_eq!(results[0].matched_features, Some(1));
        assert!(results[1].error.is_some());
        assert_eq!(results[2].matched_features, Some(1));
        assert_eq!(results[3].matched_features, Some(0));
    }

    #[tokio::test]
    async fn test_invalid_geometry_isolated_to_its_layer() {
        let bad = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ];
        let reader = MapReader::new(vec![
            layer("broken", vec![bad.into()], None),
            layer("good", vec![square(0.0, 0.0, 10.0)], None),
        ]);
        let engine = engine_with(&["broken", "good"], reader, None);
        let q = query(vec![square(1.0, 1.0, 1.0)]);

        let results = engine
            .scan(
                &q,
                vec!["broken".to_string(), "good".to_string()],
                Predicate::Intersects,
            )
            .await;
        assert!(results[0].error.as_deref().unwrap().contains("Geometry error"));
        assert_eq!(results[1].matched_features, Some(1));
    }

    #[tokio::test]
    async fn test_check_point_lists_only_containing_layers() {
        let reader = MapReader::new(vec![
            layer("inside", vec![square(-4.0, 40.0, 1.0)], Some(Crs::WGS84)),
            layer("outside", vec![square(2.0, 41.0, 1.0)], Some(Crs::WGS84)),
        ]);
        let engine = engine_with(&["inside", "outside"], reader, None);

        let check = engine.check_point(-3.5, 40.5).await.unwrap();
        assert_eq!(check.affected_layers.len(), 1);
        assert_eq!(check.affected_layers[0].layer, "inside");
    }

    #[tokio::test]
    async fn test_analyze_file_writes_report_with_errors_kept() {
        let reader = MapReader::new(vec![layer("zone", vec![square(0.0, 0.0, 10.0)], None)]);
        let engine = engine_with(
            &["zone", "unreadable"],
            reader,
            Some(query(vec![square(1.0, 1.0, 1.0)])),
        );
        let out = tempfile::tempdir().unwrap();

        let report = engine
            .analyze_file(Path::new("parcel.geojson"), Some(out.path()))
            .await
            .unwrap();
        assert_eq!(report.input_features, 1);
        assert_eq!(report.layers_analyzed, vec!["zone", "unreadable"]);
        assert_eq!(report.intersections[0].matched_features, Some(1));
        assert!(report.intersections[1].error.is_some());

        let written = std::fs::read_to_string(out.path().join(INTERSECTIONS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(json["intersections"][0]["layer"], "zone");
    }

    #[tokio::test]
    async fn test_describe_layers_counts_features() {
        let reader = MapReader::new(vec![layer(
            "zone",
            vec![square(0.0, 0.0, 1.0), square(5.0, 5.0, 1.0)],
            None,
        )]);
        let engine = engine_with(&["zone", "ghost"], reader, None);

        let summaries = engine.describe_layers().await.unwrap();
        assert_eq!(summaries[0].feature_count, Some(2));
        assert!(summaries[1].error.is_some());
    }
}
