//! Process-lifetime layer cache: lazy load on first access, never evicts.
//!
//! - One slot per catalog layer; the map lock is held only to find/insert a slot
//! - Concurrent first accesses to the same name share a single load
//! - Failed or timed-out loads leave the slot empty, so the next call retries
//! - Each slot also memoizes the EPSG:4326 rendition used by the intersection engine

use crate::domain::{Crs, DomainError, LayerDescriptor, LoadedLayer};
use crate::ports::{LayerCatalogPort, LayerReaderPort, ReprojectorPort};
use crate::usecases::intersection_service::reproject_features;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Default bound on a single layer load (multi-gigabyte files).
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Default)]
struct LayerSlot {
    source: OnceCell<Arc<LoadedLayer>>,
    /// Same features in EPSG:4326. Shares `source` when no reprojection is needed.
    canonical: OnceCell<Arc<LoadedLayer>>,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Layer cache. Constructed by the composition root and shared via Arc.
pub struct LayerCache {
    catalog: Arc<dyn LayerCatalogPort>,
    reader: Arc<dyn LayerReaderPort>,
    load_timeout: Duration,
    slots: RwLock<HashMap<String, Arc<LayerSlot>>>,
}

impl LayerCache {
    pub fn new(
        catalog: Arc<dyn LayerCatalogPort>,
        reader: Arc<dyn LayerReaderPort>,
        load_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            reader,
            load_timeout,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached layer, loading it on first access.
    ///
    /// Errors: `NotFound` (not in catalog, or remote-only), `LayerLoad`, `LoadTimeout`.
    /// None of them are cached.
    pub async fn get_layer(&self, name: &str) -> Result<Arc<LoadedLayer>, DomainError> {
        Ok(Arc::clone(&self.loaded_slot(name).await?.1))
    }

    /// The layer with every feature in EPSG:4326, reprojected at most once per layer.
    /// A layer without CRS metadata is taken as EPSG:4326.
    pub async fn get_canonical_layer(
        &self,
        name: &str,
        reprojector: &Arc<dyn ReprojectorPort>,
    ) -> Result<Arc<LoadedLayer>, DomainError> {
        let (slot, source) = self.loaded_slot(name).await?;
        let layer = slot
            .canonical
            .get_or_try_init(|| self.canonicalize(source, Arc::clone(reprojector)))
            .await?;
        Ok(Arc::clone(layer))
    }

    /// Names of layers currently resident, sorted.
    pub async fn cached_layers(&self) -> Vec<String> {
        let slots = self.slots.read().await;
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.source.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    async fn loaded_slot(
        &self,
        name: &str,
    ) -> Result<(Arc<LayerSlot>, Arc<LoadedLayer>), DomainError> {
        if let Some(slot) = self.slots.read().await.get(name) {
            if let Some(layer) = slot.source.get() {
                debug!(layer = %name, "layer cache hit");
                return Ok((Arc::clone(slot), Arc::clone(layer)));
            }
        }

        // Slots exist only for names the catalog knows.
        let descriptor = self
            .catalog
            .list_layers()
            .await?
            .into_iter()
            .find(|d| d.name == name && d.is_vector())
            .ok_or_else(|| DomainError::NotFound(name.to_string()))?;

        let slot = {
            let mut slots = self.slots.write().await;
            Arc::clone(slots.entry(name.to_string()).or_default())
        };
        let layer = slot.source.get_or_try_init(|| self.load(&descriptor)).await?;
        let layer = Arc::clone(layer);
        Ok((slot, layer))
    }

    async fn load(&self, descriptor: &LayerDescriptor) -> Result<Arc<LoadedLayer>, DomainError> {
        let name = descriptor.name.as_str();
        let started = Instant::now();
        let loaded = tokio::time::timeout(self.load_timeout, self.reader.read_layer(descriptor))
            .await
            .map_err(|_| DomainError::LoadTimeout {
                layer: name.to_string(),
                seconds: self.load_timeout.as_secs(),
            })
            .and_then(|r| r);

        match loaded {
            Ok(layer) => {
                info!(
                    layer = %name,
                    features = layer.len(),
                    crs = ?layer.crs,
                    elapsed_ms = elapsed_ms(started),
                    "layer loaded into cache"
                );
                Ok(Arc::new(layer))
            }
            Err(e) => {
                warn!(layer = %name, error = %e, "layer load failed (not cached)");
                Err(e)
            }
        }
    }

    async fn canonicalize(
        &self,
        source: Arc<LoadedLayer>,
        reprojector: Arc<dyn ReprojectorPort>,
    ) -> Result<Arc<LoadedLayer>, DomainError> {
        let crs = source.crs.unwrap_or_else(|| {
            warn!(layer = %source.name, "layer has no CRS metadata; assuming EPSG:4326");
            Crs::WGS84
        });
        if crs == Crs::WGS84 {
            return Ok(source);
        }

        let started = Instant::now();
        let name = source.name.clone();
        let reprojected = tokio::task::spawn_blocking(move || {
            reproject_features(reprojector.as_ref(), &source.features, crs, Crs::WGS84).map(
                |features| LoadedLayer {
                    name: source.name.clone(),
                    features,
                    crs: Some(Crs::WGS84),
                },
            )
        })
        .await
        .map_err(|e| DomainError::Crs(format!("reprojection task failed: {}", e)))?
        .map_err(|e| {
            warn!(layer = %name, error = %e, "layer reprojection failed (not cached)");
            e
        })?;

        info!(
            layer = %name,
            from = %crs,
            elapsed_ms = elapsed_ms(started),
            "layer reprojected to EPSG:4326"
        );
        Ok(Arc::new(reprojected))
    }
}
