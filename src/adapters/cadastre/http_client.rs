//! HTTP client for the Spanish cadastre geometry endpoint.
//!
//! GET `{geo_url}?refcat={reference}&format=geojson`; the body is saved as
//! `{dest_dir}/{reference}.geojson`.

use crate::domain::{CadastralReference, DomainError};
use crate::ports::CadastrePort;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_GEO_URL: &str = "https://ovc.catastro.es/ovc/Geo.ashx";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Bodies this short carry no geometry (empty object, "null", error stubs).
const MIN_BODY_LEN: usize = 11;

pub struct CatastroHttpClient {
    client: Arc<Client>,
    geo_url: String,
}

impl CatastroHttpClient {
    pub fn new(geo_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client: Arc::new(client),
            geo_url: geo_url.into(),
        }
    }
}

fn has_geometry(body: &str) -> bool {
    body.trim().len() >= MIN_BODY_LEN
}

#[async_trait::async_trait]
impl CadastrePort for CatastroHttpClient {
    async fn fetch_geometry(
        &self,
        reference: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, DomainError> {
        let reference = CadastralReference::parse(reference)?;
        let res = self
            .client
            .get(&self.geo_url)
            .query(&[("refcat", reference.as_str()), ("format", "geojson")])
            .send()
            .await
            .map_err(|e| DomainError::Cadastre(format!("Request failed: {}", e)))?;

        if !res.status().is_success() {
            warn!(reference = %reference, status = %res.status(), "cadastre returned no geometry");
            return Ok(None);
        }
        let body = res
            .text()
            .await
            .map_err(|e| DomainError::Cadastre(format!("Read body failed: {}", e)))?;
        if !has_geometry(&body) {
            warn!(reference = %reference, bytes = body.len(), "cadastre response too short");
            return Ok(None);
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| DomainError::Cadastre(format!("create {}: {}", dest_dir.display(), e)))?;
        let path = dest_dir.join(format!("{}.geojson", reference));
        tokio::fs::write(&path, body.as_bytes())
            .await
            .map_err(|e| DomainError::Cadastre(format!("write {}: {}", path.display(), e)))?;
        info!(reference = %reference, path = %path.display(), "parcel geometry downloaded");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_bodies_have_no_geometry() {
        assert!(!has_geometry(""));
        assert!(!has_geometry("null"));
        assert!(!has_geometry("{}\n"));
        assert!(!has_geometry("0123456789"));
        assert!(has_geometry(r#"{"type":"FeatureCollection","features":[]}"#));
    }

    #[tokio::test]
    async fn test_invalid_reference_rejected_before_request() {
        let client = CatastroHttpClient::new("http://127.0.0.1:9/unreachable");
        let tmp = tempfile::tempdir().unwrap();
        let err = client.fetch_geometry("abc", tmp.path()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidReference(_)));
    }
}
