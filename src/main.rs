//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run UI.
//! No business logic here.

use catastro_gis::adapters::cadastre::CatastroHttpClient;
use catastro_gis::adapters::catalog::FsLayerCatalog;
use catastro_gis::adapters::crs::Proj4Reprojector;
use catastro_gis::adapters::report::{JsonReportWriter, MarkdownCertificate};
use catastro_gis::adapters::ui::tui::TuiInputPort;
use catastro_gis::adapters::vector::VectorFileReader;
use catastro_gis::ports::{
    CadastrePort, GeometrySourcePort, InputPort, LayerCatalogPort, LayerReaderPort,
    ReportRendererPort, ReprojectorPort,
};
use catastro_gis::shared::config::AppConfig;
use catastro_gis::usecases::{IntersectionEngine, LayerCache, UrbanAnalyzer};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    catastro_gis::adapters::ui::init_ui();

    let cfg = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "invalid configuration, using defaults");
        AppConfig::default()
    });

    let layers_dir = cfg.layers_dir_or_default();
    let output_dir = cfg.output_dir_or_default();
    let temp_dir = cfg.temp_dir_or_default();
    for dir in [&output_dir, &temp_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| anyhow::anyhow!("create {}: {}", dir.display(), e))?;
    }
    info!(
        layers = %layers_dir.display(),
        output = %output_dir.display(),
        temp = %temp_dir.display(),
        "directories"
    );

    // --- Outbound adapters ---
    let catalog: Arc<dyn LayerCatalogPort> = Arc::new(FsLayerCatalog::new(&layers_dir));
    let vector_reader = Arc::new(VectorFileReader::new());
    let reader: Arc<dyn LayerReaderPort> = Arc::clone(&vector_reader) as Arc<dyn LayerReaderPort>;
    let source: Arc<dyn GeometrySourcePort> = vector_reader;
    let reprojector: Arc<dyn ReprojectorPort> = Arc::new(Proj4Reprojector::new());
    let cadastre: Arc<dyn CadastrePort> =
        Arc::new(CatastroHttpClient::new(cfg.cadastre_geo_url_or_default()));
    let renderers: Vec<Arc<dyn ReportRendererPort>> = vec![
        Arc::new(MarkdownCertificate::new()),
        Arc::new(JsonReportWriter::new()),
    ];

    // --- Layer cache: one per process, shared by every service ---
    let load_timeout = cfg.load_timeout_or_default();
    let cache = Arc::new(LayerCache::new(
        Arc::clone(&catalog),
        reader,
        load_timeout,
    ));
    info!(load_timeout_secs = load_timeout.as_secs(), "layer cache ready");

    // --- Services ---
    let max_concurrent = cfg.max_concurrent_scans_or_default();
    let engine = IntersectionEngine::new(
        catalog,
        cache,
        Arc::clone(&reprojector),
        Arc::clone(&source),
        max_concurrent,
    );
    let area_crs = cfg.area_crs_or_default();
    let keywords = cfg.affection_keywords_or_default();
    info!(max_concurrent, %area_crs, ?keywords, "intersection engine ready");
    let analyzer = Arc::new(UrbanAnalyzer::new(
        engine.clone(),
        source,
        reprojector,
        area_crs,
        keywords,
    ));

    let input_port: Arc<dyn InputPort> = Arc::new(TuiInputPort::new(
        engine, analyzer, cadastre, renderers, output_dir, temp_dir,
    ));

    // --- Run (main menu -> Analyze parcel / Scan file / Check point / List layers) ---
    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
