//! Implements InputPort. Inquire-based interactive menu.

use crate::adapters::ui::progress::spinner;
use crate::domain::{CadastralReference, DomainError, IntersectionResult};
use crate::ports::{CadastrePort, InputPort, ReportRendererPort};
use crate::usecases::{IntersectionEngine, UrbanAnalyzer};
use async_trait::async_trait;
use inquire::error::InquireError;
use inquire::ui::{Color, RenderConfig, Styled};
use inquire::{CustomType, Select, Text};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

/// Prompt prefix and highlight colors for every inquire prompt.
pub fn apply_theme() {
    let config = RenderConfig::default()
        .with_prompt_prefix(Styled::new("›").with_fg(Color::LightGreen))
        .with_highlighted_option_prefix(Styled::new("»").with_fg(Color::LightYellow));
    inquire::set_global_render_config(config);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    AnalyzeParcel,
    ScanFile,
    CheckPoint,
    ListLayers,
    Exit,
}

impl MenuAction {
    const ALL: [MenuAction; 5] = [
        Self::AnalyzeParcel,
        Self::ScanFile,
        Self::CheckPoint,
        Self::ListLayers,
        Self::Exit,
    ];
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AnalyzeParcel => "Analyze parcel (cadastral reference)",
            Self::ScanFile => "Scan a vector file against all layers",
            Self::CheckPoint => "Check a point (lon/lat)",
            Self::ListLayers => "List layers",
            Self::Exit => "Exit",
        })
    }
}

/// Escape / Ctrl-C on a prompt returns to the menu instead of aborting.
fn is_cancel(e: &InquireError) -> bool {
    matches!(
        e,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

fn ui_err(e: InquireError) -> DomainError {
    DomainError::Ui(e.to_string())
}

fn format_result(r: &IntersectionResult) -> String {
    match (&r.matched_features, &r.error) {
        (_, Some(e)) => format!("  ✗ {:<40} {}", r.layer, e),
        (Some(n), None) => format!("  {} {:<40} {}", if *n > 0 { "●" } else { "·" }, r.layer, n),
        (None, None) => format!("  ? {}", r.layer),
    }
}

/// TUI adapter. Inquire prompts, indicatif spinners.
pub struct TuiInputPort {
    engine: IntersectionEngine,
    analyzer: Arc<UrbanAnalyzer>,
    cadastre: Arc<dyn CadastrePort>,
    renderers: Vec<Arc<dyn ReportRendererPort>>,
    output_dir: PathBuf,
    temp_dir: PathBuf,
}

impl TuiInputPort {
    pub fn new(
        engine: IntersectionEngine,
        analyzer: Arc<UrbanAnalyzer>,
        cadastre: Arc<dyn CadastrePort>,
        renderers: Vec<Arc<dyn ReportRendererPort>>,
        output_dir: impl AsRef<Path>,
        temp_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            engine,
            analyzer,
            cadastre,
            renderers,
            output_dir: output_dir.as_ref().to_path_buf(),
            temp_dir: temp_dir.as_ref().to_path_buf(),
        }
    }

    async fn analyze_parcel(&self) -> Result<(), DomainError> {
        let raw = match Text::new("Cadastral reference:")
            .with_help_message("14 or 20 characters, e.g. 9872023VH5797S0001WX")
            .prompt()
        {
            Ok(s) => s,
            Err(e) if is_cancel(&e) => return Ok(()),
            Err(e) => return Err(ui_err(e)),
        };
        let reference = CadastralReference::parse(&raw)?;

        let pb = spinner(format!("Downloading geometry for {}", reference));
        let geometry = match self
            .cadastre
            .fetch_geometry(reference.as_str(), &self.temp_dir)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                warn!(reference = %reference, error = %e, "cadastre download failed");
                None
            }
        };
        pb.set_message("Intersecting with layers");
        let report = self
            .analyzer
            .analyze(reference.as_str(), geometry.as_deref())
            .await;
        pb.finish_and_clear();
        let report = report?;

        println!("\nReference: {}", report.reference);
        if let Some(ha) = report.parcel_area.as_ref().and_then(|a| a.value_hectares) {
            println!("Area: {:.4} ha", ha);
        }
        println!("Affected zones: {}", report.affected_zones.len());
        for z in &report.affected_zones {
            println!("  ● {:<40} {}", z.layer, z.matched_features);
        }
        println!("Affections: {}", report.affections.len());
        for a in &report.affections {
            println!("  ! {:<40} {}", a.layer, a.matched_features);
        }
        for n in &report.notes {
            println!("  note: {}", n);
        }

        for renderer in &self.renderers {
            let dest = self
                .output_dir
                .join(format!("{}.{}", report.reference, renderer.extension()));
            match renderer.render(&report, &dest).await {
                Ok(()) => println!("Written: {}", dest.display()),
                Err(e) => error!(path = %dest.display(), error = %e, "report rendering failed"),
            }
        }
        println!();
        Ok(())
    }

    async fn scan_file(&self) -> Result<(), DomainError> {
        let raw = match Text::new("Vector file (.geojson, .gpkg, .shp):").prompt() {
            Ok(s) => s,
            Err(e) if is_cancel(&e) => return Ok(()),
            Err(e) => return Err(ui_err(e)),
        };
        let path = PathBuf::from(raw.trim());

        let pb = spinner(format!("Scanning {}", path.display()));
        let report = self.engine.analyze_file(&path, Some(&self.output_dir)).await;
        pb.finish_and_clear();
        let report = report?;

        println!(
            "\n{} input feature(s) against {} layer(s):",
            report.input_features,
            report.layers_analyzed.len()
        );
        for r in &report.intersections {
            println!("{}", format_result(r));
        }
        println!();
        Ok(())
    }

    async fn check_point(&self) -> Result<(), DomainError> {
        let lon = match CustomType::<f64>::new("Longitude (WGS 84):")
            .with_error_message("Enter a decimal number")
            .prompt()
        {
            Ok(v) => v,
            Err(e) if is_cancel(&e) => return Ok(()),
            Err(e) => return Err(ui_err(e)),
        };
        let lat = match CustomType::<f64>::new("Latitude (WGS 84):")
            .with_error_message("Enter a decimal number")
            .prompt()
        {
            Ok(v) => v,
            Err(e) if is_cancel(&e) => return Ok(()),
            Err(e) => return Err(ui_err(e)),
        };

        let pb = spinner("Checking layers");
        let check = self.engine.check_point(lon, lat).await;
        pb.finish_and_clear();
        let check = check?;

        if check.affected_layers.is_empty() {
            println!("\n({}, {}) lies in no layer.\n", check.lon, check.lat);
        } else {
            println!("\n({}, {}) lies within:", check.lon, check.lat);
            for r in &check.affected_layers {
                println!("{}", format_result(r));
            }
            println!();
        }
        Ok(())
    }

    async fn list_layers(&self) -> Result<(), DomainError> {
        let pb = spinner("Loading catalog");
        let layers = self.engine.describe_layers().await;
        pb.finish_and_clear();
        let layers = layers?;

        if layers.is_empty() {
            println!("\nNo layers registered.\n");
            return Ok(());
        }
        println!();
        for l in &layers {
            let detail = match (&l.feature_count, &l.error) {
                (_, Some(e)) => format!("error: {}", e),
                (Some(n), None) => format!("{} features", n),
                (None, None) => "remote".to_string(),
            };
            println!("  {:<40} {}", l.descriptor.name, detail);
        }
        println!();
        Ok(())
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        loop {
            let action = match Select::new("What do you want to do?", MenuAction::ALL.to_vec()).prompt() {
                Ok(a) => a,
                Err(e) if is_cancel(&e) => return Ok(()),
                Err(e) => return Err(ui_err(e)),
            };
            let outcome = match action {
                MenuAction::AnalyzeParcel => self.analyze_parcel().await,
                MenuAction::ScanFile => self.scan_file().await,
                MenuAction::CheckPoint => self.check_point().await,
                MenuAction::ListLayers => self.list_layers().await,
                MenuAction::Exit => return Ok(()),
            };
            // A failed action reports and returns to the menu; only UI failures end the loop.
            match outcome {
                Ok(()) => {}
                Err(e @ DomainError::Ui(_)) => return Err(e),
                Err(e) => println!("\nError: {}\n", e),
            }
        }
    }
}
