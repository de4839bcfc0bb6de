//! Markdown certificate for a parcel analysis.

use crate::domain::{AnalysisReport, DomainError, GenericParameter};
use crate::ports::ReportRendererPort;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct MarkdownCertificate;

impl MarkdownCertificate {
    pub fn new() -> Self {
        Self
    }

    pub fn to_markdown(report: &AnalysisReport) -> String {
        let mut md = String::new();

        md.push_str(&format!("# Urbanistic Certificate: {}\n\n", report.reference));
        md.push_str(&format!(
            "**Reference:** {} | **Generated:** {}\n\n",
            report.reference,
            report.timestamp.format("%Y-%m-%d %H:%M UTC")
        ));
        md.push_str("---\n\n");

        md.push_str("## Parcel\n\n");
        match &report.parcel_area {
            Some(area) => match (area.value, area.value_hectares) {
                (Some(m2), Some(ha)) => {
                    md.push_str(&format!("- Area: {:.2} {} ({:.4} ha)\n", m2, area.unit, ha))
                }
                _ => md.push_str(&format!(
                    "- Area: not available ({})\n",
                    area.error.as_deref().unwrap_or("unknown")
                )),
            },
            None => md.push_str("- Area: not available\n"),
        }
        md.push('\n');

        md.push_str("## Affected Zones\n\n");
        if report.affected_zones.is_empty() {
            md.push_str("None detected.\n\n");
        } else {
            md.push_str("| Layer | Matched features |\n|---|---|\n");
            for zone in &report.affected_zones {
                md.push_str(&format!("| {} | {} |\n", zone.layer, zone.matched_features));
            }
            md.push('\n');
        }

        md.push_str("## Affections\n\n");
        if report.affections.is_empty() {
            md.push_str("None detected.\n\n");
        } else {
            for a in &report.affections {
                md.push_str(&format!(
                    "- **{}** ({}): {} matched\n",
                    a.layer, a.kind, a.matched_features
                ));
            }
            md.push('\n');
        }

        let params = &report.urbanistic_parameters;
        let rows: Vec<(&str, &GenericParameter, &str)> = [
            ("Occupancy coefficient", params.occupancy_coefficient.as_ref(), ""),
            ("Buildability", params.buildability.as_ref(), " m²/m²"),
            ("Maximum height", params.max_height.as_ref(), " m"),
        ]
        .into_iter()
        .filter_map(|(label, p, unit)| p.map(|p| (label, p, unit)))
        .collect();
        if !rows.is_empty() {
            md.push_str("## Urbanistic Parameters\n\n");
            for (label, p, unit) in rows {
                md.push_str(&format!("- {}: {}{} *({})*\n", label, p.value, unit, p.note));
            }
            md.push_str(&format!("\n> {}\n\n", params.disclaimer));
        }

        if !report.recommendations.is_empty() {
            md.push_str("## Recommendations\n\n");
            for r in &report.recommendations {
                md.push_str(&format!("- {}\n", r));
            }
            md.push('\n');
        }

        if !report.notes.is_empty() {
            md.push_str("## Notes\n\n");
            for n in &report.notes {
                md.push_str(&format!("- {}\n", n));
            }
            md.push('\n');
        }

        md.push_str("---\n");
        md.push_str("*Informative document. Not a substitute for an official urban planning certificate.*\n");
        md
    }
}

#[async_trait::async_trait]
impl ReportRendererPort for MarkdownCertificate {
    async fn render(&self, report: &AnalysisReport, dest: &Path) -> Result<(), DomainError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Report(format!("create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(dest, Self::to_markdown(report))
            .await
            .map_err(|e| DomainError::Report(format!("Failed to write report: {}", e)))?;
        info!(path = %dest.display(), reference = %report.reference, "certificate generated");
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "md"
    }
}
