//! Pretty-printed JSON dump of the analysis report.

use crate::domain::{AnalysisReport, DomainError};
use crate::ports::ReportRendererPort;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct JsonReportWriter;

impl JsonReportWriter {
    pub fn new() -> Self {
        Self
    }
}

/// Serialize any report-like value to `dest` as indented JSON, creating parent dirs.
pub(crate) async fn write_json<T: serde::Serialize + ?Sized>(
    value: &T,
    dest: &Path,
) -> Result<(), DomainError> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| DomainError::Report(format!("serialize: {}", e)))?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DomainError::Report(format!("create {}: {}", parent.display(), e)))?;
    }
    tokio::fs::write(dest, body)
        .await
        .map_err(|e| DomainError::Report(format!("Failed to write report: {}", e)))
}

#[async_trait::async_trait]
impl ReportRendererPort for JsonReportWriter {
    async fn render(&self, report: &AnalysisReport, dest: &Path) -> Result<(), DomainError> {
        write_json(report, dest).await?;
        info!(path = %dest.display(), reference = %report.reference, "JSON report written");
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}
