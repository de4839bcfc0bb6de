//! Report adapters. Implement ReportRendererPort.

pub mod json;
pub mod markdown;

pub use json::JsonReportWriter;
pub use markdown::MarkdownCertificate;
