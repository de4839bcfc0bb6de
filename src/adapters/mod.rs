//! Infrastructure adapters. Implement outbound ports.
//!
//! Filesystem catalog, vector readers, reprojection, cadastre HTTP, reports, terminal UI.
//! Map errors to DomainError.

pub mod cadastre;
pub mod catalog;
pub mod crs;
pub mod report;
pub mod ui;
pub mod vector;
