//! Layer catalog adapter. Implements LayerCatalogPort over a registry folder.

pub mod fs_catalog;

pub use fs_catalog::FsLayerCatalog;
