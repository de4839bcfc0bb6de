//! Application use cases. Orchestrate domain logic via ports.

pub mod intersection_service;
pub mod layer_cache;
pub mod urban_analysis;

pub use intersection_service::{
    DEFAULT_MAX_CONCURRENT_SCANS, INTERSECTIONS_FILE, IntersectionEngine,
};
pub use layer_cache::{DEFAULT_LOAD_TIMEOUT, LayerCache};
pub use urban_analysis::{DEFAULT_AFFECTION_KEYWORDS, UrbanAnalyzer};
