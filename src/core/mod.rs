//! Core timeline pipeline modules

pub mod pipeline;
pub mod sensor;

// Re-export main types
pub use pipeline::{stream_scenes, CatalogClient, SceneQuery, ThumbnailRequest, TimelineRequest};
pub use sensor::{Preprocess, PropertyFilter, SensorConfig, SensorKind, VisParams};
