//! Skytrace: a streaming satellite image timeline API
//!
//! Given a geographic point and an optional date range, Skytrace queries a
//! remote geospatial catalog across several sensor families (Sentinel-1/2/3,
//! NAIP aerial, Landsat 8) and streams back scene metadata plus rendered
//! thumbnail URLs as newline-delimited JSON, newest first.

pub mod core;
pub mod io;
pub mod server;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, DateWindow, DefaultSpan, ImageRecord, Location, SceneCandidate, SkytraceError,
    SkytraceResult, StreamItem,
};

pub use crate::core::{
    stream_scenes, CatalogClient, SceneQuery, SensorConfig, SensorKind, ThumbnailRequest,
    TimelineRequest,
};

pub use io::{bootstrap, Credentials, EarthEngineClient};
pub use server::{router, AppState};
