use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::sensor::{Preprocess, SensorConfig};
use crate::types::{
    BoundingBox, DateWindow, ImageRecord, Location, SceneCandidate, SkytraceError, SkytraceResult,
    StreamItem,
};

/// Realized catalog query: one filtered, sorted, bounded view over a named
/// collection. Built per request, never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    pub catalog: String,
    pub location: Location,
    /// Resolved temporal window; `None` applies no temporal filter
    pub window: Option<(NaiveDate, NaiveDate)>,
    /// Joined property-filter expression, already rendered for the catalog
    pub filter: Option<String>,
    pub limit: usize,
}

impl SceneQuery {
    pub fn for_sensor(
        sensor: &SensorConfig,
        location: Location,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> Self {
        SceneQuery {
            catalog: sensor.catalog.to_string(),
            location,
            window,
            filter: sensor.filter_expression(),
            limit: sensor.max_results(),
        }
    }
}

/// Render request for one scene's preview URL
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub bands: [&'static str; 3],
    pub min: f64,
    pub max: f64,
    pub dimensions: u32,
    pub region: BoundingBox,
    /// Remote-side correction applied before visualization
    pub preprocess: Preprocess,
}

impl ThumbnailRequest {
    pub fn for_sensor(sensor: &SensorConfig, location: Location) -> Self {
        ThumbnailRequest {
            bands: sensor.vis.bands,
            min: sensor.vis.min,
            max: sensor.vis.max,
            dimensions: sensor.vis.dimensions,
            region: location.buffer(sensor.buffer_m),
            preprocess: sensor.preprocess,
        }
    }
}

/// Narrow capability boundary over the remote geospatial compute service.
///
/// Both operations are blocking remote calls; the pipeline offloads them to
/// the runtime's blocking pool so request-handling tasks are never starved.
pub trait CatalogClient: Send + Sync {
    /// Realize the filtered, newest-first, size-bounded candidate list
    fn list_scenes(&self, query: &SceneQuery) -> SkytraceResult<Vec<SceneCandidate>>;

    /// Obtain a rendered-preview URL for one scene
    fn thumbnail_url(&self, scene_id: &str, request: &ThumbnailRequest) -> SkytraceResult<String>;
}

/// Raw request parameters as bound from the query string
#[derive(Debug, Clone)]
pub struct TimelineRequest {
    pub location: Location,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

// Bounded channel between the driver task and the response body; a full
// channel applies back-pressure, a closed one means the client went away.
const STREAM_BUFFER: usize = 16;

/// Drive one sensor pipeline and emit items as they become ready.
///
/// Each call creates a fresh, request-scoped stream: query the catalog, then
/// resolve thumbnails sequentially in candidate order (newest first). Any
/// failure after this point becomes exactly one terminal `Failure` item and
/// the stream ends; nothing is retried.
pub fn stream_scenes(
    client: Arc<dyn CatalogClient>,
    sensor: &'static SensorConfig,
    request: TimelineRequest,
) -> ReceiverStream<StreamItem> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        if let Err(err) = drive(client, sensor, request, &tx).await {
            log::warn!("{} stream aborted: {}", sensor.label, err);
            let _ = tx.send(StreamItem::Failure(err.to_string())).await;
        }
    });
    ReceiverStream::new(rx)
}

async fn drive(
    client: Arc<dyn CatalogClient>,
    sensor: &'static SensorConfig,
    request: TimelineRequest,
    tx: &mpsc::Sender<StreamItem>,
) -> SkytraceResult<()> {
    let window = DateWindow::from_params(request.start_date.as_deref(), request.end_date.as_deref())?
        .resolve(sensor.default_span)?;
    let query = SceneQuery::for_sensor(sensor, request.location, window);

    let lister = client.clone();
    let candidates = offload(move || lister.list_scenes(&query)).await?;
    log::debug!("{}: {} candidate scenes", sensor.label, candidates.len());

    let thumb_request = ThumbnailRequest::for_sensor(sensor, request.location);
    for candidate in candidates {
        let resolver = client.clone();
        let scene_id = candidate.id.clone();
        let req = thumb_request.clone();
        let url = offload(move || resolver.thumbnail_url(&scene_id, &req)).await?;

        let record = ImageRecord {
            id: candidate.id.clone(),
            timestamp: candidate.timestamp_secs(),
            cloud_cover: sensor
                .cloud_property
                .and_then(|name| candidate.property_f64(name)),
            thumbnail_url: url,
            source: sensor.label.to_string(),
        };
        if tx.send(StreamItem::Record(record)).await.is_err() {
            // Client disconnected; stop pulling further candidates
            log::debug!("{}: receiver dropped, abandoning stream", sensor.label);
            return Ok(());
        }
    }
    Ok(())
}

/// Run a blocking remote call on the runtime's bounded blocking pool
async fn offload<T, F>(f: F) -> SkytraceResult<T>
where
    F: FnOnce() -> SkytraceResult<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| SkytraceError::Worker(e.to_string()))?
}
