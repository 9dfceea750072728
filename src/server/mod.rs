//! HTTP surface: one NDJSON streaming endpoint per sensor family.
//!
//! The adapters are deliberately thin; parameter binding and transport are
//! the framework's job, everything interesting lives in `core::pipeline`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use crate::core::{stream_scenes, CatalogClient, SensorConfig, SensorKind, TimelineRequest};
use crate::types::Location;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn CatalogClient>,
}

/// Query parameters shared by every timeline endpoint.
///
/// `lat`/`lon` must parse as floats or the framework rejects the request
/// before the pipeline runs; dates stay raw strings and are validated inside
/// the stream so failures arrive as an NDJSON error line.
#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    lat: f64,
    lon: f64,
    start_date: Option<String>,
    end_date: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/images", get(images_legacy))
        .route("/api/v1/sentinel2", get(sentinel2))
        .route("/api/v1/sentinel1", get(sentinel1))
        .route("/api/v1/high-res-images", get(high_res_images))
        .route("/api/v1/sentinel3", get(sentinel3))
        .route("/api/v1/landsat8", get(landsat8))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn images_legacy(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> Response {
    timeline_response(state, SensorKind::Sentinel2Legacy, query)
}

async fn sentinel2(State(state): State<AppState>, Query(query): Query<TimelineQuery>) -> Response {
    timeline_response(state, SensorKind::Sentinel2, query)
}

async fn sentinel1(State(state): State<AppState>, Query(query): Query<TimelineQuery>) -> Response {
    timeline_response(state, SensorKind::Sentinel1, query)
}

async fn high_res_images(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> Response {
    timeline_response(state, SensorKind::Naip, query)
}

async fn sentinel3(State(state): State<AppState>, Query(query): Query<TimelineQuery>) -> Response {
    timeline_response(state, SensorKind::Sentinel3, query)
}

async fn landsat8(State(state): State<AppState>, Query(query): Query<TimelineQuery>) -> Response {
    timeline_response(state, SensorKind::Landsat8, query)
}

/// Surface one pipeline instance as a chunked NDJSON response.
///
/// Headers go out before the first remote call completes, so the status is
/// always 200; mid-stream failures arrive as the terminal error line.
fn timeline_response(state: AppState, kind: SensorKind, query: TimelineQuery) -> Response {
    let sensor = SensorConfig::get(kind);
    let request = TimelineRequest {
        location: Location::new(query.lat, query.lon),
        start_date: query.start_date,
        end_date: query.end_date,
    };
    log::info!(
        "{} timeline request lat={} lon={} start={:?} end={:?}",
        sensor.label,
        request.location.lat,
        request.location.lon,
        request.start_date,
        request.end_date
    );

    let lines = stream_scenes(state.client, sensor, request)
        .map(|item| Ok::<_, Infallible>(item.to_ndjson_line()));
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}
