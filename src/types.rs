use chrono::{Days, Months, NaiveDate};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Geographic point of interest, WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

// Meters per degree of latitude; longitude shrinks by cos(lat)
const METERS_PER_DEGREE: f64 = 111_320.0;

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Location { lat, lon }
    }

    /// Bounding box of the point buffered by `radius_m` meters.
    ///
    /// The conversion is the usual equirectangular approximation; near the
    /// poles the longitude span is clamped rather than allowed to blow up.
    pub fn buffer(&self, radius_m: f64) -> BoundingBox {
        let dlat = radius_m / METERS_PER_DEGREE;
        let cos_lat = self.lat.to_radians().cos().abs().max(0.01);
        let dlon = radius_m / (METERS_PER_DEGREE * cos_lat);
        BoundingBox {
            min_lon: self.lon - dlon,
            max_lon: self.lon + dlon,
            min_lat: self.lat - dlat,
            max_lat: self.lat + dlat,
        }
    }
}

impl BoundingBox {
    /// GeoJSON polygon ring (closed) for region parameters
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [self.min_lon, self.min_lat],
                [self.max_lon, self.min_lat],
                [self.max_lon, self.max_lat],
                [self.min_lon, self.max_lat],
                [self.min_lon, self.min_lat],
            ]]
        })
    }
}

/// Default span applied when a request gives `start_date` without `end_date`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultSpan {
    Day,
    Month,
    Year,
}

impl DefaultSpan {
    pub fn advance(&self, date: NaiveDate) -> SkytraceResult<NaiveDate> {
        let advanced = match self {
            DefaultSpan::Day => date.checked_add_days(Days::new(1)),
            DefaultSpan::Month => date.checked_add_months(Months::new(1)),
            DefaultSpan::Year => date.checked_add_months(Months::new(12)),
        };
        advanced.ok_or_else(|| {
            SkytraceError::InvalidDate(format!("date out of range when advancing {}", date))
        })
    }
}

/// Optional temporal filter parsed from `start_date` / `end_date` params
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    /// Parse `YYYY-MM-DD` query parameters into a window.
    ///
    /// Malformed dates are a query failure: nothing has been emitted yet, so
    /// the caller turns the error into the single terminal error record.
    pub fn from_params(start: Option<&str>, end: Option<&str>) -> SkytraceResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| SkytraceError::InvalidDate(format!("invalid date '{}': {}", s, e)))
        };
        Ok(DateWindow {
            start: start.map(parse).transpose()?,
            end: end.map(parse).transpose()?,
        })
    }

    /// Resolve into a concrete (start, end) range.
    ///
    /// Start without end extends by the sensor's default span; no start means
    /// no temporal filter at all (a lone end date is ignored, matching the
    /// catalog semantics where the filter is anchored on the start).
    pub fn resolve(&self, span: DefaultSpan) -> SkytraceResult<Option<(NaiveDate, NaiveDate)>> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Ok(Some((start, end))),
            (Some(start), None) => Ok(Some((start, span.advance(start)?))),
            (None, _) => Ok(None),
        }
    }
}

/// One matched catalog entry, request-scoped
#[derive(Debug, Clone)]
pub struct SceneCandidate {
    /// Opaque catalog scene identifier
    pub id: String,
    /// Capture time in epoch milliseconds, as reported by the catalog
    pub time_start_ms: i64,
    /// Sensor-specific scene properties (cloud percentage, orbit, ...)
    pub properties: Map<String, Value>,
}

impl SceneCandidate {
    pub fn timestamp_secs(&self) -> f64 {
        self.time_start_ms as f64 / 1000.0
    }

    pub fn property_f64(&self, name: &str) -> Option<f64> {
        self.properties.get(name).and_then(Value::as_f64)
    }
}

/// One emitted timeline record (one NDJSON line)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    /// Capture time, epoch seconds
    pub timestamp: f64,
    /// Scene-level cloud percentage where the catalog reports one; omitted
    /// from the line for sensors without a cloud property
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
    pub thumbnail_url: String,
    /// Human-readable sensor label, fixed per endpoint
    pub source: String,
}

/// Item produced by the streaming pipeline.
///
/// The transport writes each item as one line and the stream ends at the
/// first `Failure`; errors never cross the streaming boundary as panics or
/// status-code changes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Record(ImageRecord),
    Failure(String),
}

impl StreamItem {
    /// Render as a complete, newline-terminated JSON line
    pub fn to_ndjson_line(&self) -> String {
        let value = match self {
            StreamItem::Record(record) => serde_json::to_value(record)
                .unwrap_or_else(|e| json!({ "error": format!("serialization error: {}", e) })),
            StreamItem::Failure(message) => json!({ "error": message }),
        };
        let mut line = value.to_string();
        line.push('\n');
        line
    }
}

/// Error types for the timeline service
#[derive(Debug, thiserror::Error)]
pub enum SkytraceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("thumbnail error: {0}")]
    Thumbnail(String),

    #[error("worker pool error: {0}")]
    Worker(String),
}

/// Result type for timeline operations
pub type SkytraceResult<T> = Result<T, SkytraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_bbox_is_centered() {
        let loc = Location::new(46.5, 6.6);
        let bbox = loc.buffer(500.0);
        assert!(bbox.min_lat < loc.lat && loc.lat < bbox.max_lat);
        assert!(bbox.min_lon < loc.lon && loc.lon < bbox.max_lon);
        // Longitude span widens away from the equator
        let lat_span = bbox.max_lat - bbox.min_lat;
        let lon_span = bbox.max_lon - bbox.min_lon;
        assert!(lon_span > lat_span);
    }

    #[test]
    fn test_buffer_bbox_polar_clamp() {
        let bbox = Location::new(89.9999, 0.0).buffer(1000.0);
        assert!(bbox.max_lon.is_finite());
        assert!(bbox.max_lon - bbox.min_lon < 10.0);
    }

    #[test]
    fn test_geojson_ring_is_closed() {
        let ring = Location::new(0.0, 0.0).buffer(250.0).to_geojson();
        let coords = ring["coordinates"][0].as_array().unwrap();
        assert_eq!(coords.len(), 5);
        assert_eq!(coords[0], coords[4]);
    }

    #[test]
    fn test_date_window_start_only_advances_by_span() {
        let window = DateWindow::from_params(Some("2023-01-31"), None).unwrap();
        let (start, end) = window.resolve(DefaultSpan::Day).unwrap().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 31).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());

        let (_, end) = window.resolve(DefaultSpan::Month).unwrap().unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());

        let (_, end) = window.resolve(DefaultSpan::Year).unwrap().unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn test_date_window_both_given() {
        let window = DateWindow::from_params(Some("2023-01-01"), Some("2023-06-01")).unwrap();
        let (start, end) = window.resolve(DefaultSpan::Day).unwrap().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
    }

    #[test]
    fn test_date_window_absent_means_no_filter() {
        let window = DateWindow::from_params(None, None).unwrap();
        assert_eq!(window.resolve(DefaultSpan::Year).unwrap(), None);
    }

    #[test]
    fn test_date_window_malformed() {
        let err = DateWindow::from_params(Some("2023-13-99"), None).unwrap_err();
        assert!(matches!(err, SkytraceError::InvalidDate(_)));
    }

    #[test]
    fn test_ndjson_record_line() {
        let item = StreamItem::Record(ImageRecord {
            id: "COPERNICUS/S2_SR/20230101T103311_20230101T103309_T31TGM".to_string(),
            timestamp: 1672567991.0,
            cloud_cover: Some(4.2),
            thumbnail_url: "https://example.test/thumb/abc".to_string(),
            source: "Sentinel-2".to_string(),
        });
        let line = item.to_ndjson_line();
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["source"], "Sentinel-2");
        assert_eq!(value["cloud_cover"], 4.2);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_ndjson_omits_absent_cloud_cover() {
        let item = StreamItem::Record(ImageRecord {
            id: "COPERNICUS/S1_GRD/S1A_IW_GRDH".to_string(),
            timestamp: 1.0,
            cloud_cover: None,
            thumbnail_url: "https://example.test/thumb/def".to_string(),
            source: "Sentinel-1".to_string(),
        });
        let value: Value = serde_json::from_str(item.to_ndjson_line().trim_end()).unwrap();
        assert!(value.get("cloud_cover").is_none());
    }

    #[test]
    fn test_ndjson_failure_line() {
        let line = StreamItem::Failure("catalog unreachable".to_string()).to_ndjson_line();
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["error"], "catalog unreachable");
    }
}
