use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::core::pipeline::{CatalogClient, SceneQuery, ThumbnailRequest};
use crate::core::sensor::Preprocess;
use crate::io::auth::Credentials;
use crate::types::{SceneCandidate, SkytraceError, SkytraceResult};

const DEFAULT_BASE_URL: &str = "https://earthengine.googleapis.com/v1";
const DEFAULT_PROJECT: &str = "earthengine-public";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Blocking client for the Earth Engine REST surface.
///
/// One instance is created at startup and shared read-only across requests;
/// all calls run on the blocking pool. No response is ever cached here.
pub struct EarthEngineClient {
    http: reqwest::blocking::Client,
    base_url: String,
    project: String,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct ListImagesResponse {
    #[serde(default)]
    images: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    /// Full resource name, `projects/<p>/assets/<catalog>/<scene>`
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "startTime", default)]
    start_time: Option<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    /// Resource name of the minted thumbnail, `projects/<p>/thumbnails/<id>`
    name: String,
}

impl EarthEngineClient {
    pub fn new(credentials: Credentials) -> Self {
        let project =
            std::env::var("EE_PROJECT").unwrap_or_else(|_| DEFAULT_PROJECT.to_string());
        Self::with_base_url(credentials, DEFAULT_BASE_URL, &project)
    }

    /// Client against a non-default endpoint (regional deployments, tests)
    pub fn with_base_url(credentials: Credentials, base_url: &str, project: &str) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        EarthEngineClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            credentials,
        }
    }

    fn bearer(&self) -> SkytraceResult<String> {
        self.credentials.bearer_token()
    }

    fn entry_to_candidate(&self, entry: ImageEntry) -> Option<SceneCandidate> {
        let time_start_ms = match entry.properties.get("system:time_start") {
            // Millisecond property wins when the catalog provides it;
            // some catalogs report it as a float
            Some(v) => v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))?,
            None => {
                let raw = entry.start_time.as_deref()?;
                DateTime::parse_from_rfc3339(raw).ok()?.timestamp_millis()
            }
        };
        let id = entry.id.unwrap_or_else(|| {
            // Fall back to stripping the project prefix from the resource name
            entry
                .name
                .splitn(4, '/')
                .nth(3)
                .unwrap_or(&entry.name)
                .to_string()
        });
        Some(SceneCandidate {
            id,
            time_start_ms,
            properties: entry.properties,
        })
    }
}

fn day_start_rfc3339(date: NaiveDate) -> String {
    date.and_time(NaiveTime::MIN).and_utc().to_rfc3339()
}

/// Thumbnail body fragment instructing the remote service to mask pixels
/// whose QA bits are set, leaving non-optical bands untouched
fn mask_fragment(preprocess: &Preprocess) -> Option<Value> {
    match preprocess {
        Preprocess::None => None,
        Preprocess::QaBitMask {
            band,
            cloud_bit,
            cirrus_bit,
        } => Some(json!({
            "band": band,
            "clearBits": [cloud_bit, cirrus_bit],
        })),
    }
}

impl CatalogClient for EarthEngineClient {
    fn list_scenes(&self, query: &SceneQuery) -> SkytraceResult<Vec<SceneCandidate>> {
        let url = format!(
            "{}/projects/{}/assets/{}:listImages",
            self.base_url, self.project, query.catalog
        );
        let point = json!({
            "type": "Point",
            "coordinates": [query.location.lon, query.location.lat],
        });

        let mut params: Vec<(&str, String)> = vec![
            ("pageSize", query.limit.to_string()),
            ("region", point.to_string()),
        ];
        if let Some((start, end)) = query.window {
            params.push(("startTime", day_start_rfc3339(start)));
            params.push(("endTime", day_start_rfc3339(end)));
        }
        if let Some(filter) = &query.filter {
            params.push(("filter", filter.clone()));
        }

        let token = self.bearer()?;
        let response = self.http.get(&url).bearer_auth(token).query(&params).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SkytraceError::Catalog(format!(
                "listing {} failed with status {}: {}",
                query.catalog,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let listing: ListImagesResponse = response.json()?;
        let mut candidates: Vec<SceneCandidate> = listing
            .images
            .into_iter()
            .filter_map(|entry| self.entry_to_candidate(entry))
            .collect();

        // The listing endpoint does not guarantee ordering; realize the
        // newest-first bounded view here so downstream never resorts
        candidates.sort_by(|a, b| b.time_start_ms.cmp(&a.time_start_ms));
        candidates.truncate(query.limit);
        Ok(candidates)
    }

    fn thumbnail_url(&self, scene_id: &str, request: &ThumbnailRequest) -> SkytraceResult<String> {
        let url = format!("{}/projects/{}/thumbnails", self.base_url, self.project);
        let mut body = json!({
            "assetId": scene_id,
            "visualization": {
                "bands": request.bands,
                "min": request.min,
                "max": request.max,
            },
            "dimensions": request.dimensions,
            "region": request.region.to_geojson(),
            "fileFormat": "PNG",
        });
        if let Some(mask) = mask_fragment(&request.preprocess) {
            body["mask"] = mask;
        }

        let token = self.bearer()?;
        let response = self.http.post(&url).bearer_auth(token).json(&body).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(SkytraceError::Thumbnail(format!(
                "render request for {} failed with status {}: {}",
                scene_id,
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let minted: ThumbnailResponse = response.json()?;
        Ok(format!("{}/{}:getPixels", self.base_url, minted.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> EarthEngineClient {
        EarthEngineClient::with_base_url(
            Credentials::from_static_token("test-token"),
            "https://ee.example.test/v1/",
            "earthengine-public",
        )
    }

    #[test]
    fn test_base_url_is_normalized() {
        let c = client();
        assert_eq!(c.base_url, "https://ee.example.test/v1");
    }

    #[test]
    fn test_entry_prefers_millisecond_property() {
        let c = client();
        let mut properties = Map::new();
        properties.insert("system:time_start".to_string(), json!(1672567991000_i64));
        let candidate = c
            .entry_to_candidate(ImageEntry {
                name: "projects/earthengine-public/assets/COPERNICUS/S2_SR/X".to_string(),
                id: Some("COPERNICUS/S2_SR/X".to_string()),
                start_time: Some("2020-01-01T00:00:00Z".to_string()),
                properties,
            })
            .unwrap();
        assert_eq!(candidate.time_start_ms, 1672567991000);
        assert_eq!(candidate.timestamp_secs(), 1672567991.0);
    }

    #[test]
    fn test_entry_falls_back_to_start_time_and_name() {
        let c = client();
        let candidate = c
            .entry_to_candidate(ImageEntry {
                name: "projects/earthengine-public/assets/USDA/NAIP/DOQQ/m_123".to_string(),
                id: None,
                start_time: Some("2021-06-15T17:00:00+00:00".to_string()),
                properties: Map::new(),
            })
            .unwrap();
        assert_eq!(candidate.id, "USDA/NAIP/DOQQ/m_123");
        assert!(candidate.time_start_ms > 0);
    }

    #[test]
    fn test_entry_without_time_is_dropped() {
        let c = client();
        let candidate = c.entry_to_candidate(ImageEntry {
            name: "projects/p/assets/X".to_string(),
            id: None,
            start_time: None,
            properties: Map::new(),
        });
        assert!(candidate.is_none());
    }

    #[test]
    fn test_mask_fragment_only_for_qa_sensors() {
        assert!(mask_fragment(&Preprocess::None).is_none());
        let fragment = mask_fragment(&Preprocess::QaBitMask {
            band: "QA60",
            cloud_bit: 10,
            cirrus_bit: 11,
        })
        .unwrap();
        assert_eq!(fragment["band"], "QA60");
        assert_eq!(fragment["clearBits"], json!([10, 11]));
    }

    #[test]
    fn test_day_start_formatting() {
        let date = NaiveDate::from_ymd_opt(2023, 3, 5).unwrap();
        assert_eq!(day_start_rfc3339(date), "2023-03-05T00:00:00+00:00");
    }
}
