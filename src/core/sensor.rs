use crate::types::DefaultSpan;

/// Sensor families served by the timeline endpoints.
///
/// The legacy `/api/v1/images` route keeps querying the non-harmonized
/// Sentinel-2 surface-reflectance catalog; everything else about it matches
/// the harmonized variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Sentinel2Legacy,
    Sentinel2,
    Sentinel1,
    Naip,
    Sentinel3,
    Landsat8,
}

/// Scene-property predicate pushed down to the catalog listing
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyFilter {
    /// `properties.<name> < value`
    LessThan { name: &'static str, value: f64 },
    /// `properties.<name> = "value"`
    Equals { name: &'static str, value: &'static str },
    /// list-valued `properties.<name>` contains "value"
    ListContains { name: &'static str, value: &'static str },
}

impl PropertyFilter {
    /// Render as a catalog filter expression clause
    pub fn to_clause(&self) -> String {
        match self {
            PropertyFilter::LessThan { name, value } => {
                format!("properties.{} < {}", name, value)
            }
            PropertyFilter::Equals { name, value } => {
                format!("properties.{} = \"{}\"", name, value)
            }
            PropertyFilter::ListContains { name, value } => {
                format!("\"{}\" IN properties.{}", value, name)
            }
        }
    }
}

/// Raster correction applied remotely before the thumbnail is rendered.
///
/// This never changes which scenes match; it only changes what the rendered
/// preview looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocess {
    None,
    /// Keep a pixel only when both quality bits are zero in the 16-bit QA
    /// band (cloud and cirrus flags for Sentinel-2's QA60)
    QaBitMask {
        band: &'static str,
        cloud_bit: u8,
        cirrus_bit: u8,
    },
}

/// Visualization parameters for thumbnail rendering: an R,G,B band triplet
/// (a band may repeat, e.g. the radar pseudo-color composite), a linear
/// stretch in the sensor's native units, and the output square size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisParams {
    pub bands: [&'static str; 3],
    pub min: f64,
    pub max: f64,
    pub dimensions: u32,
}

/// Everything that distinguishes one sensor pipeline from another.
///
/// The five pipelines share one code path; only these records differ.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// Catalog asset path in the remote compute service
    pub catalog: &'static str,
    /// Fixed `source` label on every emitted record
    pub label: &'static str,
    pub filters: &'static [PropertyFilter],
    pub default_span: DefaultSpan,
    /// Point-buffer radius in meters, roughly matched to native resolution
    pub buffer_m: f64,
    pub vis: VisParams,
    /// Catalog property holding the scene cloud percentage, where one exists
    pub cloud_property: Option<&'static str>,
    pub preprocess: Preprocess,
}

const THUMB_DIMENSIONS: u32 = 512;
const MAX_RESULTS: usize = 50;

const SENTINEL2_FILTERS: &[PropertyFilter] = &[PropertyFilter::LessThan {
    name: "CLOUDY_PIXEL_PERCENTAGE",
    value: 20.0,
}];

const SENTINEL1_FILTERS: &[PropertyFilter] = &[
    PropertyFilter::ListContains {
        name: "transmitterReceiverPolarisation",
        value: "VV",
    },
    PropertyFilter::ListContains {
        name: "transmitterReceiverPolarisation",
        value: "VH",
    },
    PropertyFilter::Equals {
        name: "instrumentMode",
        value: "IW",
    },
];

static SENTINEL2_LEGACY: SensorConfig = SensorConfig {
    kind: SensorKind::Sentinel2Legacy,
    catalog: "COPERNICUS/S2_SR",
    label: "Sentinel-2",
    filters: SENTINEL2_FILTERS,
    default_span: DefaultSpan::Day,
    buffer_m: 500.0,
    vis: VisParams {
        bands: ["B4", "B3", "B2"],
        min: 0.0,
        max: 3000.0,
        dimensions: THUMB_DIMENSIONS,
    },
    cloud_property: Some("CLOUDY_PIXEL_PERCENTAGE"),
    preprocess: Preprocess::QaBitMask {
        band: "QA60",
        cloud_bit: 10,
        cirrus_bit: 11,
    },
};

static SENTINEL2: SensorConfig = SensorConfig {
    kind: SensorKind::Sentinel2,
    catalog: "COPERNICUS/S2_SR_HARMONIZED",
    label: "Sentinel-2",
    filters: SENTINEL2_FILTERS,
    default_span: DefaultSpan::Day,
    buffer_m: 500.0,
    vis: VisParams {
        bands: ["B4", "B3", "B2"],
        min: 0.0,
        max: 3000.0,
        dimensions: THUMB_DIMENSIONS,
    },
    cloud_property: Some("CLOUDY_PIXEL_PERCENTAGE"),
    preprocess: Preprocess::QaBitMask {
        band: "QA60",
        cloud_bit: 10,
        cirrus_bit: 11,
    },
};

static SENTINEL1: SensorConfig = SensorConfig {
    kind: SensorKind::Sentinel1,
    catalog: "COPERNICUS/S1_GRD",
    label: "Sentinel-1",
    filters: SENTINEL1_FILTERS,
    default_span: DefaultSpan::Month,
    buffer_m: 500.0,
    vis: VisParams {
        // Dual-pol pseudo-color: VV in red and blue, VH in green
        bands: ["VV", "VH", "VV"],
        min: -25.0,
        max: 0.0,
        dimensions: THUMB_DIMENSIONS,
    },
    cloud_property: None,
    preprocess: Preprocess::None,
};

static NAIP: SensorConfig = SensorConfig {
    kind: SensorKind::Naip,
    catalog: "USDA/NAIP/DOQQ",
    label: "NAIP",
    filters: &[],
    default_span: DefaultSpan::Year,
    buffer_m: 250.0,
    vis: VisParams {
        bands: ["R", "G", "B"],
        min: 0.0,
        max: 255.0,
        dimensions: THUMB_DIMENSIONS,
    },
    cloud_property: None,
    preprocess: Preprocess::None,
};

static SENTINEL3: SensorConfig = SensorConfig {
    kind: SensorKind::Sentinel3,
    catalog: "COPERNICUS/S3/OLCI",
    label: "Sentinel-3",
    filters: &[],
    default_span: DefaultSpan::Month,
    buffer_m: 5000.0,
    vis: VisParams {
        bands: ["Oa08_radiance", "Oa06_radiance", "Oa04_radiance"],
        min: 0.0,
        max: 300.0,
        dimensions: THUMB_DIMENSIONS,
    },
    cloud_property: None,
    preprocess: Preprocess::None,
};

static LANDSAT8: SensorConfig = SensorConfig {
    kind: SensorKind::Landsat8,
    catalog: "LANDSAT/LC08/C02/T1_L2",
    label: "Landsat 8",
    filters: &[],
    default_span: DefaultSpan::Year,
    buffer_m: 1000.0,
    vis: VisParams {
        bands: ["SR_B4", "SR_B3", "SR_B2"],
        min: 0.0,
        max: 30000.0,
        dimensions: THUMB_DIMENSIONS,
    },
    cloud_property: Some("CLOUD_COVER"),
    preprocess: Preprocess::None,
};

impl SensorConfig {
    /// Static configuration record for a sensor family
    pub fn get(kind: SensorKind) -> &'static SensorConfig {
        match kind {
            SensorKind::Sentinel2Legacy => &SENTINEL2_LEGACY,
            SensorKind::Sentinel2 => &SENTINEL2,
            SensorKind::Sentinel1 => &SENTINEL1,
            SensorKind::Naip => &NAIP,
            SensorKind::Sentinel3 => &SENTINEL3,
            SensorKind::Landsat8 => &LANDSAT8,
        }
    }

    pub fn all() -> [&'static SensorConfig; 6] {
        [
            &SENTINEL2_LEGACY,
            &SENTINEL2,
            &SENTINEL1,
            &NAIP,
            &SENTINEL3,
            &LANDSAT8,
        ]
    }

    /// Per-request result cap, identical for every sensor
    pub fn max_results(&self) -> usize {
        MAX_RESULTS
    }

    /// Joined catalog filter expression, `None` when the sensor applies no
    /// property predicates
    pub fn filter_expression(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        let clauses: Vec<String> = self.filters.iter().map(PropertyFilter::to_clause).collect();
        Some(clauses.join(" AND "))
    }
}
