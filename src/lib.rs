//! # Report Heatmap
//!
//! Geospatial core of a citizen issue-reporting app's map screens:
//! fetch reports near the user from a remote document store, narrow them
//! by tag group and time range, and project the survivors into weighted
//! heatmap features for the map surface.
//!
//! This library provides:
//! - Great-circle distance and radius-to-bounding-box math
//! - A document store client with bounding-box and full-scan strategies
//! - Tag-group + time-range filtering over fetched candidates
//! - Atomic heatmap feature projection
//! - Thin view controllers wiring the pipeline to lifecycle events
//!
//! ## Features
//!
//! - **`parallel`** - Parallel full-scan distance filtering with rayon
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use report_heatmap::{
//!     filter_reports, FilterCriteria, GeoPoint, HeatmapConfig, HeatmapLayer, Report, TagCatalog,
//! };
//!
//! let reports = vec![
//!     Report::new(
//!         GeoPoint::new(43.7102, 10.4087),
//!         vec!["Litter".to_string()],
//!         Some(Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()),
//!     ),
//!     Report::new(GeoPoint::new(43.7150, 10.4010), vec!["Pothole".to_string()], None),
//! ];
//!
//! let criteria = FilterCriteria::new(
//!     "environmental",
//!     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
//! );
//!
//! let filtered = filter_reports(&reports, &criteria, &TagCatalog::default());
//! let mut layer = HeatmapLayer::new(HeatmapConfig::default());
//! layer.project(filtered.iter().map(|r| r.location));
//! assert_eq!(layer.features().len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod filter;
pub mod geo_utils;
pub mod heatmap;
pub mod store;
pub mod view;

pub use filter::{
    clamp_single_day, filter_predictions, filter_reports, FilterCriteria, TagCatalog, TagGroup,
};
pub use geo_utils::{bounding_box_deltas, distance_km, web_mercator, BoxDeltas, EARTH_RADIUS_KM};
pub use heatmap::{HeatmapConfig, HeatmapFeature, HeatmapLayer};
pub use store::{FetchStrategy, ReportStore, StoreError};
pub use view::{
    FixedLocationProvider, LocationError, LocationProvider, PredictionMapController,
    PredictionSource, ReportMapController, ReportSource, ViewState, DEFAULT_PREDICTION_RADIUS_KM,
    DEFAULT_REPORT_RADIUS_KM, DEFAULT_TAG_GROUP, DEFAULT_ZOOM,
};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("ReportHeatmapRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use report_heatmap::GeoPoint;
/// let point = GeoPoint::new(43.7228, 10.4017); // Pisa
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A latitude/longitude rectangle approximating a circular search radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// The box enclosing `radius_km` around a center point.
    ///
    /// Not meaningful near the poles; see
    /// [`geo_utils::bounding_box_deltas`].
    pub fn around(center: &GeoPoint, radius_km: f64) -> Self {
        let deltas = geo_utils::bounding_box_deltas(radius_km, center.latitude);
        Self {
            min_lat: center.latitude - deltas.lat_delta,
            max_lat: center.latitude + deltas.lat_delta,
            min_lon: center.longitude - deltas.lon_delta,
            max_lon: center.longitude + deltas.lon_delta,
        }
    }

    /// Inclusive containment check.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
    }

    /// Get the center point of the box.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

/// A point in web-mercator (EPSG:3857) coordinates, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

/// A submitted citizen report. Immutable once stored; this core only
/// reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub location: GeoPoint,
    /// Issue tags attached at submission, set semantics.
    pub tags: Vec<String>,
    /// Submission instant; reports stored without one never pass the
    /// time filter.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Report {
    pub fn new(location: GeoPoint, tags: Vec<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            location,
            tags,
            timestamp,
        }
    }
}

/// A precomputed prediction record. Only the freshest `pred_date` batch
/// per bounding box is ever used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub latitude: f64,
    pub longitude: f64,
    /// Single category label, matched exactly against the selected group.
    pub group: String,
    pub pred_date: String,
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{info, warn};

    /// Report representation for the binding layer: timestamps cross the
    /// boundary as epoch milliseconds.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiReport {
        pub latitude: f64,
        pub longitude: f64,
        pub tags: Vec<String>,
        pub timestamp_ms: Option<i64>,
    }

    impl From<&Report> for FfiReport {
        fn from(report: &Report) -> Self {
            Self {
                latitude: report.location.latitude,
                longitude: report.location.longitude,
                tags: report.tags.clone(),
                timestamp_ms: report.timestamp.map(|ts| ts.timestamp_millis()),
            }
        }
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiPrediction {
        pub latitude: f64,
        pub longitude: f64,
        pub group: String,
        pub pred_date: String,
    }

    /// An inclusive time range in epoch milliseconds.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct TimeRangeMs {
        pub start_ms: i64,
        pub end_ms: i64,
    }

    /// Result of a blocking report fetch. Mirrors the fail-soft contract:
    /// on failure the shell keeps whatever it was showing.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FetchReportsResult {
        pub reports: Vec<FfiReport>,
        pub success: bool,
        pub error: Option<String>,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FetchPredictionsResult {
        pub predictions: Vec<FfiPrediction>,
        pub success: bool,
        pub error: Option<String>,
    }

    fn to_report(report: &FfiReport) -> Report {
        Report {
            location: GeoPoint::new(report.latitude, report.longitude),
            tags: report.tags.clone(),
            timestamp: report.timestamp_ms.and_then(DateTime::from_timestamp_millis),
        }
    }

    fn ms_to_instant(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// The build-time tag catalog, group order preserved.
    #[uniffi::export]
    pub fn default_tag_catalog() -> Vec<TagGroup> {
        TagCatalog::default().groups().to_vec()
    }

    /// Great-circle distance between two points in kilometers.
    #[uniffi::export]
    pub fn ffi_distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
        geo_utils::distance_km(&a, &b)
    }

    /// Bounding box enclosing `radius_km` around a center point.
    #[uniffi::export]
    pub fn ffi_bounding_box_around(center: GeoPoint, radius_km: f64) -> BoundingBox {
        BoundingBox::around(&center, radius_km)
    }

    /// Date-range dialog rule: identical start/end becomes that full day.
    #[uniffi::export]
    pub fn ffi_clamp_single_day(start_ms: i64, end_ms: i64) -> TimeRangeMs {
        let (start, end) = clamp_single_day(ms_to_instant(start_ms), ms_to_instant(end_ms));
        TimeRangeMs {
            start_ms: start.timestamp_millis(),
            end_ms: end.timestamp_millis(),
        }
    }

    /// Filter reports by tag group and inclusive time range.
    #[uniffi::export]
    pub fn ffi_filter_reports(
        reports: Vec<FfiReport>,
        tag_group: String,
        start_ms: i64,
        end_ms: i64,
    ) -> Vec<FfiReport> {
        init_logging();
        let typed: Vec<Report> = reports.iter().map(to_report).collect();
        let criteria = FilterCriteria::new(tag_group, ms_to_instant(start_ms), ms_to_instant(end_ms));
        let kept = filter_reports(&typed, &criteria, &TagCatalog::default());
        info!(
            "[ReportHeatmapRust] filtered {} of {} reports",
            kept.len(),
            reports.len()
        );
        kept.iter().map(FfiReport::from).collect()
    }

    /// Project reports into weighted heatmap features.
    #[uniffi::export]
    pub fn ffi_project_features(reports: Vec<FfiReport>, config: HeatmapConfig) -> Vec<HeatmapFeature> {
        let mut layer = HeatmapLayer::new(config);
        layer.project(
            reports
                .iter()
                .map(|r| GeoPoint::new(r.latitude, r.longitude)),
        );
        layer.features().to_vec()
    }

    /// Get the default (report view) heatmap configuration.
    #[uniffi::export]
    pub fn default_heatmap_config() -> HeatmapConfig {
        HeatmapConfig::default()
    }

    /// Get the prediction view heatmap configuration.
    #[uniffi::export]
    pub fn prediction_heatmap_config() -> HeatmapConfig {
        HeatmapConfig::predictions()
    }

    /// Blocking wrapper over the nearby-report fetch for shells without
    /// an async runtime of their own.
    #[uniffi::export]
    pub fn fetch_reports_near_sync(
        base_url: String,
        api_key: String,
        strategy: FetchStrategy,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> FetchReportsResult {
        init_logging();
        info!("[ReportHeatmapRust] fetch_reports_near_sync ({latitude}, {longitude}) r={radius_km}km");

        let center = GeoPoint::new(latitude, longitude);
        match block_on_store(&base_url, &api_key, strategy, |store, rt| {
            rt.block_on(store.fetch_reports_near(&center, radius_km))
        }) {
            Ok(reports) => FetchReportsResult {
                reports: reports.iter().map(FfiReport::from).collect(),
                success: true,
                error: None,
            },
            Err(message) => {
                warn!("[ReportHeatmapRust] report fetch failed: {message}");
                FetchReportsResult {
                    reports: vec![],
                    success: false,
                    error: Some(message),
                }
            }
        }
    }

    /// Blocking wrapper over the freshest-prediction fetch.
    #[uniffi::export]
    pub fn fetch_latest_predictions_sync(
        base_url: String,
        api_key: String,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> FetchPredictionsResult {
        init_logging();
        info!("[ReportHeatmapRust] fetch_latest_predictions_sync ({latitude}, {longitude}) r={radius_km}km");

        let center = GeoPoint::new(latitude, longitude);
        match block_on_store(&base_url, &api_key, FetchStrategy::BoundingBox, |store, rt| {
            rt.block_on(store.fetch_latest_predictions(&center, radius_km))
        }) {
            Ok(predictions) => FetchPredictionsResult {
                predictions: predictions
                    .iter()
                    .map(|p| FfiPrediction {
                        latitude: p.latitude,
                        longitude: p.longitude,
                        group: p.group.clone(),
                        pred_date: p.pred_date.clone(),
                    })
                    .collect(),
                success: true,
                error: None,
            },
            Err(message) => {
                warn!("[ReportHeatmapRust] prediction fetch failed: {message}");
                FetchPredictionsResult {
                    predictions: vec![],
                    success: false,
                    error: Some(message),
                }
            }
        }
    }

    /// Build a store client and a runtime, run one store call on it, and
    /// flatten every failure into a message for the result record.
    fn block_on_store<T>(
        base_url: &str,
        api_key: &str,
        strategy: FetchStrategy,
        call: impl FnOnce(&ReportStore, &tokio::runtime::Runtime) -> Result<T, StoreError>,
    ) -> Result<T, String> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Runtime error: {e}"))?;
        let store = ReportStore::new(base_url, api_key, strategy).map_err(|e| e.to_string())?;
        call(&store, &rt).map_err(|e| e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
