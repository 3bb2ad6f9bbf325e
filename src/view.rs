//! View controllers for the report and prediction map screens.
//!
//! Each controller drives one strictly sequential flow on load: acquire
//! the user location, re-center the map, fetch candidates, filter,
//! project. Later tag-group or time-range changes re-run only filter and
//! projection against the already-fetched candidates.
//!
//! Failures are soft: they are logged, the state moves to
//! [`ViewState::Error`], and the previous candidate set stays in place.
//! Nothing is retried until the next `load`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::filter::{clamp_single_day, filter_predictions, filter_reports, FilterCriteria, TagCatalog};
use crate::heatmap::{HeatmapConfig, HeatmapLayer};
use crate::store::{ReportStore, StoreError};
use crate::{GeoPoint, Prediction, Report};

/// Default search radius for the report view.
pub const DEFAULT_REPORT_RADIUS_KM: f64 = 10.0;
/// Default search radius for the prediction view.
pub const DEFAULT_PREDICTION_RADIUS_KM: f64 = 15.0;
/// Tag group selected when a view first opens.
pub const DEFAULT_TAG_GROUP: &str = "environmental";

/// Initial map center before the user location is known.
const DEFAULT_CENTER: GeoPoint = GeoPoint {
    latitude: 43.7,
    longitude: 10.4,
};
/// Initial map zoom level.
pub const DEFAULT_ZOOM: u32 = 13;

/// Lifecycle state of a view. There is no retry state: an error is
/// terminal until the next `load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    Loading,
    Loaded,
    Error,
}

/// Errors from the device location collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location provider failed: {0}")]
    Unavailable(String),
}

/// Device geolocation collaborator. The platform shell implements this
/// (including any permission prompt it needs to show first).
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> Result<GeoPoint, LocationError>;
}

/// A fixed-position provider, for demos and deployments without a
/// location service.
pub struct FixedLocationProvider(pub GeoPoint);

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_location(&self) -> Result<GeoPoint, LocationError> {
        Ok(self.0)
    }
}

/// Source of candidate reports around a point.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn reports_near(&self, center: &GeoPoint, radius_km: f64) -> Result<Vec<Report>, StoreError>;
}

/// Source of the freshest prediction batch around a point.
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn latest_predictions_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Prediction>, StoreError>;
}

#[async_trait]
impl ReportSource for ReportStore {
    async fn reports_near(&self, center: &GeoPoint, radius_km: f64) -> Result<Vec<Report>, StoreError> {
        self.fetch_reports_near(center, radius_km).await
    }
}

#[async_trait]
impl PredictionSource for ReportStore {
    async fn latest_predictions_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Prediction>, StoreError> {
        self.fetch_latest_predictions(center, radius_km).await
    }
}

/// Controller for the citizen-report heatmap screen.
pub struct ReportMapController {
    location: Box<dyn LocationProvider>,
    source: Box<dyn ReportSource>,
    catalog: TagCatalog,
    criteria: FilterCriteria,
    radius_km: f64,
    reports: Vec<Report>,
    user_location: Option<GeoPoint>,
    map_center: GeoPoint,
    heatmap: HeatmapLayer,
    state: ViewState,
}

impl ReportMapController {
    pub fn new(location: Box<dyn LocationProvider>, source: Box<dyn ReportSource>) -> Self {
        Self {
            location,
            source,
            catalog: TagCatalog::default(),
            criteria: FilterCriteria::today(DEFAULT_TAG_GROUP),
            radius_km: DEFAULT_REPORT_RADIUS_KM,
            reports: Vec::new(),
            user_location: None,
            map_center: DEFAULT_CENTER,
            heatmap: HeatmapLayer::new(HeatmapConfig::default()),
            state: ViewState::Idle,
        }
    }

    /// Run the full load flow: location, fetch, filter, project.
    ///
    /// Strictly sequential; each failure is logged and degrades to "no
    /// new data" while keeping the previous candidate set.
    pub async fn load(&mut self) {
        self.state = ViewState::Loading;

        let center = match self.location.current_location().await {
            Ok(point) => point,
            Err(err) => {
                warn!("user location unavailable, skipping fetch: {err}");
                self.state = ViewState::Error;
                self.refresh_heatmap();
                return;
            }
        };
        info!("user location: ({:.6}, {:.6})", center.latitude, center.longitude);
        self.user_location = Some(center);
        self.map_center = center;

        match self.source.reports_near(&center, self.radius_km).await {
            Ok(reports) => {
                self.reports = reports;
                self.state = ViewState::Loaded;
            }
            Err(err) => {
                warn!("fetching nearby reports failed, keeping previous candidates: {err}");
                self.state = ViewState::Error;
            }
        }

        self.refresh_heatmap();
    }

    /// Select another tag group; re-filters the fetched candidates
    /// without touching the store.
    pub fn set_tag_group(&mut self, group: impl Into<String>) {
        self.criteria.tag_group = group.into();
        self.refresh_heatmap();
    }

    /// Apply a time range from the date-range dialog. An identical
    /// start/end pick is treated as that single full day.
    pub fn set_time_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        let (start, end) = clamp_single_day(start, end);
        self.criteria.start = start;
        self.criteria.end = end;
        self.refresh_heatmap();
    }

    fn refresh_heatmap(&mut self) {
        let filtered = filter_reports(&self.reports, &self.criteria, &self.catalog);
        debug!(
            "{} of {} reports match group '{}' in range",
            filtered.len(),
            self.reports.len(),
            self.criteria.tag_group
        );
        self.heatmap.project(filtered.iter().map(|r| r.location));
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn heatmap(&self) -> &HeatmapLayer {
        &self.heatmap
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn map_center(&self) -> GeoPoint {
        self.map_center
    }

    pub fn user_location(&self) -> Option<GeoPoint> {
        self.user_location
    }

    /// Number of fetched candidates, before filtering.
    pub fn candidate_count(&self) -> usize {
        self.reports.len()
    }
}

/// Controller for the prediction heatmap screen.
///
/// Same skeleton as [`ReportMapController`], but candidates come from the
/// freshest prediction batch and the filter is a plain group-label match.
pub struct PredictionMapController {
    location: Box<dyn LocationProvider>,
    source: Box<dyn PredictionSource>,
    selected_group: String,
    radius_km: f64,
    predictions: Vec<Prediction>,
    map_center: GeoPoint,
    heatmap: HeatmapLayer,
    state: ViewState,
}

impl PredictionMapController {
    pub fn new(location: Box<dyn LocationProvider>, source: Box<dyn PredictionSource>) -> Self {
        Self {
            location,
            source,
            selected_group: DEFAULT_TAG_GROUP.to_string(),
            radius_km: DEFAULT_PREDICTION_RADIUS_KM,
            predictions: Vec::new(),
            map_center: DEFAULT_CENTER,
            heatmap: HeatmapLayer::new(HeatmapConfig::predictions()),
            state: ViewState::Idle,
        }
    }

    pub async fn load(&mut self) {
        self.state = ViewState::Loading;

        let center = match self.location.current_location().await {
            Ok(point) => point,
            Err(err) => {
                warn!("user location unavailable, skipping fetch: {err}");
                self.state = ViewState::Error;
                self.refresh_heatmap();
                return;
            }
        };
        self.map_center = center;

        match self.source.latest_predictions_near(&center, self.radius_km).await {
            Ok(predictions) => {
                self.predictions = predictions;
                self.state = ViewState::Loaded;
            }
            Err(err) => {
                warn!("fetching predictions failed, keeping previous candidates: {err}");
                self.state = ViewState::Error;
            }
        }

        self.refresh_heatmap();
    }

    pub fn set_group(&mut self, group: impl Into<String>) {
        self.selected_group = group.into();
        self.refresh_heatmap();
    }

    fn refresh_heatmap(&mut self) {
        let filtered = filter_predictions(&self.predictions, &self.selected_group);
        debug!(
            "{} of {} predictions match group '{}'",
            filtered.len(),
            self.predictions.len(),
            self.selected_group
        );
        self.heatmap
            .project(filtered.iter().map(|p| GeoPoint::new(p.latitude, p.longitude)));
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn heatmap(&self) -> &HeatmapLayer {
        &self.heatmap
    }

    pub fn map_center(&self) -> GeoPoint {
        self.map_center
    }

    pub fn candidate_count(&self) -> usize {
        self.predictions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct NoLocation;

    #[async_trait]
    impl LocationProvider for NoLocation {
        async fn current_location(&self) -> Result<GeoPoint, LocationError> {
            Err(LocationError::PermissionDenied)
        }
    }

    /// Yields one scripted response per call and counts the calls.
    struct ScriptedReports {
        responses: Mutex<VecDeque<Result<Vec<Report>, StoreError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedReports {
        fn new(responses: Vec<Result<Vec<Report>, StoreError>>, calls: Arc<AtomicUsize>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls,
            }
        }
    }

    #[async_trait]
    impl ReportSource for ScriptedReports {
        async fn reports_near(&self, _: &GeoPoint, _: f64) -> Result<Vec<Report>, StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct StaticPredictions(Vec<Prediction>);

    #[async_trait]
    impl PredictionSource for StaticPredictions {
        async fn latest_predictions_near(
            &self,
            _: &GeoPoint,
            _: f64,
        ) -> Result<Vec<Prediction>, StoreError> {
            Ok(self.0.clone())
        }
    }

    fn pisa() -> GeoPoint {
        GeoPoint::new(43.724591, 10.382981)
    }

    fn instant(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn report(tag: &str, timestamp: DateTime<Utc>) -> Report {
        Report {
            location: GeoPoint::new(43.71, 10.40),
            tags: vec![tag.to_string()],
            timestamp: Some(timestamp),
        }
    }

    fn january_reports() -> Vec<Report> {
        vec![
            report("Litter", instant(2024, 1, 5, 12)),
            report("Vandalism", instant(2024, 1, 5, 13)),
            report("Pothole", instant(2024, 1, 6, 9)),
        ]
    }

    #[tokio::test]
    async fn test_load_fetches_filters_and_centers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedReports::new(vec![Ok(january_reports())], Arc::clone(&calls));
        let mut controller =
            ReportMapController::new(Box::new(FixedLocationProvider(pisa())), Box::new(source));

        controller.load().await;
        controller.set_time_range(instant(2024, 1, 1, 0), instant(2024, 1, 10, 0));

        assert_eq!(controller.state(), ViewState::Loaded);
        assert_eq!(controller.map_center(), pisa());
        assert_eq!(controller.candidate_count(), 3);
        // Default group is environmental: only the Litter report projects.
        assert_eq!(controller.heatmap().features().len(), 1);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_criteria_changes_do_not_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedReports::new(vec![Ok(january_reports())], Arc::clone(&calls));
        let mut controller =
            ReportMapController::new(Box::new(FixedLocationProvider(pisa())), Box::new(source));

        controller.load().await;
        controller.set_time_range(instant(2024, 1, 1, 0), instant(2024, 1, 10, 0));
        controller.set_tag_group("safety");
        controller.set_tag_group("infrastructure");

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(controller.heatmap().features().len(), 1); // the Pothole report
    }

    #[tokio::test]
    async fn test_location_failure_skips_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedReports::new(vec![Ok(january_reports())], Arc::clone(&calls));
        let mut controller = ReportMapController::new(Box::new(NoLocation), Box::new(source));

        controller.load().await;

        assert_eq!(controller.state(), ViewState::Error);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(controller.heatmap().is_empty());
        assert!(controller.user_location().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_candidates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedReports::new(
            vec![
                Ok(january_reports()),
                Err(StoreError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                }),
            ],
            Arc::clone(&calls),
        );
        let mut controller =
            ReportMapController::new(Box::new(FixedLocationProvider(pisa())), Box::new(source));

        controller.load().await;
        controller.set_time_range(instant(2024, 1, 1, 0), instant(2024, 1, 10, 0));
        assert_eq!(controller.candidate_count(), 3);

        controller.load().await;

        assert_eq!(controller.state(), ViewState::Error);
        // The failed fetch left the candidate set untouched.
        assert_eq!(controller.candidate_count(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_single_day_pick_coerced_to_full_day() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reports = vec![report("Litter", instant(2024, 3, 1, 18))];
        let source = ScriptedReports::new(vec![Ok(reports)], Arc::clone(&calls));
        let mut controller =
            ReportMapController::new(Box::new(FixedLocationProvider(pisa())), Box::new(source));

        controller.load().await;
        let picked = instant(2024, 3, 1, 9);
        controller.set_time_range(picked, picked);

        // 18:00 falls after the picked instant but inside the coerced day.
        assert_eq!(controller.heatmap().features().len(), 1);
        assert_eq!(controller.criteria().start, picked);
        assert_eq!(
            controller.criteria().end,
            Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap()
                + chrono::Duration::milliseconds(999)
        );
    }

    #[tokio::test]
    async fn test_prediction_view_filters_by_group() {
        let predictions = vec![
            Prediction {
                latitude: 43.71,
                longitude: 10.40,
                group: "environmental".to_string(),
                pred_date: "2024-03-01".to_string(),
            },
            Prediction {
                latitude: 43.72,
                longitude: 10.41,
                group: "safety".to_string(),
                pred_date: "2024-03-01".to_string(),
            },
        ];
        let mut controller = PredictionMapController::new(
            Box::new(FixedLocationProvider(pisa())),
            Box::new(StaticPredictions(predictions)),
        );

        controller.load().await;

        assert_eq!(controller.state(), ViewState::Loaded);
        assert_eq!(controller.candidate_count(), 2);
        assert_eq!(controller.heatmap().features().len(), 1);
        assert_eq!(controller.heatmap().features()[0].weight, 0.9);

        controller.set_group("safety");
        assert_eq!(controller.heatmap().features().len(), 1);

        controller.set_group("wildlife");
        assert!(controller.heatmap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedReports::new(vec![Ok(Vec::new())], Arc::clone(&calls));
        let mut controller =
            ReportMapController::new(Box::new(FixedLocationProvider(pisa())), Box::new(source));

        controller.load().await;

        assert_eq!(controller.state(), ViewState::Loaded);
        assert!(controller.heatmap().is_empty());
    }
}
