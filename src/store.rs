//! Client for the remote report/prediction document store.
//!
//! The store is a schemaless JSON document service spoken over HTTP. Two
//! operations are used: a field-filtered query (comparison and equality
//! predicates, optional ordering and limit) and a full-collection read.
//! Documents are mapped into typed [`Report`]/[`Prediction`] values right
//! here at the boundary; malformed records are logged and skipped so
//! untyped data never leaks downstream.

use base64::Engine;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::geo_utils::distance_km;
use crate::{BoundingBox, GeoPoint, Prediction, Report};

const REPORTS_COLLECTION: &str = "reports";
const PREDICTIONS_COLLECTION: &str = "predictions";

const REPORT_LAT_FIELD: &str = "location.latitude";
const REPORT_LON_FIELD: &str = "location.longitude";
const PREDICTION_LAT_FIELD: &str = "latitude";
const PREDICTION_LON_FIELD: &str = "longitude";
const PREDICTION_DATE_FIELD: &str = "pred_date";

/// How nearby candidates are narrowed to the search radius.
///
/// Selectable per deployment; the trade-off is index support versus
/// collection size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FetchStrategy {
    /// One range query carrying both latitude and longitude predicates.
    /// Requires the store to index both fields for comparison (the
    /// default deployment maintains the composite index).
    BoundingBox,
    /// Read the whole collection and keep records within the radius by
    /// great-circle distance. O(collection size) per call; only viable
    /// for small collections.
    FullScan,
}

/// Errors surfaced by store calls. The view controller is the fail-soft
/// boundary: it logs these and keeps its previous candidate set.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Serialize)]
struct FieldFilter {
    field: String,
    op: &'static str,
    value: Value,
}

#[derive(Debug, Serialize)]
struct OrderBy {
    field: String,
    direction: &'static str,
}

/// Body of a `POST /collections/{name}/query` call.
#[derive(Debug, Serialize)]
struct QueryRequest {
    filters: Vec<FieldFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_by: Option<OrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    documents: Vec<Value>,
}

/// Client for the report/prediction document store.
pub struct ReportStore {
    client: Client,
    base_url: String,
    auth_header: String,
    strategy: FetchStrategy,
}

impl ReportStore {
    /// Create a store client for the given deployment.
    ///
    /// No request timeout is configured: an unresponsive store leaves the
    /// calling view in its loading state until the store answers.
    pub fn new(base_url: &str, api_key: &str, strategy: FetchStrategy) -> Result<Self, StoreError> {
        let auth = base64::engine::general_purpose::STANDARD.encode(format!("API_KEY:{}", api_key));

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {}", auth),
            strategy,
        })
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    /// Fetch candidate reports around a center point.
    ///
    /// Uses the configured [`FetchStrategy`]. Either way the result is
    /// typed reports only; malformed documents are skipped with a warning.
    pub async fn fetch_reports_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Report>, StoreError> {
        let documents = match self.strategy {
            FetchStrategy::BoundingBox => {
                let bbox = BoundingBox::around(center, radius_km);
                debug!(
                    "report bounding box: ({:.5}, {:.5}) to ({:.5}, {:.5})",
                    bbox.min_lat, bbox.min_lon, bbox.max_lat, bbox.max_lon
                );
                let request = QueryRequest {
                    filters: bounding_box_filters(&bbox, REPORT_LAT_FIELD, REPORT_LON_FIELD),
                    order_by: None,
                    limit: None,
                };
                self.run_query(REPORTS_COLLECTION, &request).await?
            }
            FetchStrategy::FullScan => self.fetch_collection(REPORTS_COLLECTION).await?,
        };

        let total = documents.len();
        let mut reports: Vec<Report> = documents
            .iter()
            .filter_map(|doc| {
                let report = report_from_document(doc);
                if report.is_none() {
                    warn!("skipping malformed report document: {doc}");
                }
                report
            })
            .collect();

        if self.strategy == FetchStrategy::FullScan {
            reports = keep_within_radius(reports, center, radius_km);
        }

        info!(
            "fetched {} reports within {} km ({} documents scanned)",
            reports.len(),
            radius_km,
            total
        );
        Ok(reports)
    }

    /// Fetch the freshest batch of predictions around a center point.
    ///
    /// Two-phase freshness selection: an ordered probe (limit 1) discovers
    /// the maximum `pred_date` inside the bounding box, then an equality
    /// query returns every record sharing that date. Ties on the max date
    /// are all kept; there is no secondary ordering. An empty box yields
    /// an empty result, not an error.
    pub async fn fetch_latest_predictions(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Prediction>, StoreError> {
        let bbox = BoundingBox::around(center, radius_km);
        let box_filters = bounding_box_filters(&bbox, PREDICTION_LAT_FIELD, PREDICTION_LON_FIELD);

        let probe = QueryRequest {
            filters: box_filters.clone(),
            order_by: Some(OrderBy {
                field: PREDICTION_DATE_FIELD.to_string(),
                direction: "desc",
            }),
            limit: Some(1),
        };
        let freshest = self.run_query(PREDICTIONS_COLLECTION, &probe).await?;

        let most_recent = match freshest
            .first()
            .and_then(|doc| doc.get(PREDICTION_DATE_FIELD))
            .and_then(Value::as_str)
        {
            Some(date) => date.to_string(),
            None => {
                info!("no dated predictions inside the bounding box");
                return Ok(Vec::new());
            }
        };
        debug!("most recent pred_date: {most_recent}");

        let mut filters = box_filters;
        filters.push(FieldFilter {
            field: PREDICTION_DATE_FIELD.to_string(),
            op: "==",
            value: Value::String(most_recent.clone()),
        });
        let batch = QueryRequest {
            filters,
            order_by: None,
            limit: None,
        };
        let documents = self.run_query(PREDICTIONS_COLLECTION, &batch).await?;

        let predictions: Vec<Prediction> = documents
            .iter()
            .filter_map(|doc| {
                let prediction = prediction_from_document(doc);
                if prediction.is_none() {
                    warn!("skipping malformed prediction document: {doc}");
                }
                prediction
            })
            .collect();

        info!(
            "fetched {} predictions dated {} within {} km",
            predictions.len(),
            most_recent,
            radius_km
        );
        Ok(predictions)
    }

    async fn run_query(&self, collection: &str, request: &QueryRequest) -> Result<Vec<Value>, StoreError> {
        let url = format!("{}/collections/{}/query", self.base_url, collection);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: DocumentsResponse = response.json().await?;
        Ok(body.documents)
    }

    async fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let url = format!("{}/collections/{}/documents", self.base_url, collection);
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: DocumentsResponse = response.json().await?;
        Ok(body.documents)
    }
}

fn bounding_box_filters(bbox: &BoundingBox, lat_field: &str, lon_field: &str) -> Vec<FieldFilter> {
    vec![
        FieldFilter {
            field: lat_field.to_string(),
            op: ">=",
            value: bbox.min_lat.into(),
        },
        FieldFilter {
            field: lat_field.to_string(),
            op: "<=",
            value: bbox.max_lat.into(),
        },
        FieldFilter {
            field: lon_field.to_string(),
            op: ">=",
            value: bbox.min_lon.into(),
        },
        FieldFilter {
            field: lon_field.to_string(),
            op: "<=",
            value: bbox.max_lon.into(),
        },
    ]
}

/// Client-side distance filter for the full-scan strategy.
fn keep_within_radius(reports: Vec<Report>, center: &GeoPoint, radius_km: f64) -> Vec<Report> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        reports
            .into_par_iter()
            .filter(|r| distance_km(&r.location, center) <= radius_km)
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        reports
            .into_iter()
            .filter(|r| distance_km(&r.location, center) <= radius_km)
            .collect()
    }
}

/// Map a schemaless report document into a typed [`Report`].
///
/// Location is required and must be a valid coordinate pair. Missing
/// tags become an empty set. A missing or null timestamp is kept as
/// `None` (the filter excludes it later); an unparseable timestamp makes
/// the whole record malformed.
fn report_from_document(doc: &Value) -> Option<Report> {
    let location = doc.get("location")?;
    let latitude = location.get("latitude")?.as_f64()?;
    let longitude = location.get("longitude")?.as_f64()?;
    let point = GeoPoint::new(latitude, longitude);
    if !point.is_valid() {
        return None;
    }

    let tags: Vec<String> = doc
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let timestamp = match doc.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(parse_timestamp(raw)?),
        Some(_) => return None,
    };

    Some(Report {
        location: point,
        tags,
        timestamp,
    })
}

/// Map a schemaless prediction document into a typed [`Prediction`].
fn prediction_from_document(doc: &Value) -> Option<Prediction> {
    let latitude = doc.get("latitude")?.as_f64()?;
    let longitude = doc.get("longitude")?.as_f64()?;
    if !GeoPoint::new(latitude, longitude).is_valid() {
        return None;
    }
    let group = doc.get("group")?.as_str()?.to_string();
    let pred_date = doc.get(PREDICTION_DATE_FIELD)?.as_str()?.to_string();

    Some(Prediction {
        latitude,
        longitude,
        group,
        pred_date,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_bounding_box_query_body() {
        let bbox = BoundingBox {
            min_lat: 43.6,
            max_lat: 43.8,
            min_lon: 10.2,
            max_lon: 10.6,
        };
        let request = QueryRequest {
            filters: bounding_box_filters(&bbox, REPORT_LAT_FIELD, REPORT_LON_FIELD),
            order_by: None,
            limit: None,
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "filters": [
                    {"field": "location.latitude", "op": ">=", "value": 43.6},
                    {"field": "location.latitude", "op": "<=", "value": 43.8},
                    {"field": "location.longitude", "op": ">=", "value": 10.2},
                    {"field": "location.longitude", "op": "<=", "value": 10.6},
                ]
            })
        );
    }

    #[test]
    fn test_freshness_probe_body_orders_and_limits() {
        let bbox = BoundingBox {
            min_lat: 43.6,
            max_lat: 43.8,
            min_lon: 10.2,
            max_lon: 10.6,
        };
        let request = QueryRequest {
            filters: bounding_box_filters(&bbox, PREDICTION_LAT_FIELD, PREDICTION_LON_FIELD),
            order_by: Some(OrderBy {
                field: PREDICTION_DATE_FIELD.to_string(),
                direction: "desc",
            }),
            limit: Some(1),
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["order_by"], json!({"field": "pred_date", "direction": "desc"}));
        assert_eq!(body["limit"], json!(1));
        assert_eq!(body["filters"][0]["field"], json!("latitude"));
    }

    #[test]
    fn test_report_from_complete_document() {
        let doc = json!({
            "location": {"latitude": 43.71, "longitude": 10.40},
            "tags": ["Litter", "Graffiti"],
            "timestamp": "2024-01-05T12:00:00Z",
        });

        let report = report_from_document(&doc).unwrap();
        assert_eq!(report.location.latitude, 43.71);
        assert_eq!(report.tags, vec!["Litter", "Graffiti"]);
        assert_eq!(
            report.timestamp.unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_report_without_timestamp_keeps_none() {
        let doc = json!({
            "location": {"latitude": 43.71, "longitude": 10.40},
            "tags": ["Litter"],
            "timestamp": null,
        });
        assert!(report_from_document(&doc).unwrap().timestamp.is_none());

        let absent = json!({
            "location": {"latitude": 43.71, "longitude": 10.40},
            "tags": ["Litter"],
        });
        assert!(report_from_document(&absent).unwrap().timestamp.is_none());
    }

    #[test]
    fn test_report_without_tags_defaults_empty() {
        let doc = json!({
            "location": {"latitude": 43.71, "longitude": 10.40},
        });
        assert!(report_from_document(&doc).unwrap().tags.is_empty());
    }

    #[test]
    fn test_malformed_reports_rejected() {
        // No location at all.
        assert!(report_from_document(&json!({"tags": ["Litter"]})).is_none());
        // Latitude out of range.
        assert!(report_from_document(&json!({
            "location": {"latitude": 191.0, "longitude": 10.40},
        }))
        .is_none());
        // Unparseable timestamp.
        assert!(report_from_document(&json!({
            "location": {"latitude": 43.71, "longitude": 10.40},
            "timestamp": "last tuesday",
        }))
        .is_none());
    }

    #[test]
    fn test_prediction_from_document() {
        let doc = json!({
            "latitude": 43.71,
            "longitude": 10.40,
            "group": "environmental",
            "pred_date": "2024-03-01",
        });
        let prediction = prediction_from_document(&doc).unwrap();
        assert_eq!(prediction.group, "environmental");
        assert_eq!(prediction.pred_date, "2024-03-01");
    }

    #[test]
    fn test_prediction_requires_group_and_date() {
        assert!(prediction_from_document(&json!({
            "latitude": 43.71,
            "longitude": 10.40,
            "pred_date": "2024-03-01",
        }))
        .is_none());
        assert!(prediction_from_document(&json!({
            "latitude": 43.71,
            "longitude": 10.40,
            "group": "environmental",
        }))
        .is_none());
    }

    #[test]
    fn test_keep_within_radius() {
        let center = GeoPoint::new(43.7, 10.4);
        let near = Report {
            location: GeoPoint::new(43.71, 10.41),
            tags: vec![],
            timestamp: None,
        };
        let far = Report {
            location: GeoPoint::new(45.46, 9.19), // Milan, ~180 km away
            tags: vec![],
            timestamp: None,
        };

        let kept = keep_within_radius(vec![near.clone(), far], &center, 10.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].location, near.location);
    }
}
