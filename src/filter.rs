//! Tag catalog and report filtering.
//!
//! Narrows a fetched candidate set by tag-group membership and an
//! inclusive time range. Filtering is pure: criteria and catalog come in
//! as explicit arguments, a fresh `Vec` comes out, and the input order is
//! preserved. Re-running the filter after a criteria change never touches
//! the store.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{Prediction, Report};

/// A named category bundling several specific issue tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TagGroup {
    pub name: String,
    /// Member tags, in catalog order.
    pub tags: Vec<String>,
}

/// The build-time catalog of tag groups.
///
/// Fixed at compile time; there is no persistence and no runtime editing.
/// Group order and member order are stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCatalog {
    groups: Vec<TagGroup>,
}

impl TagCatalog {
    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&TagGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// All groups, in catalog order.
    pub fn groups(&self) -> &[TagGroup] {
        &self.groups
    }
}

impl Default for TagCatalog {
    fn default() -> Self {
        fn group(name: &str, tags: &[&str]) -> TagGroup {
            TagGroup {
                name: name.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            }
        }

        Self {
            groups: vec![
                group(
                    "environmental",
                    &["Litter", "Illegal Dumping", "Air Pollution", "Water Pollution"],
                ),
                group(
                    "infrastructure",
                    &[
                        "Pothole",
                        "Cracked Pavement",
                        "Broken Streetlight",
                        "Damaged Bench",
                        "Blocked Drainage",
                        "Abandoned Vehicle",
                    ],
                ),
                group(
                    "safety",
                    &[
                        "Vandalism",
                        "Unsafe Building",
                        "Unsafe Bridge",
                        "Broken Traffic Signals",
                        "Open Manholes",
                    ],
                ),
                group(
                    "aesthetic",
                    &["Overgrown Vegetation", "Graffiti", "Neglected Monuments", "Faded Paint"],
                ),
                group("wildlife", &["Dead Animals", "Animal Menace"]),
            ],
        }
    }
}

/// The user-selected filter: a tag group and an inclusive time range.
///
/// Mutated only by the UI-driven flow (tag selector, date-range dialog);
/// there are no concurrent writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Key into the [`TagCatalog`].
    pub tag_group: String,
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
}

impl FilterCriteria {
    pub fn new(tag_group: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            tag_group: tag_group.into(),
            start,
            end,
        }
    }

    /// Criteria covering the current local day,
    /// [00:00:00.000, 23:59:59.999].
    pub fn today(tag_group: impl Into<String>) -> Self {
        Self::single_day(tag_group, Local::now().date_naive())
    }

    /// Criteria covering one full local day.
    pub fn single_day(tag_group: impl Into<String>, date: NaiveDate) -> Self {
        let start = local_to_utc(start_of_day(date));
        let end = local_to_utc(end_of_day(date));
        Self::new(tag_group, start, end)
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).expect("midnight is always valid")
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_milli_opt(23, 59, 59, 999).expect("end of day is always valid")
}

/// Interpret a wall-clock time in the local timezone. Times skipped over
/// by a DST transition fall back to the UTC reading.
fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Apply the date-range dialog's single-day rule: identical start and end
/// instants mean the user picked one day, so the end is pushed to
/// 23:59:59.999 of that same date.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Timelike, Utc};
/// use report_heatmap::clamp_single_day;
///
/// let picked = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
/// let (start, end) = clamp_single_day(picked, picked);
/// assert_eq!(start, picked);
/// assert_eq!(end.hour(), 23);
/// assert_eq!(end.timestamp_subsec_millis(), 999);
/// ```
pub fn clamp_single_day(start: DateTime<Utc>, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    if start != end {
        return (start, end);
    }
    (start, Utc.from_utc_datetime(&end_of_day(start.date_naive())))
}

/// Filter reports by the current criteria.
///
/// A report is kept iff its timestamp is present and inside
/// `[start, end]` (inclusive both ends) AND its tags intersect the
/// selected group's member tags. Input order is preserved. Empty input,
/// an unknown group, or a group with no members all yield an empty
/// result, not an error.
pub fn filter_reports(reports: &[Report], criteria: &FilterCriteria, catalog: &TagCatalog) -> Vec<Report> {
    let group = match catalog.group(&criteria.tag_group) {
        Some(g) => g,
        None => {
            warn!("unknown tag group '{}', nothing matches", criteria.tag_group);
            return Vec::new();
        }
    };

    reports
        .iter()
        .filter(|report| {
            let in_range = report
                .timestamp
                .map_or(false, |ts| ts >= criteria.start && ts <= criteria.end);
            let has_valid_tag = report.tags.iter().any(|tag| group.tags.iter().any(|t| t == tag));
            in_range && has_valid_tag
        })
        .cloned()
        .collect()
}

/// Filter predictions by their single group label (exact match).
pub fn filter_predictions(predictions: &[Prediction], group: &str) -> Vec<Prediction> {
    predictions.iter().filter(|p| p.group == group).cloned().collect()
}
