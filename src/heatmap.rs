//! Heatmap feature projection.
//!
//! The [`HeatmapLayer`] exclusively owns the feature set the map surface
//! renders. Every filter change rebuilds the set from scratch: features
//! are ephemeral, never persisted, and no stale feature survives a
//! replacement.

use serde::{Deserialize, Serialize};

use crate::geo_utils::web_mercator;
use crate::GeoPoint;

/// Styling and weighting knobs for the heatmap layer.
///
/// The weight is a fixed constant applied to every feature; it carries no
/// per-report meaning. Blur and radius are passed through to the map
/// library's heat layer untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapConfig {
    /// Weight assigned to every feature, in `[0, 1]`.
    pub weight: f64,
    /// Heat kernel blur, in rendered pixels.
    pub blur: f64,
    /// Heat kernel radius, in rendered pixels.
    pub radius: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            weight: 0.8,
            blur: 15.0,
            radius: 10.0,
        }
    }
}

impl HeatmapConfig {
    /// The configuration the prediction view renders with.
    pub fn predictions() -> Self {
        Self {
            weight: 0.9,
            blur: 15.0,
            radius: 15.0,
        }
    }
}

/// A single weighted point contributing density to the heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapFeature {
    /// Web-mercator coordinates of the feature.
    pub point: crate::ProjectedPoint,
    /// Density weight in `[0, 1]`.
    pub weight: f64,
}

/// The rendered feature set, owned exclusively by this layer.
///
/// # Example
///
/// ```rust
/// use report_heatmap::{GeoPoint, HeatmapConfig, HeatmapLayer};
///
/// let mut layer = HeatmapLayer::new(HeatmapConfig::default());
/// layer.project([GeoPoint::new(43.71, 10.40), GeoPoint::new(43.72, 10.41)]);
/// assert_eq!(layer.features().len(), 2);
///
/// // A new projection fully replaces the old one.
/// layer.project([]);
/// assert!(layer.features().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct HeatmapLayer {
    config: HeatmapConfig,
    features: Vec<HeatmapFeature>,
}

impl HeatmapLayer {
    pub fn new(config: HeatmapConfig) -> Self {
        Self {
            config,
            features: Vec::new(),
        }
    }

    /// Replace the feature set with one feature per input point.
    ///
    /// The replacement set is built in full before the swap, so a caller
    /// never observes a half-updated layer. Projecting an empty iterator
    /// clears the layer.
    pub fn project<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        let weight = self.config.weight.clamp(0.0, 1.0);
        let next: Vec<HeatmapFeature> = points
            .into_iter()
            .map(|p| HeatmapFeature {
                point: web_mercator(&p),
                weight,
            })
            .collect();
        self.features = next;
    }

    /// Drop every feature.
    pub fn clear(&mut self) {
        self.features.clear();
    }

    /// The currently rendered features.
    pub fn features(&self) -> &[HeatmapFeature] {
        &self.features
    }

    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
