//! Offline walk-through of the filter + projection pipeline.
//!
//! Run with: cargo run --example filter_pipeline

use chrono::{TimeZone, Utc};
use report_heatmap::{
    filter_reports, FilterCriteria, GeoPoint, HeatmapConfig, HeatmapLayer, Report, TagCatalog,
};

fn main() {
    // Sample reports around Pisa, submitted over a few days in January.
    let reports = vec![
        Report::new(
            GeoPoint::new(43.7102, 10.4087),
            vec!["Litter".to_string()],
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()),
        ),
        Report::new(
            GeoPoint::new(43.7150, 10.4010),
            vec!["Vandalism".to_string(), "Litter".to_string()],
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 13, 30, 0).unwrap()),
        ),
        Report::new(
            GeoPoint::new(43.7201, 10.3950),
            vec!["Pothole".to_string()],
            Some(Utc.with_ymd_and_hms(2024, 1, 6, 9, 15, 0).unwrap()),
        ),
        Report::new(
            GeoPoint::new(43.7188, 10.4102),
            vec!["Graffiti".to_string()],
            // Never stored with a timestamp: the filter always drops it.
            None,
        ),
    ];

    let catalog = TagCatalog::default();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();

    println!("Nearby-Report Filter Pipeline\n");
    println!("{} candidate reports, range {} to {}\n", reports.len(), start, end);

    let mut layer = HeatmapLayer::new(HeatmapConfig::default());

    for group in catalog.groups() {
        let criteria = FilterCriteria::new(group.name.clone(), start, end);
        let filtered = filter_reports(&reports, &criteria, &catalog);
        layer.project(filtered.iter().map(|r| r.location));

        println!("Group '{}': {} report(s) -> {} feature(s)", group.name, filtered.len(), layer.features().len());
        for feature in layer.features() {
            println!(
                "   feature at ({:.1}, {:.1}) weight {}",
                feature.point.x, feature.point.y, feature.weight
            );
        }
    }

    // The layer always reflects exactly the latest projection.
    layer.project([]);
    println!("\nAfter projecting an empty set: {} features", layer.features().len());
}
