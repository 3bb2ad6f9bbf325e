//! Drive the report map controller against a live store deployment.
//!
//! Run with: cargo run --example nearby_heatmap -- <base-url> [api-key]

use report_heatmap::{
    FetchStrategy, FixedLocationProvider, GeoPoint, ReportMapController, ReportStore, ViewState,
};

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let base_url = match args.next() {
        Some(url) => url,
        None => {
            eprintln!("usage: nearby_heatmap <base-url> [api-key]");
            std::process::exit(1);
        }
    };
    let api_key = args.next().unwrap_or_default();

    let store = match ReportStore::new(&base_url, &api_key, FetchStrategy::BoundingBox) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to create store client: {err}");
            std::process::exit(1);
        }
    };

    // No location service on the desktop: pin the view to Pisa.
    let location = FixedLocationProvider(GeoPoint::new(43.724591, 10.382981));

    let mut controller = ReportMapController::new(Box::new(location), Box::new(store));
    controller.load().await;

    match controller.state() {
        ViewState::Loaded => {
            println!(
                "Loaded {} candidate report(s); map centered at ({:.6}, {:.6})",
                controller.candidate_count(),
                controller.map_center().latitude,
                controller.map_center().longitude,
            );
            println!(
                "Group '{}': {} heatmap feature(s)",
                controller.criteria().tag_group,
                controller.heatmap().features().len()
            );

            // Criteria changes re-filter the fetched set without a refetch.
            for group in ["infrastructure", "safety", "aesthetic", "wildlife"] {
                controller.set_tag_group(group);
                println!(
                    "Group '{}': {} heatmap feature(s)",
                    group,
                    controller.heatmap().features().len()
                );
            }
        }
        state => {
            println!("load finished in state {state:?}; nothing to show");
        }
    }
}
