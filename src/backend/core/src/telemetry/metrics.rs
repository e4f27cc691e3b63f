//! Metric descriptions.
//!
//! The crate only records through the `metrics` facade; installing an
//! exporter is left to the host.

use metrics::describe_counter;

/// Register descriptions for every metric the crate records.
pub fn describe_metrics() {
    describe_counter!(
        "portcullis_navigation_decisions_total",
        "Route guard decisions by outcome and reason"
    );
    describe_counter!(
        "portcullis_cache_loads_total",
        "Permission cache loads by outcome (loaded, failed, superseded)"
    );
    describe_counter!("portcullis_bootstrap_total", "Session bootstraps by outcome");
    describe_counter!("portcullis_errors_total", "Errors by code and category");
}
