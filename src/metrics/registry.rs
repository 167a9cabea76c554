//! Metrics registry for coordinating phase-specific metrics
//!
//! Registers the metrics of every phase, checks naming consistency, and
//! reports conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

/// Register all metrics from all phases
pub fn register_all_metrics() {
    let all_metrics = collect_all_metrics();
    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );

    if std::env::var("TRENDS_METRICS_DEBUG").is_ok() {
        log_metrics_summary(&all_metrics);
    }
}

fn collect_all_metrics() -> HashMap<String, (&'static str, MetricDoc)> {
    let mut all_metrics = HashMap::new();
    register_phase_metrics::<super::ingest::IngestMetrics>(&mut all_metrics);
    register_phase_metrics::<super::transform::TransformMetrics>(&mut all_metrics);
    all_metrics
}

/// Register metrics for a specific phase and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(
    all_metrics: &mut HashMap<String, (&'static str, MetricDoc)>,
) {
    T::register_metrics();
    let phase_docs = T::metrics_documentation();
    let phase_name = T::phase_name();

    info!(
        "Registering {} metrics for phase '{}'",
        phase_docs.len(),
        phase_name
    );

    for doc in phase_docs {
        if extract_phase_from_metric_name(doc.name) != phase_name {
            warn!(
                "Metric '{}' does not carry the prefix of its phase '{}'",
                doc.name, phase_name
            );
        }
        if let Some((owner, _)) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' is defined in both '{}' and '{}'",
                doc.name, owner, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), (phase_name, doc));
        }
    }
}

/// Log a summary of all registered metrics for debugging
fn log_metrics_summary(all_metrics: &HashMap<String, (&'static str, MetricDoc)>) {
    info!("=== Metrics Registry Summary ===");

    let mut by_phase: HashMap<&str, Vec<&MetricDoc>> = HashMap::new();
    for (phase, doc) in all_metrics.values() {
        by_phase.entry(*phase).or_default().push(doc);
    }

    for (phase, metrics) in by_phase {
        info!("Phase '{}': {} metrics", phase, metrics.len());
        for metric in metrics {
            info!(
                "  - {} ({:?}) [{}]: {}",
                metric.name,
                metric.metric_type,
                metric.labels.join(","),
                metric.help
            );
        }
    }

    info!("=== End Metrics Summary ===");
}

/// Extract phase name from metric name (e.g., "trends_ingest_rows_read_total" -> "ingest")
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    if let Some(stripped) = metric_name.strip_prefix("trends_") {
        if let Some(next_underscore) = stripped.find('_') {
            return &stripped[..next_underscore];
        }
    }
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_phase_from_metric_name() {
        assert_eq!(
            extract_phase_from_metric_name("trends_ingest_rows_read_total"),
            "ingest"
        );
        assert_eq!(
            extract_phase_from_metric_name("trends_transform_duration_seconds"),
            "transform"
        );
        assert_eq!(
            extract_phase_from_metric_name("invalid_metric_name"),
            "unknown"
        );
    }

    #[test]
    fn test_no_conflicts_across_phases() {
        let all = collect_all_metrics();
        let expected = super::super::ingest::IngestMetrics::metrics_documentation().len()
            + super::super::transform::TransformMetrics::metrics_documentation().len();
        assert_eq!(all.len(), expected);
    }
}
