//! Ingest Phase Metrics
//!
//! Rows read from extract files and the row-level problems found while reading them.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::ingestion::IngestReport;

/// Metrics collection for the Ingest phase
pub struct IngestMetrics;

impl IngestMetrics {
    /// Record the counters of one extract read
    pub fn record_extract(report: &IngestReport) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "extracts_read")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_read")).increment(report.rows_read);
        ::metrics::counter!(phase_metric!(counter, "ingest", "malformed_rows"))
            .increment(report.malformed_rows);
        ::metrics::counter!(phase_metric!(counter, "ingest", "bad_dates")).increment(report.bad_dates);
        ::metrics::counter!(phase_metric!(counter, "ingest", "unparseable_scores"))
            .increment(report.unparseable_scores);
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "rows_per_extract"))
            .record(report.rows_read as f64);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        // Pre-register all metrics (bind to placeholders to satisfy must_use)
        let _ = counter!(phase_metric!(counter, "ingest", "extracts_read"));
        let _ = counter!(phase_metric!(counter, "ingest", "rows_read"));
        let _ = counter!(phase_metric!(counter, "ingest", "malformed_rows"));
        let _ = counter!(phase_metric!(counter, "ingest", "bad_dates"));
        let _ = counter!(phase_metric!(counter, "ingest", "unparseable_scores"));
        let _ = histogram!(phase_metric!(histogram, "ingest", "rows_per_extract"));
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "extracts_read"),
                metric_type: MetricType::Counter,
                help: "Total number of extract files read",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_read"),
                metric_type: MetricType::Counter,
                help: "Total number of data rows read from extracts",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "malformed_rows"),
                metric_type: MetricType::Counter,
                help: "Rows that could not be parsed and were dropped",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "bad_dates"),
                metric_type: MetricType::Counter,
                help: "Rows whose date could not be parsed",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "unparseable_scores"),
                metric_type: MetricType::Counter,
                help: "Rows whose trend score was not a finite number",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "rows_per_extract"),
                metric_type: MetricType::Histogram,
                help: "Number of rows read per extract file",
                labels: vec![],
            },
        ]
    }
}
