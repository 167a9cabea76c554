//! Transform Phase Metrics
//!
//! Mirrors the per-run `RunMetrics` summary: records received, dropped by reason,
//! repaired, and the row counts after dedup and explosion.

use crate::error::{DropReason, Stage};
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::RunMetrics;

const DROP_REASONS: [DropReason; 4] = [
    DropReason::MissingKey,
    DropReason::ScoreOutOfRange,
    DropReason::MalformedGenres,
    DropReason::MalformedRow,
];

/// Metrics collection for the Transform phase
pub struct TransformMetrics;

impl TransformMetrics {
    /// Record a completed (published) run
    pub fn record_run(run: &RunMetrics) {
        ::metrics::counter!(phase_metric!(counter, "transform", "runs")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "transform", "records_received"))
            .increment(run.records_received);
        for reason in DROP_REASONS {
            let count = run.dropped_for(reason);
            if count > 0 {
                ::metrics::counter!(
                    phase_metric!(counter, "transform", "records_dropped"),
                    "reason" => reason.code()
                )
                .increment(count);
            }
        }
        ::metrics::counter!(phase_metric!(counter, "transform", "records_score_zeroed"))
            .increment(run.records_score_zeroed);
        ::metrics::counter!(phase_metric!(counter, "transform", "records_genre_defaulted"))
            .increment(run.records_genre_defaulted);
        ::metrics::counter!(phase_metric!(counter, "transform", "records_after_dedup"))
            .increment(run.records_after_dedup);
        ::metrics::counter!(phase_metric!(counter, "transform", "records_after_explode"))
            .increment(run.records_after_explode);
        ::metrics::counter!(phase_metric!(counter, "transform", "genre_cache_errors"))
            .increment(run.genre_cache_errors);
        ::metrics::histogram!(phase_metric!(histogram, "transform", "duration_seconds"))
            .record(run.duration_secs);
    }

    /// Record a run aborted by a batch-level failure
    pub fn record_failure(stage: Stage) {
        let stage = match stage {
            Stage::Ingest => "ingest",
            Stage::Clean => "clean",
            Stage::Dedup => "dedup",
            Stage::Explode => "explode",
            Stage::Map => "map",
            Stage::Publish => "publish",
        };
        ::metrics::counter!(phase_metric!(counter, "transform", "runs_failed"), "stage" => stage)
            .increment(1);
    }
}

impl PhaseMetrics for TransformMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        // Pre-register all metrics (bind to placeholders to satisfy must_use)
        let _ = counter!(phase_metric!(counter, "transform", "runs"));
        let _ = counter!(phase_metric!(counter, "transform", "runs_failed"));
        let _ = counter!(phase_metric!(counter, "transform", "records_received"));
        let _ = counter!(phase_metric!(counter, "transform", "records_dropped"));
        let _ = counter!(phase_metric!(counter, "transform", "records_score_zeroed"));
        let _ = counter!(phase_metric!(counter, "transform", "records_genre_defaulted"));
        let _ = counter!(phase_metric!(counter, "transform", "records_after_dedup"));
        let _ = counter!(phase_metric!(counter, "transform", "records_after_explode"));
        let _ = counter!(phase_metric!(counter, "transform", "genre_cache_errors"));
        let _ = histogram!(phase_metric!(histogram, "transform", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "transform"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "transform", "runs"),
                metric_type: MetricType::Counter,
                help: "Total number of published transform runs",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "runs_failed"),
                metric_type: MetricType::Counter,
                help: "Runs aborted by a batch-level failure",
                labels: vec!["stage"],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "records_received"),
                metric_type: MetricType::Counter,
                help: "Records received from extracts",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "records_dropped"),
                metric_type: MetricType::Counter,
                help: "Records dropped, by reason code",
                labels: vec!["reason"],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "records_score_zeroed"),
                metric_type: MetricType::Counter,
                help: "Records whose missing trend score was replaced with 0",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "records_genre_defaulted"),
                metric_type: MetricType::Counter,
                help: "Records whose genre list fell back to unknown",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "records_after_dedup"),
                metric_type: MetricType::Counter,
                help: "Records remaining after deduplication",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "records_after_explode"),
                metric_type: MetricType::Counter,
                help: "Artist-genre rows produced by explosion",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "genre_cache_errors"),
                metric_type: MetricType::Counter,
                help: "Genre cache failures treated as misses",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "transform", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall-clock duration of a run in seconds",
                labels: vec![],
            },
        ]
    }
}
