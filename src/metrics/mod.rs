//! Metrics infrastructure for the trends pipeline
//!
//! Each pipeline phase defines its own metrics in a dedicated submodule, so names
//! stay unique and every counter has one owner. The per-run `RunMetrics` summary
//! written next to each published partition is the authoritative record; the
//! Prometheus series here mirror it for live monitoring.

pub mod ingest;
pub mod registry;
pub mod transform;

pub use ingest::IngestMetrics;
pub use transform::TransformMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the global metrics recorder.
///
/// Idempotent. With a `listen_addr` the Prometheus HTTP exporter is started on it;
/// otherwise the recorder is installed for in-process rendering only.
pub fn init_metrics(listen_addr: Option<SocketAddr>) {
    INIT.call_once(|| {
        let builder = PrometheusBuilder::new();
        let installed = match listen_addr {
            Some(addr) => match builder.with_http_listener(addr).install() {
                Ok(()) => {
                    info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
                    true
                }
                Err(e) => {
                    warn!("Failed to start Prometheus exporter on {}: {}", addr, e);
                    false
                }
            },
            None => match builder.install_recorder() {
                Ok(handle) => {
                    if HANDLE.set(handle).is_err() {
                        warn!("METRICS: render handle was already set");
                    }
                    info!("Prometheus recorder installed (in-process render only)");
                    true
                }
                Err(e) => {
                    warn!("Failed to install Prometheus recorder: {}", e);
                    false
                }
            },
        };

        if installed {
            registry::register_all_metrics();
        }
    });
}

/// Current metrics in Prometheus text format, when the in-process recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Trait for phase-specific metrics collections
///
/// Each pipeline phase implements this trait to provide:
/// - Metric registration at startup
/// - Consistent naming conventions
/// - Documentation of what each metric measures
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Macro to create phase-specific metric names with consistent naming
///
/// This ensures all metrics follow the naming convention:
/// trends_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("trends_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("trends_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("trends_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
