// Data processing pipeline: ingestion, processing, storage and orchestration

pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod storage;

// Re-export key types from each stage
pub use orchestrator::{RunMetrics, RunSummary, StageReport, TransformOutput, TransformPipeline};
