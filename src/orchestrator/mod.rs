//! Orchestrator module for coordinating the collection pipeline
//! Combines market data, news, sentiment and technicals into signals and reports them

pub mod pipeline;
pub mod report;

pub use pipeline::{CryptoDataPipeline, HealthReport, HealthStatus};
pub use report::{render_signal, write_prediction, CollectionReport, DEFAULT_REPORT_FILE};
