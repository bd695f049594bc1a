// Metric collection orchestrator
pub mod collector;

pub use collector::{CollectorConfig, MetricCollector};
