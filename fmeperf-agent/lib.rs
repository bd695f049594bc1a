// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod common;
pub mod config;
pub mod counters;
pub mod error;
pub mod orchestrator;
pub mod pmu;
pub mod prom;

pub use config::{AgentConfig, DeviceSource};
pub use error::{FmeError, Result};
pub use orchestrator::{CollectorConfig, MetricCollector};
pub use pmu::{FmePmu, PerfVariant, PublishedAttributes};
pub use prom::FmeMetricExporter;
