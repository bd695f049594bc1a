// Periodic collection loop over every exported FME
// Updates all sessions once per tick until cancelled, then stops them

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::prom::FmeMetricExporter;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

pub struct MetricCollector {
    config: CollectorConfig,
    exporters: Vec<Arc<FmeMetricExporter>>,
}

impl MetricCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            exporters: Vec::new(),
        }
    }

    pub fn add_exporter(&mut self, exporter: Arc<FmeMetricExporter>) {
        self.exporters.push(exporter);
    }

    /// Exporters for the metrics handler
    pub fn exporters(&self) -> Vec<Arc<FmeMetricExporter>> {
        self.exporters.clone()
    }

    /// Start the collection loop
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tracing::info!(
            "Starting FME collection every {:?} for {} device(s)",
            self.config.interval,
            self.exporters.len()
        );

        tokio::spawn(async move {
            self.collection_loop(cancel_token).await;
        })
    }

    async fn collection_loop(self, cancel_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    for exporter in &self.exporters {
                        exporter.collect().await;
                    }
                }
            }
        }

        tracing::info!("Collection loop cancelled, stopping sessions");
        for exporter in &self.exporters {
            exporter.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::SimulatedFme;
    use crate::counters::{find_by_name, FabricMode, Target};
    use crate::pmu::FmePmu;

    #[tokio::test]
    async fn test_cancel_stops_sessions() {
        let sim = Arc::new(SimulatedFme::new().free_running(1));
        let pmu = Arc::new(FmePmu::attach(0, sim, 1).unwrap());
        let requests = [find_by_name("fab_port_pcie1_write")
            .unwrap()
            .request(Target::Port(0))];
        let exporter = Arc::new(FmeMetricExporter::new(Arc::clone(&pmu), &requests).unwrap());

        let mut collector = MetricCollector::new(CollectorConfig {
            interval: Duration::from_millis(5),
        });
        collector.add_exporter(Arc::clone(&exporter));

        let token = CancellationToken::new();
        let handle = collector.start(token.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(exporter.session_count(), 0);
        assert_eq!(pmu.fabric_state().mode(), FabricMode::Idle);
    }
}
