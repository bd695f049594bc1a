use parking_lot::Mutex;
use prometheus::{IntCounter, Registry};
use std::sync::Arc;

use crate::counters::{EventRequest, Session, Target};
use crate::error::{FmeError, Result};
use crate::pmu::FmePmu;

const METRIC_NAME: &str = "fme_events_total";

struct TrackedSession {
    session: Session,
    counter: IntCounter,
}

/// Exports one counter per running session, advanced by each delta
pub struct FmeMetricExporter {
    pmu: Arc<FmePmu>,
    registry: Arc<Registry>,
    sessions: Mutex<Vec<TrackedSession>>,
}

fn target_label(target: Target) -> String {
    match target {
        Target::Device => "device".to_string(),
        Target::Port(port) => format!("port{port}"),
    }
}

impl FmeMetricExporter {
    /// Start a session per request; requests that cannot start are skipped
    pub fn new(pmu: Arc<FmePmu>, requests: &[EventRequest]) -> Result<Self> {
        let exporter = Self {
            pmu,
            registry: Arc::new(Registry::new()),
            sessions: Mutex::new(Vec::new()),
        };

        for request in requests {
            if let Err(e) = exporter.track(request) {
                tracing::warn!(
                    "{}: skipping event 0x{:x}: {}",
                    exporter.pmu.name(),
                    request.to_config(),
                    e
                );
            }
        }

        let started = exporter.sessions.lock().len();
        if started == 0 {
            return Err(FmeError::ConfigError(format!(
                "{}: none of the {} requested events could be started",
                exporter.pmu.name(),
                requests.len()
            )));
        }

        tracing::info!(
            "{}: exporting {} of {} events",
            exporter.pmu.name(),
            started,
            requests.len()
        );
        Ok(exporter)
    }

    fn track(&self, request: &EventRequest) -> Result<()> {
        let session = self.pmu.start(request)?;
        let desc = session.descriptor();

        let opts = prometheus::Opts::new(METRIC_NAME, "FME performance counter events")
            .const_label("pmu", self.pmu.name())
            .const_label("event", desc.name)
            .const_label("target", target_label(session.target()));
        let counter = IntCounter::with_opts(opts)?;
        self.registry.register(Box::new(counter.clone()))?;

        self.sessions.lock().push(TrackedSession { session, counter });
        Ok(())
    }

    /// Collect metrics once (called by orchestrator)
    pub async fn collect(&self) {
        let mut sessions = self.sessions.lock();
        for tracked in sessions.iter_mut() {
            let delta = self.pmu.update(&mut tracked.session);
            tracked.counter.inc_by(delta);
        }
    }

    /// Final read of every session, then release them all
    pub fn shutdown(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock());
        for tracked in sessions {
            let before = tracked.session.accumulated();
            let name = tracked.session.descriptor().name;
            let total = self.pmu.stop(tracked.session);
            tracked.counter.inc_by(total.wrapping_sub(before));
            tracing::info!("{}: {} counted {}", self.pmu.name(), name, total);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn pmu(&self) -> &Arc<FmePmu> {
        &self.pmu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::SimulatedFme;
    use crate::counters::{find_by_name, EventType, FabricMode};

    fn sample(exporter: &FmeMetricExporter, event: &str) -> u64 {
        exporter
            .registry()
            .gather()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "event" && l.get_value() == event)
            })
            .map(|m| m.get_counter().get_value() as u64)
            .unwrap()
    }

    #[tokio::test]
    async fn test_collect_advances_counters() {
        let sim = Arc::new(SimulatedFme::new());
        sim.set_count(EventType::Cache, 0x0, 1_000);
        sim.set_count(EventType::Fabric, 0x6, 5);
        let pmu = Arc::new(FmePmu::attach(0, sim.clone(), 1).unwrap());

        let requests = [
            find_by_name("cache_read_hit").unwrap().request(Target::Device),
            find_by_name("fab_mmio_read").unwrap().request(Target::Device),
        ];
        let exporter = FmeMetricExporter::new(pmu, &requests).unwrap();

        sim.set_count(EventType::Cache, 0x0, 1_200);
        sim.set_count(EventType::Fabric, 0x6, 8);
        exporter.collect().await;

        assert_eq!(sample(&exporter, "cache_read_hit"), 200);
        assert_eq!(sample(&exporter, "fab_mmio_read"), 3);
    }

    #[test]
    fn test_conflicting_request_skipped() {
        let pmu = Arc::new(FmePmu::attach(0, Arc::new(SimulatedFme::new()), 1).unwrap());
        let requests = [
            find_by_name("fab_upi_read").unwrap().request(Target::Device),
            find_by_name("fab_port_upi_read").unwrap().request(Target::Port(0)),
        ];

        let exporter = FmeMetricExporter::new(Arc::clone(&pmu), &requests).unwrap();
        assert_eq!(exporter.session_count(), 1);
        assert_eq!(pmu.fabric_state().mode(), FabricMode::Bound(Target::Device));

        exporter.shutdown();
        assert_eq!(exporter.session_count(), 0);
        assert_eq!(pmu.fabric_state().mode(), FabricMode::Idle);
    }

    #[test]
    fn test_nothing_to_export() {
        let pmu = Arc::new(FmePmu::attach(0, Arc::new(SimulatedFme::new()), 1).unwrap());
        let bogus = EventRequest::from_config(0x0000_f000);
        assert!(matches!(
            FmeMetricExporter::new(pmu, &[bogus]),
            Err(FmeError::ConfigError(_))
        ));
    }
}
