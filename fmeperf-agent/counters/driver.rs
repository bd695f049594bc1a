// Counter driver interface and the select/poll/read protocol shared by the
// banked counters

use std::sync::Arc;

use fmeperf_raw::fme::{CNTR_EVENT, POLL_DELAY, POLL_TIMEOUT};
use fmeperf_raw::{read_poll_timeout, RegisterWindow};
use parking_lot::Mutex;

use crate::counters::basic::BasicDriver;
use crate::counters::cache::CacheDriver;
use crate::counters::events::{EventDescriptor, EventType, Target};
use crate::counters::fabric::FabricDriver;
use crate::counters::vtd::VtdDriver;
use crate::error::Result;

/// Outcome of one counter read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Absolute counter value
    Count(u64),
    /// The bank never reported the selected event within the poll timeout
    Unavailable,
}

impl Reading {
    /// Absolute value, with an unavailable counter reading as zero
    pub fn value(&self) -> u64 {
        match self {
            Reading::Count(count) => *count,
            Reading::Unavailable => 0,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            Reading::Count(count) => Some(*count),
            Reading::Unavailable => None,
        }
    }
}

/// Per event type hardware operations
///
/// `acquire` and `release` bracket a measurement; only banks with shared
/// state (the fabric counters) need them. `read` returns the absolute
/// counter value and never fails hard.
pub trait CounterDriver: Send + Sync {
    fn event_type(&self) -> EventType;

    fn acquire(&self, _desc: &EventDescriptor, _target: Target) -> Result<()> {
        Ok(())
    }

    fn release(&self, _desc: &EventDescriptor, _target: Target) {}

    fn read(&self, desc: &EventDescriptor, target: Target) -> Reading;
}

/// One control/counter register pair and the lock serializing its use
///
/// A second select landing between another caller's select and poll would
/// make that caller read the wrong event, so the whole sequence runs under
/// `lock`.
pub struct CounterBank {
    name: &'static str,
    window: Arc<dyn RegisterWindow>,
    ctrl: u64,
    cntr: u64,
    lock: Mutex<()>,
}

impl CounterBank {
    pub fn new(name: &'static str, window: Arc<dyn RegisterWindow>, ctrl: u64, cntr: u64) -> Self {
        Self {
            name,
            window,
            ctrl,
            cntr,
            lock: Mutex::new(()),
        }
    }

    pub fn window(&self) -> &dyn RegisterWindow {
        &*self.window
    }

    /// Read-modify-write the control register under the bank lock
    pub fn program(&self, f: impl FnOnce(u64) -> u64) {
        let _guard = self.lock.lock();
        self.write_ctrl(f);
    }

    fn write_ctrl(&self, f: impl FnOnce(u64) -> u64) {
        let old = self.window.read64(self.ctrl);
        let new = f(old);
        tracing::debug!(
            "{} ctrl 0x{:02x}: 0x{:016x} -> 0x{:016x}",
            self.name,
            self.ctrl,
            old,
            new
        );
        self.window.write64(self.ctrl, new);
    }

    /// Select `event` and read the bank once the counter reports it
    ///
    /// `select` rewrites the control register value, `extract` reads the
    /// count out of the bank after the counter register's tag matched.
    pub fn read_selected(
        &self,
        event: u64,
        select: impl FnOnce(u64) -> u64,
        extract: impl FnOnce(&dyn RegisterWindow) -> u64,
    ) -> Reading {
        let _guard = self.lock.lock();
        self.write_ctrl(select);

        match read_poll_timeout(
            &*self.window,
            self.cntr,
            |v| CNTR_EVENT.get(v) == event,
            POLL_DELAY,
            POLL_TIMEOUT,
        ) {
            Ok(_) => Reading::Count(extract(&*self.window)),
            Err(last) => {
                tracing::error!(
                    "timeout, unmatched {} event code in counter register (want 0x{:x}, got 0x{:x})",
                    self.name,
                    event,
                    CNTR_EVENT.get(last)
                );
                Reading::Unavailable
            }
        }
    }
}

/// One driver per event type, indexed by `EventType`
pub struct DriverTable {
    basic: Arc<BasicDriver>,
    cache: Arc<CacheDriver>,
    fabric: Arc<FabricDriver>,
    vtd: Arc<VtdDriver>,
    vtd_sip: Arc<VtdDriver>,
}

impl DriverTable {
    pub fn new(window: Arc<dyn RegisterWindow>) -> Self {
        Self {
            basic: Arc::new(BasicDriver::new(Arc::clone(&window))),
            cache: Arc::new(CacheDriver::new(Arc::clone(&window))),
            fabric: Arc::new(FabricDriver::new(Arc::clone(&window))),
            vtd: Arc::new(VtdDriver::translation(Arc::clone(&window))),
            vtd_sip: Arc::new(VtdDriver::sip(window)),
        }
    }

    pub fn get(&self, event_type: EventType) -> Arc<dyn CounterDriver> {
        match event_type {
            EventType::Basic => self.basic.clone(),
            EventType::Cache => self.cache.clone(),
            EventType::Fabric => self.fabric.clone(),
            EventType::Translation => self.vtd.clone(),
            EventType::TranslationSip => self.vtd_sip.clone(),
        }
    }

    pub fn fabric(&self) -> &FabricDriver {
        &self.fabric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::SimulatedFme;
    use crate::counters::events::{CACHE_EVENTS, FABRIC_EVENTS};
    use crate::error::FmeError;
    use fmeperf_raw::fme::fabric::{FAB_CNTR, FAB_CTRL};
    use fmeperf_raw::fme::CTRL_EVENT;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_reading_values() {
        assert_eq!(Reading::Count(7).value(), 7);
        assert_eq!(Reading::Unavailable.value(), 0);
        assert_eq!(Reading::Unavailable.count(), None);
    }

    #[test]
    fn test_bank_reads_after_select() {
        let sim = Arc::new(SimulatedFme::new());
        sim.set_count(EventType::Fabric, 0x4, 1234);
        let bank = CounterBank::new("fab", sim.clone(), FAB_CTRL, FAB_CNTR);

        let reading = bank.read_selected(
            0x4,
            |v| CTRL_EVENT.replace(v, 0x4),
            |w| w.read64(FAB_CNTR) & 0xFFFF,
        );
        assert_eq!(reading, Reading::Count(1234));
        assert_eq!(CTRL_EVENT.get(sim.register(FAB_CTRL)), 0x4);
    }

    #[test]
    fn test_bank_times_out_softly() {
        let sim = Arc::new(SimulatedFme::new());
        sim.set_stalled(EventType::Fabric, true);
        let bank = CounterBank::new("fab", sim.clone(), FAB_CTRL, FAB_CNTR);

        let reading = bank.read_selected(0x1, |v| CTRL_EVENT.replace(v, 0x1), |_| 99);
        assert_eq!(reading, Reading::Unavailable);
    }

    #[test]
    fn test_shared_banks_under_contention() {
        let sim = Arc::new(SimulatedFme::new());
        for code in 0..4u64 {
            sim.set_count(EventType::Cache, code, 1000 * (code + 1));
            sim.set_count(EventType::Fabric, code, 7 * (code + 1));
        }
        let table = Arc::new(DriverTable::new(sim));
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();

        // readers cycling through different events of one cache bank
        for code in 0..4u16 {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                let desc = CACHE_EVENTS
                    .iter()
                    .find(|desc| desc.event_code == code)
                    .unwrap();
                let driver = table.get(EventType::Cache);
                barrier.wait();
                for _ in 0..500 {
                    assert_eq!(
                        driver.read(desc, Target::Device),
                        Reading::Count(1000 * (code as u64 + 1))
                    );
                }
            }));
        }

        // fabric users flipping the scope: arbiter lock, then bank lock
        for code in 0..4u16 {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                let target = if code % 2 == 0 {
                    Target::Device
                } else {
                    Target::Port(0)
                };
                let desc = FABRIC_EVENTS
                    .iter()
                    .find(|desc| desc.event_code == code && desc.scoped == target.is_port())
                    .unwrap();
                let driver = table.get(EventType::Fabric);
                barrier.wait();
                for _ in 0..500 {
                    match driver.acquire(desc, target) {
                        Ok(()) => {
                            assert_eq!(
                                driver.read(desc, target),
                                Reading::Count(7 * (code as u64 + 1))
                            );
                            driver.release(desc, target);
                        }
                        Err(FmeError::ScopeConflict { .. }) => {}
                        Err(e) => panic!("unexpected acquire failure: {e}"),
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.fabric().state().users, 0);
    }

    #[test]
    fn test_table_dispatch() {
        let table = DriverTable::new(Arc::new(SimulatedFme::new()));
        for ty in EventType::all() {
            assert_eq!(table.get(ty).event_type(), ty);
        }
    }
}
