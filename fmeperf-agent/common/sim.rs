// In-memory FME register file
//
// Behaves like the perf feature's MMIO block closely enough to drive every
// counter bank: a control write selects an event, and the bank's counter
// register then reports that event's tag and count. Used by the tests and
// by `fmeperf --simulate`.

use std::collections::HashMap;

use fmeperf_raw::fme::cache::{CacheCounter, CACHE_CNTR0, CACHE_CNTR1, CACHE_CTRL};
use fmeperf_raw::fme::clock::{CLK_CNTR, EVENT_CLK};
use fmeperf_raw::fme::fabric::{FabricCounter, FAB_CNTR, FAB_CTRL};
use fmeperf_raw::fme::vtd::{VtdCounter, VTD_CNTR, VTD_CTRL, VTD_SIP_CNTR, VTD_SIP_CTRL};
use fmeperf_raw::fme::{CNTR_EVENT, CTRL_EVENT, DFH, DFH_ID, FEATURE_ID_GLOBAL_IPERF};
use fmeperf_raw::RegisterWindow;
use parking_lot::Mutex;

use crate::counters::events::EventType;

#[derive(Default)]
struct SimState {
    regs: HashMap<u64, u64>,
    counts: HashMap<(EventType, u64), u64>,
    stalled: HashMap<EventType, bool>,
    writes: HashMap<u64, usize>,
    /// Per-select increment applied in free-running mode
    step: Option<u64>,
}

impl SimState {
    fn reg(&self, offset: u64) -> u64 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn count(&self, event_type: EventType, code: u64) -> u64 {
        self.counts.get(&(event_type, code)).copied().unwrap_or(0)
    }

    /// Counter register value for an `event_type` bank given its control
    /// register
    fn counter(&self, event_type: EventType, ctrl: u64, count: impl FnOnce(u64) -> u64) -> u64 {
        let selected = CTRL_EVENT.get(ctrl);
        if self.stalled.get(&event_type).copied().unwrap_or(false) {
            // stuck on some other event
            return CNTR_EVENT.prep((selected + 1) & CNTR_EVENT.max());
        }
        CNTR_EVENT.prep(selected) | count(self.count(event_type, selected))
    }
}

pub struct SimulatedFme {
    state: Mutex<SimState>,
}

impl SimulatedFme {
    /// A full ("iperf") feature with every register zeroed
    pub fn new() -> Self {
        Self::with_feature_id(FEATURE_ID_GLOBAL_IPERF)
    }

    pub fn with_feature_id(feature_id: u16) -> Self {
        let mut state = SimState::default();
        state.regs.insert(DFH, DFH_ID.prep(feature_id as u64));
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make every selected counter advance on each select, so a collector
    /// sees traffic
    pub fn free_running(self, step: u64) -> Self {
        self.state.lock().step = Some(step);
        self
    }

    /// Set the absolute count the hardware reports for `code`
    ///
    /// For the translation bank `code` is the hardware code, i.e. with the
    /// port already added.
    pub fn set_count(&self, event_type: EventType, code: u64, value: u64) {
        self.state.lock().counts.insert((event_type, code), value);
    }

    /// A stalled bank never reports the selected event
    pub fn set_stalled(&self, event_type: EventType, stalled: bool) {
        self.state.lock().stalled.insert(event_type, stalled);
    }

    pub fn register(&self, offset: u64) -> u64 {
        self.state.lock().reg(offset)
    }

    pub fn set_register(&self, offset: u64, value: u64) {
        self.state.lock().regs.insert(offset, value);
    }

    /// Number of writes the register at `offset` has seen
    pub fn write_count(&self, offset: u64) -> usize {
        self.state.lock().writes.get(&offset).copied().unwrap_or(0)
    }
}

impl Default for SimulatedFme {
    fn default() -> Self {
        Self::new()
    }
}

fn bank_of_ctrl(offset: u64) -> Option<EventType> {
    match offset {
        CACHE_CTRL => Some(EventType::Cache),
        FAB_CTRL => Some(EventType::Fabric),
        VTD_CTRL => Some(EventType::Translation),
        VTD_SIP_CTRL => Some(EventType::TranslationSip),
        _ => None,
    }
}

impl RegisterWindow for SimulatedFme {
    fn read64(&self, offset: u64) -> u64 {
        let mut state = self.state.lock();
        match offset {
            CLK_CNTR => {
                if let Some(step) = state.step {
                    let clock = state.count(EventType::Basic, EVENT_CLK as u64);
                    state
                        .counts
                        .insert((EventType::Basic, EVENT_CLK as u64), clock.wrapping_add(step));
                }
                state.count(EventType::Basic, EVENT_CLK as u64)
            }
            // the two cache counters split the total between them
            CACHE_CNTR0 => state.counter(EventType::Cache, state.reg(CACHE_CTRL), |c| {
                CacheCounter::COUNT.get(c - c / 2)
            }),
            CACHE_CNTR1 => state.counter(EventType::Cache, state.reg(CACHE_CTRL), |c| {
                CacheCounter::COUNT.get(c / 2)
            }),
            FAB_CNTR => state.counter(EventType::Fabric, state.reg(FAB_CTRL), |c| {
                FabricCounter::COUNT.get(c)
            }),
            VTD_CNTR => state.counter(EventType::Translation, state.reg(VTD_CTRL), |c| {
                VtdCounter::COUNT.get(c)
            }),
            VTD_SIP_CNTR => {
                state.counter(EventType::TranslationSip, state.reg(VTD_SIP_CTRL), |c| {
                    VtdCounter::COUNT.get(c)
                })
            }
            _ => state.reg(offset),
        }
    }

    fn write64(&self, offset: u64, value: u64) {
        let mut state = self.state.lock();
        state.regs.insert(offset, value);
        *state.writes.entry(offset).or_insert(0) += 1;

        if let (Some(step), Some(event_type)) = (state.step, bank_of_ctrl(offset)) {
            let key = (event_type, CTRL_EVENT.get(value));
            let count = state.counts.entry(key).or_insert(0);
            *count = count.wrapping_add(step * (key.1 + 1));
        }
    }
}
