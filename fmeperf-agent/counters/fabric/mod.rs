// Fabric events: PCIe/UPI/MMIO traffic, either device-wide or filtered to
// one port. The filter is shared by the whole bank, so acquisition goes
// through the arbiter.

pub mod arbiter;

use std::sync::Arc;

use fmeperf_raw::fme::fabric::{FabricControl, FabricCounter, FAB_CNTR, FAB_CTRL};
use fmeperf_raw::{RegisterLayout, RegisterWindow};

use crate::counters::driver::{CounterBank, CounterDriver, Reading};
use crate::counters::events::{EventDescriptor, EventType, Target};
use crate::error::Result;

pub use arbiter::{ArbiterState, FabricArbiter, FabricMode};

pub struct FabricDriver {
    bank: CounterBank,
    arbiter: FabricArbiter,
}

impl FabricDriver {
    /// Attach to the bank, adopting whatever scope the hardware is in
    pub fn new(window: Arc<dyn RegisterWindow>) -> Self {
        let ctrl = FabricControl::from_reg_value(window.read64(FAB_CTRL));
        let scope = match ctrl.watched_port() {
            Some(port) => Target::Port(port),
            None => Target::Device,
        };
        tracing::debug!("fabric counters found in {} mode", scope);

        Self {
            bank: CounterBank::new("fabric", window, FAB_CTRL, FAB_CNTR),
            arbiter: FabricArbiter::new(scope),
        }
    }

    fn program_scope(&self, scope: Target) {
        self.bank.program(|v| {
            let mut ctrl = FabricControl::from_reg_value(v);
            match scope {
                Target::Port(port) => {
                    ctrl.port_filter = true;
                    ctrl.port_id = port;
                }
                Target::Device => {
                    ctrl.port_filter = false;
                    ctrl.port_id = 0;
                }
            }
            ctrl.to_reg_value()
        });
    }

    pub fn state(&self) -> ArbiterState {
        self.arbiter.state()
    }
}

impl CounterDriver for FabricDriver {
    fn event_type(&self) -> EventType {
        EventType::Fabric
    }

    fn acquire(&self, _desc: &EventDescriptor, target: Target) -> Result<()> {
        self.arbiter.acquire(target, |scope| self.program_scope(scope))
    }

    fn release(&self, _desc: &EventDescriptor, _target: Target) {
        self.arbiter.release();
    }

    fn read(&self, desc: &EventDescriptor, _target: Target) -> Reading {
        let event = desc.event_code as u64;

        self.bank.read_selected(
            event,
            |v| {
                let mut ctrl = FabricControl::from_reg_value(v);
                ctrl.event = event as u8;
                ctrl.to_reg_value()
            },
            |w| FabricCounter::from_reg_value(w.read64(FAB_CNTR)).count,
        )
    }
}
