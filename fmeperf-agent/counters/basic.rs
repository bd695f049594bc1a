// Basic events: the free-running FME clock

use std::sync::Arc;

use fmeperf_raw::fme::clock::{CLK_CNTR, EVENT_CLK};
use fmeperf_raw::RegisterWindow;

use crate::counters::driver::{CounterDriver, Reading};
use crate::counters::events::{EventDescriptor, EventType, Target};

pub struct BasicDriver {
    window: Arc<dyn RegisterWindow>,
}

impl BasicDriver {
    pub fn new(window: Arc<dyn RegisterWindow>) -> Self {
        Self { window }
    }
}

impl CounterDriver for BasicDriver {
    fn event_type(&self) -> EventType {
        EventType::Basic
    }

    fn read(&self, desc: &EventDescriptor, _target: Target) -> Reading {
        // No select step: the clock counter is always live
        if desc.event_code == EVENT_CLK {
            Reading::Count(self.window.read64(CLK_CNTR))
        } else {
            Reading::Count(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::SimulatedFme;
    use crate::counters::events::BASIC_EVENTS;

    #[test]
    fn test_clock_read() {
        let sim = Arc::new(SimulatedFme::new());
        sim.set_count(EventType::Basic, EVENT_CLK as u64, 0xFFFF_FFFF_FFFF);
        let driver = BasicDriver::new(sim);
        assert_eq!(
            driver.read(&BASIC_EVENTS[0], Target::Device),
            Reading::Count(0xFFFF_FFFF_FFFF)
        );
    }

    #[test]
    fn test_acquire_is_noop() {
        let driver = BasicDriver::new(Arc::new(SimulatedFme::new()));
        assert!(driver.acquire(&BASIC_EVENTS[0], Target::Device).is_ok());
        driver.release(&BASIC_EVENTS[0], Target::Device);
    }
}
