// Cache events: channel + event select, two parallel counters summed

use std::sync::Arc;

use fmeperf_raw::fme::cache::{CacheControl, CacheCounter, CACHE_CNTR0, CACHE_CNTR1, CACHE_CTRL};
use fmeperf_raw::{RegisterLayout, RegisterWindow};

use crate::counters::driver::{CounterBank, CounterDriver, Reading};
use crate::counters::events::{EventDescriptor, EventType, Target};

pub struct CacheDriver {
    bank: CounterBank,
}

impl CacheDriver {
    pub fn new(window: Arc<dyn RegisterWindow>) -> Self {
        Self {
            bank: CounterBank::new("cache", window, CACHE_CTRL, CACHE_CNTR0),
        }
    }
}

impl CounterDriver for CacheDriver {
    fn event_type(&self) -> EventType {
        EventType::Cache
    }

    fn read(&self, desc: &EventDescriptor, _target: Target) -> Reading {
        let event = desc.event_code as u64;
        let channel = desc.aux_data;

        self.bank.read_selected(
            event,
            |v| {
                let mut ctrl = CacheControl::from_reg_value(v);
                ctrl.channel = channel;
                ctrl.event = event as u8;
                ctrl.to_reg_value()
            },
            |w| {
                let cntr0 = CacheCounter::from_reg_value(w.read64(CACHE_CNTR0));
                let cntr1 = CacheCounter::from_reg_value(w.read64(CACHE_CNTR1));
                cntr0.count + cntr1.count
            },
        )
    }
}
