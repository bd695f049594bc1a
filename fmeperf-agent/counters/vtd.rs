// VT-d events: per-port device TLB bank and the device-wide SIP bank

use std::sync::Arc;

use fmeperf_raw::fme::vtd::{
    port_event, VtdControl, VtdCounter, VTD_CNTR, VTD_CTRL, VTD_SIP_CNTR, VTD_SIP_CTRL,
};
use fmeperf_raw::{RegisterLayout, RegisterWindow};

use crate::counters::driver::{CounterBank, CounterDriver, Reading};
use crate::counters::events::{EventDescriptor, EventType, Target};

pub struct VtdDriver {
    bank: CounterBank,
    event_type: EventType,
    cntr: u64,
}

impl VtdDriver {
    /// Per-port translation bank; the port offsets the event code
    pub fn translation(window: Arc<dyn RegisterWindow>) -> Self {
        Self {
            bank: CounterBank::new("vtd", window, VTD_CTRL, VTD_CNTR),
            event_type: EventType::Translation,
            cntr: VTD_CNTR,
        }
    }

    /// Device-wide SIP bank
    pub fn sip(window: Arc<dyn RegisterWindow>) -> Self {
        Self {
            bank: CounterBank::new("vtd sip", window, VTD_SIP_CTRL, VTD_SIP_CNTR),
            event_type: EventType::TranslationSip,
            cntr: VTD_SIP_CNTR,
        }
    }

    fn hardware_event(&self, desc: &EventDescriptor, target: Target) -> u64 {
        match (self.event_type, target) {
            (EventType::Translation, Target::Port(port)) => port_event(desc.event_code, port),
            _ => desc.event_code as u64,
        }
    }
}

impl CounterDriver for VtdDriver {
    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn read(&self, desc: &EventDescriptor, target: Target) -> Reading {
        let event = self.hardware_event(desc, target);
        let cntr = self.cntr;

        self.bank.read_selected(
            event,
            |v| {
                let mut ctrl = VtdControl::from_reg_value(v);
                ctrl.event = event as u8;
                ctrl.to_reg_value()
            },
            |w| VtdCounter::from_reg_value(w.read64(cntr)).count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::SimulatedFme;
    use crate::counters::events::find_by_name;
    use fmeperf_raw::fme::CTRL_EVENT;

    #[test]
    fn test_port_offsets_event_code() {
        let sim = Arc::new(SimulatedFme::new());
        // devtlb_2m_fill (0x5) on port 1 selects hardware event 0x6
        sim.set_count(EventType::Translation, 0x6, 77);
        sim.set_count(EventType::Translation, 0x5, 11);
        let driver = VtdDriver::translation(sim.clone());

        let desc = find_by_name("vtd_port_devtlb_2m_fill").unwrap();
        assert_eq!(driver.read(desc, Target::Port(1)), Reading::Count(77));
        assert_eq!(CTRL_EVENT.get(sim.register(VTD_CTRL)), 0x6);
        assert_eq!(driver.read(desc, Target::Port(0)), Reading::Count(11));
    }

    #[test]
    fn test_sip_uses_plain_code() {
        let sim = Arc::new(SimulatedFme::new());
        sim.set_count(EventType::TranslationSip, 0xb, 0xFFFF_FFFF_FFFF);
        let driver = VtdDriver::sip(sim.clone());

        let desc = find_by_name("vtd_sip_rcc_miss").unwrap();
        assert_eq!(
            driver.read(desc, Target::Device),
            Reading::Count(0xFFFF_FFFF_FFFF)
        );
        assert_eq!(CTRL_EVENT.get(sim.register(VTD_SIP_CTRL)), 0xb);
        // the translation bank was left alone
        assert_eq!(sim.register(VTD_CTRL), 0);
    }
}
