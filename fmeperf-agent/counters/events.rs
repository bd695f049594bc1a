// FME event catalogue, external event encoding and resolver
use std::fmt;

use fmeperf_raw::fme::{cache, clock, fabric, vtd, CTRL_EVENT};
use fmeperf_raw::BitField;
use serde::Serialize;

use crate::error::{FmeError, Result};

/// Config word layout: event code, event type and target port
pub const CONFIG_EVENT: BitField = BitField::new(11, 0);
pub const CONFIG_EVTYPE: BitField = BitField::new(15, 12);
pub const CONFIG_PORTID: BitField = BitField::new(23, 16);

/// Raw port id meaning "the whole device"
pub const PORTID_ROOT: u8 = 0xff;

/// Ports the fabric port filter can address
pub const MAX_ADDRESSABLE_PORTS: u8 = (fabric::FAB_PORT_ID.max() + 1) as u8;

/// Counter bank an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Basic = 0,
    Cache = 1,
    Fabric = 2,
    Translation = 3,
    TranslationSip = 4,
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Basic => "basic",
            EventType::Cache => "cache",
            EventType::Fabric => "fabric",
            EventType::Translation => "vtd",
            EventType::TranslationSip => "vtd_sip",
        }
    }

    pub fn all() -> [EventType; 5] {
        [
            EventType::Basic,
            EventType::Cache,
            EventType::Fabric,
            EventType::Translation,
            EventType::TranslationSip,
        ]
    }

    /// Only present on the full performance feature variant
    pub fn is_extended(&self) -> bool {
        matches!(
            self,
            EventType::Cache | EventType::Translation | EventType::TranslationSip
        )
    }

    /// Catalogue entries of this type
    pub fn events(&self) -> &'static [EventDescriptor] {
        match self {
            EventType::Basic => BASIC_EVENTS,
            EventType::Cache => CACHE_EVENTS,
            EventType::Fabric => FABRIC_EVENTS,
            EventType::Translation => VTD_EVENTS,
            EventType::TranslationSip => VTD_SIP_EVENTS,
        }
    }
}

impl TryFrom<u8> for EventType {
    type Error = FmeError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(EventType::Basic),
            1 => Ok(EventType::Cache),
            2 => Ok(EventType::Fabric),
            3 => Ok(EventType::Translation),
            4 => Ok(EventType::TranslationSip),
            _ => Err(FmeError::InvalidEventType(raw)),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a counter watches: the whole device or a single port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Device,
    Port(u8),
}

impl Target {
    pub fn from_raw(raw: u8) -> Self {
        if raw == PORTID_ROOT {
            Target::Device
        } else {
            Target::Port(raw)
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            Target::Device => PORTID_ROOT,
            Target::Port(port) => *port,
        }
    }

    pub fn is_port(&self) -> bool {
        matches!(self, Target::Port(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Device => f.write_str("device"),
            Target::Port(port) => write!(f, "port {port}"),
        }
    }
}

/// One catalogue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventDescriptor {
    /// Published event name
    pub name: &'static str,
    /// Hardware event code (12 bits in the config word)
    pub event_code: u16,
    pub event_type: EventType,
    /// Counted per port rather than for the whole device
    pub scoped: bool,
    /// Per-event hardware data; the channel for cache events
    pub aux_data: u64,
}

impl EventDescriptor {
    /// Attribute value as published in the PMU `events` group
    ///
    /// Port events leave the port id to the user: `portid=?`.
    pub fn attr_string(&self) -> String {
        let mut s = format!(
            "event=0x{:02x},evtype=0x{:02x}",
            self.event_code, self.event_type as u8
        );
        if self.scoped {
            s.push_str(",portid=?");
        } else {
            s.push_str(&format!(",portid=0x{PORTID_ROOT:02x}"));
        }
        s
    }

    /// Request counting this event on `target`
    pub fn request(&self, target: Target) -> EventRequest {
        EventRequest {
            event_code: self.event_code,
            event_type: self.event_type as u8,
            target,
        }
    }
}

event_group! {
    pub static BASIC_EVENTS: Basic = [
        "clock" => (clock::EVENT_CLK, device),
    ];
}

event_group! {
    pub static CACHE_EVENTS: Cache = [
        "cache_read_hit" => (cache::EVENT_RD_HIT, device, cache::CHANNEL_RD),
        "cache_read_miss" => (cache::EVENT_RD_MISS, device, cache::CHANNEL_RD),
        "cache_write_hit" => (cache::EVENT_WR_HIT, device, cache::CHANNEL_WR),
        "cache_write_miss" => (cache::EVENT_WR_MISS, device, cache::CHANNEL_WR),
        "cache_hold_request" => (cache::EVENT_HOLD_REQ, device, cache::CHANNEL_RD),
        "cache_data_write_port_contention" => (cache::EVENT_DATA_WR_PORT_CONTEN, device, cache::CHANNEL_WR),
        "cache_tag_write_port_contention" => (cache::EVENT_TAG_WR_PORT_CONTEN, device, cache::CHANNEL_WR),
        "cache_tx_req_stall" => (cache::EVENT_TX_REQ_STALL, device, cache::CHANNEL_RD),
        "cache_rx_req_stall" => (cache::EVENT_RX_REQ_STALL, device, cache::CHANNEL_RD),
        "cache_eviction" => (cache::EVENT_EVICTIONS, device, cache::CHANNEL_RD),
    ];
}

event_group! {
    pub static FABRIC_EVENTS: Fabric = [
        "fab_pcie0_read" => (fabric::EVENT_PCIE0_RD, device),
        "fab_pcie0_write" => (fabric::EVENT_PCIE0_WR, device),
        "fab_pcie1_read" => (fabric::EVENT_PCIE1_RD, device),
        "fab_pcie1_write" => (fabric::EVENT_PCIE1_WR, device),
        "fab_upi_read" => (fabric::EVENT_UPI_RD, device),
        "fab_upi_write" => (fabric::EVENT_UPI_WR, device),
        "fab_mmio_read" => (fabric::EVENT_MMIO_RD, device),
        "fab_mmio_write" => (fabric::EVENT_MMIO_WR, device),
        "fab_port_pcie0_read" => (fabric::EVENT_PCIE0_RD, port),
        "fab_port_pcie0_write" => (fabric::EVENT_PCIE0_WR, port),
        "fab_port_pcie1_read" => (fabric::EVENT_PCIE1_RD, port),
        "fab_port_pcie1_write" => (fabric::EVENT_PCIE1_WR, port),
        "fab_port_upi_read" => (fabric::EVENT_UPI_RD, port),
        "fab_port_upi_write" => (fabric::EVENT_UPI_WR, port),
        "fab_port_mmio_read" => (fabric::EVENT_MMIO_RD, port),
        "fab_port_mmio_write" => (fabric::EVENT_MMIO_WR, port),
    ];
}

event_group! {
    pub static VTD_EVENTS: Translation = [
        "vtd_port_read_transaction" => (vtd::EVENT_AFU_MEM_RD_TRANS, port),
        "vtd_port_write_transaction" => (vtd::EVENT_AFU_MEM_WR_TRANS, port),
        "vtd_port_devtlb_read_hit" => (vtd::EVENT_AFU_DEVTLB_RD_HIT, port),
        "vtd_port_devtlb_write_hit" => (vtd::EVENT_AFU_DEVTLB_WR_HIT, port),
        "vtd_port_devtlb_4k_fill" => (vtd::EVENT_DEVTLB_4K_FILL, port),
        "vtd_port_devtlb_2m_fill" => (vtd::EVENT_DEVTLB_2M_FILL, port),
        "vtd_port_devtlb_1g_fill" => (vtd::EVENT_DEVTLB_1G_FILL, port),
    ];
}

event_group! {
    pub static VTD_SIP_EVENTS: TranslationSip = [
        "vtd_sip_iotlb_4k_hit" => (vtd::SIP_EVENT_IOTLB_4K_HIT, device),
        "vtd_sip_iotlb_2m_hit" => (vtd::SIP_EVENT_IOTLB_2M_HIT, device),
        "vtd_sip_iotlb_1g_hit" => (vtd::SIP_EVENT_IOTLB_1G_HIT, device),
        "vtd_sip_slpwc_l3_hit" => (vtd::SIP_EVENT_SLPWC_L3_HIT, device),
        "vtd_sip_slpwc_l4_hit" => (vtd::SIP_EVENT_SLPWC_L4_HIT, device),
        "vtd_sip_rcc_hit" => (vtd::SIP_EVENT_RCC_HIT, device),
        "vtd_sip_iotlb_4k_miss" => (vtd::SIP_EVENT_IOTLB_4K_MISS, device),
        "vtd_sip_iotlb_2m_miss" => (vtd::SIP_EVENT_IOTLB_2M_MISS, device),
        "vtd_sip_iotlb_1g_miss" => (vtd::SIP_EVENT_IOTLB_1G_MISS, device),
        "vtd_sip_slpwc_l3_miss" => (vtd::SIP_EVENT_SLPWC_L3_MISS, device),
        "vtd_sip_slpwc_l4_miss" => (vtd::SIP_EVENT_SLPWC_L4_MISS, device),
        "vtd_sip_rcc_miss" => (vtd::SIP_EVENT_RCC_MISS, device),
    ];
}

/// Look an event up by its published name
pub fn find_by_name(name: &str) -> Option<&'static EventDescriptor> {
    EventType::all()
        .iter()
        .flat_map(|ty| ty.events())
        .find(|desc| desc.name == name)
}

/// A caller's request to count one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRequest {
    pub event_code: u16,
    /// Raw event type; validated on resolve
    pub event_type: u8,
    pub target: Target,
}

impl EventRequest {
    /// Decode a perf-style config word
    ///
    /// | Bits  | Field   |
    /// |-------|---------|
    /// | 0-11  | event   |
    /// | 12-15 | evtype  |
    /// | 16-23 | portid  |
    pub fn from_config(config: u64) -> Self {
        Self {
            event_code: CONFIG_EVENT.get(config) as u16,
            event_type: CONFIG_EVTYPE.get(config) as u8,
            target: Target::from_raw(CONFIG_PORTID.get(config) as u8),
        }
    }

    pub fn to_config(&self) -> u64 {
        CONFIG_EVENT.prep(self.event_code as u64)
            | CONFIG_EVTYPE.prep(self.event_type as u64)
            | CONFIG_PORTID.prep(self.target.raw() as u64)
    }
}

/// Maps requests to catalogue entries for one device
#[derive(Debug, Clone, Copy)]
pub struct EventResolver {
    ports: u8,
    extended: bool,
}

impl EventResolver {
    /// `ports` is the number of ports present, `extended` whether the
    /// cache and VT-d banks exist
    pub fn new(ports: u8, extended: bool) -> Result<Self> {
        if ports > MAX_ADDRESSABLE_PORTS {
            return Err(FmeError::ConfigError(format!(
                "{ports} ports requested, the hardware addresses at most {MAX_ADDRESSABLE_PORTS}"
            )));
        }
        Ok(Self { ports, extended })
    }

    /// Event types this device counts, in publishing order
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types = vec![EventType::Basic, EventType::Fabric];
        if self.extended {
            types.extend([
                EventType::Cache,
                EventType::Translation,
                EventType::TranslationSip,
            ]);
        }
        types
    }

    pub fn resolve(&self, request: &EventRequest) -> Result<&'static EventDescriptor> {
        let event_type = EventType::try_from(request.event_type)?;
        if event_type.is_extended() && !self.extended {
            return Err(FmeError::InvalidEventType(request.event_type));
        }

        let scoped = request.target.is_port();
        let desc = event_type
            .events()
            .iter()
            .find(|desc| desc.event_code == request.event_code && desc.scoped == scoped)
            .ok_or_else(|| FmeError::InvalidEvent {
                event_code: request.event_code,
                event_type,
                target: request.target,
            })?;

        if let Target::Port(port) = request.target {
            // translation events select `event + port` in the 4-bit field
            let unaddressable = event_type == EventType::Translation
                && vtd::port_event(desc.event_code, port) > CTRL_EVENT.max();
            if port >= self.ports || unaddressable {
                return Err(FmeError::InvalidTarget {
                    name: desc.name,
                    target: request.target,
                    ports: self.ports,
                });
            }
        }

        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn resolver() -> EventResolver {
        EventResolver::new(1, true).unwrap()
    }

    #[test]
    fn test_catalogue_sizes() {
        assert_eq!(BASIC_EVENTS.len(), 1);
        assert_eq!(CACHE_EVENTS.len(), 10);
        assert_eq!(FABRIC_EVENTS.len(), 16);
        assert_eq!(VTD_EVENTS.len(), 7);
        assert_eq!(VTD_SIP_EVENTS.len(), 12);
    }

    #[test]
    fn test_code_scope_unique_per_group() {
        for ty in EventType::all() {
            let mut seen = HashSet::new();
            for desc in ty.events() {
                assert_eq!(desc.event_type, ty);
                assert!(
                    seen.insert((desc.event_code, desc.scoped)),
                    "duplicate {} in {}",
                    desc.name,
                    ty
                );
            }
        }
    }

    #[test]
    fn test_every_event_resolves_to_itself() {
        let resolver = resolver();
        for ty in EventType::all() {
            for desc in ty.events() {
                let target = if desc.scoped {
                    Target::Port(0)
                } else {
                    Target::Device
                };
                let resolved = resolver.resolve(&desc.request(target)).unwrap();
                assert_eq!(resolved, desc);
                assert_eq!(resolved.scoped, target != Target::Device);
            }
        }
    }

    #[test]
    fn test_fabric_scope_selects_entry() {
        let resolver = resolver();
        let device = EventRequest {
            event_code: fabric::EVENT_UPI_RD,
            event_type: EventType::Fabric as u8,
            target: Target::Device,
        };
        assert_eq!(resolver.resolve(&device).unwrap().name, "fab_upi_read");

        let port = EventRequest {
            target: Target::Port(0),
            ..device
        };
        assert_eq!(resolver.resolve(&port).unwrap().name, "fab_port_upi_read");
    }

    #[test]
    fn test_invalid_event_type() {
        let request = EventRequest {
            event_code: 0,
            event_type: 5,
            target: Target::Device,
        };
        assert!(matches!(
            resolver().resolve(&request),
            Err(FmeError::InvalidEventType(5))
        ));
    }

    #[test]
    fn test_unknown_code() {
        let request = EventRequest {
            event_code: 0xc,
            event_type: EventType::TranslationSip as u8,
            target: Target::Device,
        };
        assert!(matches!(
            resolver().resolve(&request),
            Err(FmeError::InvalidEvent { event_code: 0xc, .. })
        ));
    }

    #[test]
    fn test_wrong_scope_for_code() {
        // VT-d events only exist per port
        let device = EventRequest {
            event_code: vtd::EVENT_AFU_MEM_RD_TRANS,
            event_type: EventType::Translation as u8,
            target: Target::Device,
        };
        assert!(matches!(
            resolver().resolve(&device),
            Err(FmeError::InvalidEvent { .. })
        ));

        // the clock is device-wide only
        let port = BASIC_EVENTS[0].request(Target::Port(0));
        assert!(matches!(
            resolver().resolve(&port),
            Err(FmeError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn test_port_out_of_range() {
        let request = FABRIC_EVENTS[8].request(Target::Port(1));
        assert!(matches!(
            resolver().resolve(&request),
            Err(FmeError::InvalidTarget {
                name: "fab_port_pcie0_read",
                ports: 1,
                ..
            })
        ));

        let wider = EventResolver::new(2, true).unwrap();
        assert!(wider.resolve(&request).is_ok());
    }

    #[test]
    fn test_port_count_capped_by_filter_width() {
        assert_eq!(MAX_ADDRESSABLE_PORTS, 4);
        assert!(EventResolver::new(4, true).is_ok());
        assert!(matches!(
            EventResolver::new(8, true),
            Err(FmeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_translation_code_overflow_rejected() {
        // wider than any real device, so only the select field limits it
        let resolver = EventResolver {
            ports: 16,
            extended: true,
        };
        let fill = find_by_name("vtd_port_devtlb_1g_fill").unwrap();

        assert!(resolver.resolve(&fill.request(Target::Port(9))).is_ok());
        assert!(matches!(
            resolver.resolve(&fill.request(Target::Port(10))),
            Err(FmeError::InvalidTarget {
                name: "vtd_port_devtlb_1g_fill",
                target: Target::Port(10),
                ..
            })
        ));
    }

    #[test]
    fn test_reduced_variant_rejects_extended_types() {
        let reduced = EventResolver::new(1, false).unwrap();
        let request = CACHE_EVENTS[0].request(Target::Device);
        assert!(matches!(
            reduced.resolve(&request),
            Err(FmeError::InvalidEventType(1))
        ));
        assert!(reduced
            .resolve(&FABRIC_EVENTS[0].request(Target::Device))
            .is_ok());
        assert_eq!(
            reduced.event_types(),
            vec![EventType::Basic, EventType::Fabric]
        );
    }

    #[test]
    fn test_config_word_layout() {
        let request = EventRequest::from_config(0x00ff_2003);
        assert_eq!(request.event_code, 0x3);
        assert_eq!(request.event_type, 2);
        assert_eq!(request.target, Target::Device);
        assert_eq!(request.to_config(), 0x00ff_2003);

        let port = EventRequest::from_config(0x0000_3006);
        assert_eq!(port.target, Target::Port(0));
        assert_eq!(port.event_type, EventType::Translation as u8);

        // bits above 23 are not part of the encoding
        assert_eq!(EventRequest::from_config(0xff00_0000_00ff_0000).to_config(), 0x00ff_0000);
    }

    #[test]
    fn test_attr_strings() {
        assert_eq!(
            CACHE_EVENTS[0].attr_string(),
            "event=0x00,evtype=0x01,portid=0xff"
        );
        assert_eq!(
            find_by_name("fab_port_mmio_write").unwrap().attr_string(),
            "event=0x07,evtype=0x02,portid=?"
        );
        assert_eq!(
            find_by_name("vtd_sip_rcc_miss").unwrap().attr_string(),
            "event=0x0b,evtype=0x04,portid=0xff"
        );
        assert!(find_by_name("cache_bogus").is_none());
    }
}
