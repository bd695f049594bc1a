// FME performance monitoring unit
//
// Ties the catalogue, the driver table and the fabric arbiter of one device
// together behind the start/update/stop surface.

use std::fmt;
use std::sync::Arc;

use fmeperf_raw::fme::{DFH, DFH_ID, FEATURE_ID_GLOBAL_DPERF, FEATURE_ID_GLOBAL_IPERF};
use fmeperf_raw::RegisterWindow;
use serde::Serialize;

use crate::counters::{
    ArbiterState, DriverTable, EventDescriptor, EventRequest, EventResolver, Session,
};
use crate::error::{FmeError, Result};

/// Which flavour of the global performance feature the device carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerfVariant {
    /// "iperf": every bank, including cache and VT-d
    Full,
    /// "dperf": clock and fabric only
    Reduced,
}

impl PerfVariant {
    pub fn from_feature_id(id: u16) -> Option<Self> {
        match id {
            FEATURE_ID_GLOBAL_IPERF => Some(PerfVariant::Full),
            FEATURE_ID_GLOBAL_DPERF => Some(PerfVariant::Reduced),
            _ => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PerfVariant::Full)
    }
}

impl fmt::Display for PerfVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerfVariant::Full => f.write_str("iperf"),
            PerfVariant::Reduced => f.write_str("dperf"),
        }
    }
}

/// Config word fields as published in the `format` group
pub const FORMAT_ATTRS: [(&str, &str); 3] = [
    ("event", "config:0-11"),
    ("evtype", "config:12-15"),
    ("portid", "config:16-23"),
];

/// Counting is device-wide, bound to CPU 0
pub const CPUMASK: &str = "0";

/// Attribute groups in the shape the kernel PMU publishes them
#[derive(Debug, Clone, Serialize)]
pub struct PublishedAttributes {
    pub format: Vec<(&'static str, &'static str)>,
    pub cpumask: &'static str,
    /// Event name and its config string
    pub events: Vec<(&'static str, String)>,
}

pub struct FmePmu {
    name: String,
    variant: PerfVariant,
    resolver: EventResolver,
    drivers: DriverTable,
    events: Vec<&'static EventDescriptor>,
}

impl FmePmu {
    pub fn new(
        id: u32,
        window: Arc<dyn RegisterWindow>,
        variant: PerfVariant,
        ports: u8,
    ) -> Result<Self> {
        let resolver = EventResolver::new(ports, variant.is_full())?;

        let types = resolver.event_types();
        let total: usize = types.iter().map(|ty| ty.events().len()).sum();
        let mut events = Vec::new();
        events.try_reserve_exact(total)?;
        for ty in types {
            events.extend(ty.events().iter());
        }

        let pmu = Self {
            name: format!("fme{id}"),
            variant,
            resolver,
            drivers: DriverTable::new(window),
            events,
        };

        tracing::info!(
            "{}: global {} feature, {} ports, {} events",
            pmu.name,
            variant,
            ports,
            pmu.events.len()
        );
        Ok(pmu)
    }

    /// Read the feature header to tell the full and reduced variants apart
    pub fn detect_variant(window: &dyn RegisterWindow) -> Result<PerfVariant> {
        let id = DFH_ID.get(window.read64(DFH)) as u16;
        PerfVariant::from_feature_id(id).ok_or_else(|| {
            FmeError::ConfigError(format!(
                "Feature id 0x{id:x} is not a global performance feature"
            ))
        })
    }

    /// Attach to a device whose variant is read from its feature header
    pub fn attach(id: u32, window: Arc<dyn RegisterWindow>, ports: u8) -> Result<Self> {
        let variant = Self::detect_variant(&*window)?;
        Self::new(id, window, variant, ports)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> PerfVariant {
        self.variant
    }

    /// Published events in publishing order
    pub fn events(&self) -> &[&'static EventDescriptor] {
        &self.events
    }

    pub fn attributes(&self) -> Result<PublishedAttributes> {
        let mut events = Vec::new();
        events.try_reserve_exact(self.events.len())?;
        events.extend(self.events.iter().map(|desc| (desc.name, desc.attr_string())));

        Ok(PublishedAttributes {
            format: FORMAT_ATTRS.to_vec(),
            cpumask: CPUMASK,
            events,
        })
    }

    /// Resolve, acquire and baseline a counter
    pub fn start(&self, request: &EventRequest) -> Result<Session> {
        let desc = self.resolver.resolve(request)?;
        let driver = self.drivers.get(desc.event_type);
        Session::start(desc, request.target, driver)
    }

    pub fn start_config(&self, config: u64) -> Result<Session> {
        self.start(&EventRequest::from_config(config))
    }

    pub fn update(&self, session: &mut Session) -> u64 {
        session.update()
    }

    pub fn stop(&self, session: Session) -> u64 {
        session.stop()
    }

    pub fn fabric_state(&self) -> ArbiterState {
        self.drivers.fabric().state()
    }
}
