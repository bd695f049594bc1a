use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::counters::{find_by_name, EventRequest, Target};
use crate::error::{FmeError, Result};
use crate::pmu::{FmePmu, PerfVariant};

/// Where the perf feature's registers come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSource {
    /// A PCI BAR resource file and the feature's offset inside it
    Resource { path: PathBuf, offset: usize },
    /// The in-memory register file
    Simulated,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub device: DeviceSource,
    pub pmu_id: u32,
    /// Forced variant; `None` reads the feature header
    pub variant: Option<PerfVariant>,
    pub ports: u8,
    /// Requested events; empty means every device-wide event
    pub events: Vec<EventRequest>,
    pub interval: Duration,
    pub listen: SocketAddr,
}

impl AgentConfig {
    pub fn new(device: DeviceSource) -> Self {
        Self {
            device,
            pmu_id: 0,
            variant: None,
            ports: fmeperf_raw::fme::MAX_PORT_NUM,
            events: Vec::new(),
            interval: Duration::from_secs(1),
            listen: SocketAddr::from(([0, 0, 0, 0], 9105)),
        }
    }

    /// The configured events, or every device-wide event `pmu` publishes
    pub fn requests(&self, pmu: &FmePmu) -> Vec<EventRequest> {
        if !self.events.is_empty() {
            return self.events.clone();
        }

        pmu.events()
            .iter()
            .filter(|desc| !desc.scoped)
            .map(|desc| desc.request(Target::Device))
            .collect()
    }
}

/// Parse one `--event` argument
///
/// Accepts a published name (`cache_read_hit`), a name with a port
/// (`fab_port_upi_read:0`) or a raw config word (`0x2004`). A per-port name
/// without a port counts port 0.
pub fn parse_event_arg(arg: &str) -> Result<EventRequest> {
    let arg = arg.trim();

    if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        let config = u64::from_str_radix(hex, 16)
            .map_err(|e| FmeError::ParseError(format!("Invalid config word {arg}: {e}")))?;
        return Ok(EventRequest::from_config(config));
    }

    let (name, port) = match arg.split_once(':') {
        Some((name, port)) => {
            let port: u8 = port
                .trim()
                .parse()
                .map_err(|e| FmeError::ParseError(format!("Invalid port in {arg}: {e}")))?;
            (name.trim(), Some(port))
        }
        None => (arg, None),
    };

    let desc = find_by_name(name)
        .ok_or_else(|| FmeError::ParseError(format!("Unknown event: {name}")))?;

    let target = match (desc.scoped, port) {
        (true, port) => Target::Port(port.unwrap_or(0)),
        (false, None) => Target::Device,
        (false, Some(_)) => {
            return Err(FmeError::ParseError(format!(
                "{name} counts the whole device and takes no port"
            )))
        }
    };

    Ok(desc.request(target))
}

/// Parse every `--event` argument, splitting comma-separated lists
pub fn parse_event_list(inputs: &[String]) -> Result<Vec<EventRequest>> {
    let mut requests = Vec::new();
    for input in inputs {
        for part in input.split(',') {
            if part.trim().is_empty() {
                continue;
            }
            requests.push(parse_event_arg(part)?);
        }
    }
    Ok(requests)
}
