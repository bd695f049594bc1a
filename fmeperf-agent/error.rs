use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

use crate::counters::events::{EventType, Target};

#[derive(Error, Debug)]
pub enum FmeError {
    #[error("Invalid event type: {0}")]
    InvalidEventType(u8),

    #[error("No {event_type} event with code 0x{event_code:02x} for {target}")]
    InvalidEvent {
        event_code: u16,
        event_type: EventType,
        target: Target,
    },

    #[error("Event {name} cannot count on {target} ({ports} port(s) present)")]
    InvalidTarget {
        name: &'static str,
        target: Target,
        ports: u8,
    },

    #[error("Fabric counters are bound to {bound}, cannot monitor {requested}")]
    ScopeConflict { requested: Target, bound: Target },

    #[error("Failed to allocate published event table: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("MMIO operation failed: {0}")]
    MmioError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Nix error: {0}")]
    NixError(#[from] nix::Error),

    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<fmeperf_raw::MmioError> for FmeError {
    fn from(e: fmeperf_raw::MmioError) -> Self {
        FmeError::MmioError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FmeError>;
