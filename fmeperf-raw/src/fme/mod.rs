//! FME global performance reporting feature
//!
//! The feature exposes four independent counter banks plus a free-running
//! clock inside one small MMIO block:
//!
//! - **Cache** - FPGA cache hit/miss/stall events, two summed counters
//! - **Fabric** - PCIe/UPI/MMIO traffic, device-wide or filtered to one port
//! - **Clock** - free-running FPGA clock counter
//! - **VT-d** - per-port device TLB events
//! - **VT-d SIP** - device-wide IOTLB and paging-structure cache events
//!
//! Every banked counter uses the same protocol: write the wanted event code
//! into the bank's control register, then poll the counter register until
//! its event tag (bits 63:60) reports the same code before trusting the
//! count.
//!
//! ## References
//!
//! - Linux `drivers/fpga/dfl-fme-perf.c`
//! - Intel FPGA Programmable Acceleration Card, FME register map

use std::time::Duration;

use crate::register::{BitField, RegisterLayout};

pub mod cache;
pub mod clock;
pub mod fabric;
pub mod vtd;

/// DFL feature id of the full ("integrated") performance feature
pub const FEATURE_ID_GLOBAL_IPERF: u16 = 0x7;

/// DFL feature id of the reduced ("discrete") performance feature
pub const FEATURE_ID_GLOBAL_DPERF: u16 = 0x8;

/// Device Feature Header at the start of every DFL feature
pub const DFH: u64 = 0x00;
pub const DFH_ID: BitField = BitField::new(11, 0);

/// Bytes covered by the perf feature's registers
pub const FME_PERF_REGION_SIZE: usize = 0x58;

/// Number of ports whose traffic can be filtered
pub const MAX_PORT_NUM: u8 = 1;

/// Interval between counter register samples while waiting for a select
pub const POLL_DELAY: Duration = Duration::from_micros(1);

/// Upper bound on waiting for a counter register to reflect a select
pub const POLL_TIMEOUT: Duration = Duration::from_micros(30);

/// Fields shared by every bank control register
pub const CTRL_RESET_CNTR: BitField = BitField::bit(0);
pub const CTRL_FREEZE_CNTR: BitField = BitField::bit(8);
pub const CTRL_EVENT: BitField = BitField::new(19, 16);

/// Event tag reported by every banked counter register
pub const CNTR_EVENT: BitField = BitField::new(63, 60);

/// Control register holding only the common reset/freeze/event fields
///
/// Used as is by the VT-d banks; cache and fabric extend it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventControl {
    /// Reset all counters of the bank
    pub reset: bool,
    /// Freeze all counters of the bank
    pub freeze: bool,
    /// Selected event code (bits 16-19)
    pub event: u8,
    /// Bits outside the fields above, preserved across read-modify-write
    pub other: u64,
}

const CTRL_KNOWN_FIELDS: u64 = CTRL_RESET_CNTR.mask() | CTRL_FREEZE_CNTR.mask() | CTRL_EVENT.mask();

impl RegisterLayout for EventControl {
    fn to_reg_value(&self) -> u64 {
        (self.other & !CTRL_KNOWN_FIELDS)
            | CTRL_RESET_CNTR.prep(self.reset as u64)
            | CTRL_FREEZE_CNTR.prep(self.freeze as u64)
            | CTRL_EVENT.prep(self.event as u64)
    }

    fn from_reg_value(value: u64) -> Self {
        Self {
            reset: CTRL_RESET_CNTR.is_set(value),
            freeze: CTRL_FREEZE_CNTR.is_set(value),
            event: CTRL_EVENT.get(value) as u8,
            other: value & !CTRL_KNOWN_FIELDS,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.event as u64 > CTRL_EVENT.max() {
            return Err("Event code must fit in 4 bits");
        }
        Ok(())
    }
}

/// Banked counter register: a `BITS`-wide count plus the event tag
///
/// ## Register Format
///
/// | Bits       | Field | Description                         |
/// |------------|-------|-------------------------------------|
/// | 0-(BITS-1) | count | Event count                         |
/// | 60-63      | event | Event code the count belongs to     |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaggedCounter<const BITS: u32> {
    pub count: u64,
    pub event: u8,
}

impl<const BITS: u32> TaggedCounter<BITS> {
    pub const COUNT: BitField = BitField::new(BITS - 1, 0);

    /// Does this sample belong to `event`?
    pub fn reports(&self, event: u64) -> bool {
        self.event as u64 == event
    }
}

impl<const BITS: u32> RegisterLayout for TaggedCounter<BITS> {
    fn to_reg_value(&self) -> u64 {
        Self::COUNT.prep(self.count) | CNTR_EVENT.prep(self.event as u64)
    }

    fn from_reg_value(value: u64) -> Self {
        Self {
            count: Self::COUNT.get(value),
            event: CNTR_EVENT.get(value) as u8,
        }
    }
}
