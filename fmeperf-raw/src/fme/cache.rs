//! Cache counter bank register definitions
//!
//! The cache bank counts one event at a time on one channel (read or
//! write). Two counter registers count the selected event in parallel and
//! the total is their sum.

use super::{TaggedCounter, CTRL_EVENT, CTRL_FREEZE_CNTR, CTRL_RESET_CNTR};
use crate::register::{BitField, RegisterLayout};

/// Register offsets from the feature base
pub const CACHE_CTRL: u64 = 0x08;
pub const CACHE_CNTR0: u64 = 0x10;
pub const CACHE_CNTR1: u64 = 0x18;

/// Channel access type select (bit 20)
pub const CACHE_CHANNEL_SEL: BitField = BitField::bit(20);

/// Bit width of the cache counters
pub const COUNTER_WIDTH_BITS: u32 = 48;

pub const CHANNEL_RD: u64 = 0;
pub const CHANNEL_WR: u64 = 1;

/// Event codes
pub const EVENT_RD_HIT: u16 = 0x0;
pub const EVENT_WR_HIT: u16 = 0x1;
pub const EVENT_RD_MISS: u16 = 0x2;
pub const EVENT_WR_MISS: u16 = 0x3;
pub const EVENT_RSVD: u16 = 0x4;
pub const EVENT_HOLD_REQ: u16 = 0x5;
pub const EVENT_DATA_WR_PORT_CONTEN: u16 = 0x6;
pub const EVENT_TAG_WR_PORT_CONTEN: u16 = 0x7;
pub const EVENT_TX_REQ_STALL: u16 = 0x8;
pub const EVENT_RX_REQ_STALL: u16 = 0x9;
pub const EVENT_EVICTIONS: u16 = 0xa;

pub type CacheCounter = TaggedCounter<COUNTER_WIDTH_BITS>;

/// Cache Control Register layout
///
/// ## Register Format
///
/// | Bits  | Field   | Description                     |
/// |-------|---------|---------------------------------|
/// | 0     | reset   | Reset both cache counters       |
/// | 8     | freeze  | Freeze both cache counters      |
/// | 16-19 | event   | Cache event code                |
/// | 20    | channel | 0 = read channel, 1 = write     |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub reset: bool,
    pub freeze: bool,
    pub event: u8,
    pub channel: u64,
    /// Bits outside the fields above, preserved across read-modify-write
    pub other: u64,
}

const KNOWN_FIELDS: u64 =
    CTRL_RESET_CNTR.mask() | CTRL_FREEZE_CNTR.mask() | CTRL_EVENT.mask() | CACHE_CHANNEL_SEL.mask();

impl RegisterLayout for CacheControl {
    fn to_reg_value(&self) -> u64 {
        (self.other & !KNOWN_FIELDS)
            | CTRL_RESET_CNTR.prep(self.reset as u64)
            | CTRL_FREEZE_CNTR.prep(self.freeze as u64)
            | CTRL_EVENT.prep(self.event as u64)
            | CACHE_CHANNEL_SEL.prep(self.channel)
    }

    fn from_reg_value(value: u64) -> Self {
        Self {
            reset: CTRL_RESET_CNTR.is_set(value),
            freeze: CTRL_FREEZE_CNTR.is_set(value),
            event: CTRL_EVENT.get(value) as u8,
            channel: CACHE_CHANNEL_SEL.get(value),
            other: value & !KNOWN_FIELDS,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.event as u64 > CTRL_EVENT.max() {
            return Err("Event code must fit in 4 bits");
        }
        if self.channel > CHANNEL_WR {
            return Err("Channel must be read (0) or write (1)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_control_preserves_unknown_bits() {
        let raw = 0xFF00_0000_0000_0101u64;
        let mut ctrl = CacheControl::from_reg_value(raw);
        assert!(ctrl.reset && ctrl.freeze);

        ctrl.event = EVENT_WR_MISS as u8;
        ctrl.channel = CHANNEL_WR;
        assert_eq!(ctrl.to_reg_value(), 0xFF00_0000_0013_0101);
        assert!(ctrl.validate().is_ok());
    }

    #[test]
    fn test_cache_counter_field() {
        let counter = CacheCounter::from_reg_value(0x2000_FFFF_FFFF_FFFF);
        assert_eq!(counter.count, 0xFFFF_FFFF_FFFF);
        assert_eq!(counter.event, 0x2);
    }
}
