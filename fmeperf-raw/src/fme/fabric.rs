//! Fabric counter bank register definitions
//!
//! The fabric bank counts interconnect traffic. It runs either in overall
//! mode (port filter disabled, whole-device traffic) or in port mode, where
//! it only sees the traffic of the port in `port_id`. The mode is shared by
//! every fabric event being counted.

use super::{TaggedCounter, CTRL_EVENT, CTRL_FREEZE_CNTR, CTRL_RESET_CNTR};
use crate::register::{BitField, RegisterLayout};

/// Register offsets from the feature base
pub const FAB_CTRL: u64 = 0x20;
pub const FAB_CNTR: u64 = 0x28;

pub const FAB_PORT_ID: BitField = BitField::new(21, 20);
pub const FAB_PORT_FILTER: BitField = BitField::bit(23);

/// Bit width of the fabric counter
pub const COUNTER_WIDTH_BITS: u32 = 60;

/// Event codes
pub const EVENT_PCIE0_RD: u16 = 0x0;
pub const EVENT_PCIE0_WR: u16 = 0x1;
pub const EVENT_PCIE1_RD: u16 = 0x2;
pub const EVENT_PCIE1_WR: u16 = 0x3;
pub const EVENT_UPI_RD: u16 = 0x4;
pub const EVENT_UPI_WR: u16 = 0x5;
pub const EVENT_MMIO_RD: u16 = 0x6;
pub const EVENT_MMIO_WR: u16 = 0x7;

pub type FabricCounter = TaggedCounter<COUNTER_WIDTH_BITS>;

/// Fabric Control Register layout
///
/// ## Register Format
///
/// | Bits  | Field       | Description                          |
/// |-------|-------------|--------------------------------------|
/// | 0     | reset       | Reset the fabric counter             |
/// | 8     | freeze      | Freeze the fabric counter            |
/// | 16-19 | event       | Fabric event code                    |
/// | 20-21 | port_id     | Port watched when filtering          |
/// | 23    | port_filter | 0 = overall mode, 1 = port mode      |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FabricControl {
    pub reset: bool,
    pub freeze: bool,
    pub event: u8,
    pub port_id: u8,
    pub port_filter: bool,
    /// Bits outside the fields above, preserved across read-modify-write
    pub other: u64,
}

const KNOWN_FIELDS: u64 = CTRL_RESET_CNTR.mask()
    | CTRL_FREEZE_CNTR.mask()
    | CTRL_EVENT.mask()
    | FAB_PORT_ID.mask()
    | FAB_PORT_FILTER.mask();

impl FabricControl {
    /// Port being watched, or `None` in overall mode
    pub fn watched_port(&self) -> Option<u8> {
        self.port_filter.then_some(self.port_id)
    }
}

impl RegisterLayout for FabricControl {
    fn to_reg_value(&self) -> u64 {
        (self.other & !KNOWN_FIELDS)
            | CTRL_RESET_CNTR.prep(self.reset as u64)
            | CTRL_FREEZE_CNTR.prep(self.freeze as u64)
            | CTRL_EVENT.prep(self.event as u64)
            | FAB_PORT_ID.prep(self.port_id as u64)
            | FAB_PORT_FILTER.prep(self.port_filter as u64)
    }

    fn from_reg_value(value: u64) -> Self {
        Self {
            reset: CTRL_RESET_CNTR.is_set(value),
            freeze: CTRL_FREEZE_CNTR.is_set(value),
            event: CTRL_EVENT.get(value) as u8,
            port_id: FAB_PORT_ID.get(value) as u8,
            port_filter: FAB_PORT_FILTER.is_set(value),
            other: value & !KNOWN_FIELDS,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.event as u64 > CTRL_EVENT.max() {
            return Err("Event code must fit in 4 bits");
        }
        if self.port_id as u64 > FAB_PORT_ID.max() {
            return Err("Port id must fit in 2 bits");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fabric_control_port_mode() {
        let ctrl = FabricControl {
            event: EVENT_UPI_WR as u8,
            port_id: 1,
            port_filter: true,
            ..Default::default()
        };
        assert_eq!(ctrl.to_reg_value(), 0x0095_0000);
        assert_eq!(ctrl.watched_port(), Some(1));

        let decoded = FabricControl::from_reg_value(0x0095_0000);
        assert_eq!(decoded, ctrl);
    }

    #[test]
    fn test_fabric_control_overall_mode() {
        let ctrl = FabricControl::from_reg_value(0x0013_0000);
        assert_eq!(ctrl.watched_port(), None);
        assert_eq!(ctrl.event, 0x3);
        assert!(FabricControl { port_id: 4, ..ctrl }.validate().is_err());
    }
}
