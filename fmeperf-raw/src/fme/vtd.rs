//! VT-d (IOMMU) counter bank register definitions
//!
//! Two banks share one layout. The VT-d bank counts per-port device TLB
//! events; each port owns a contiguous range of event codes, so the code
//! written to the select field is the base event plus the port index. The
//! SIP bank counts device-wide IOTLB and paging-structure cache events.

use super::{EventControl, TaggedCounter};

/// VT-d register offsets from the feature base
pub const VTD_CTRL: u64 = 0x38;
pub const VTD_CNTR: u64 = 0x40;

/// VT-d SIP register offsets from the feature base
pub const VTD_SIP_CTRL: u64 = 0x48;
pub const VTD_SIP_CNTR: u64 = 0x50;

/// Bit width of both VT-d counters
pub const COUNTER_WIDTH_BITS: u32 = 48;

/// VT-d event codes (for port 0)
pub const EVENT_AFU_MEM_RD_TRANS: u16 = 0x0;
pub const EVENT_AFU_MEM_WR_TRANS: u16 = 0x1;
pub const EVENT_AFU_DEVTLB_RD_HIT: u16 = 0x2;
pub const EVENT_AFU_DEVTLB_WR_HIT: u16 = 0x3;
pub const EVENT_DEVTLB_4K_FILL: u16 = 0x4;
pub const EVENT_DEVTLB_2M_FILL: u16 = 0x5;
pub const EVENT_DEVTLB_1G_FILL: u16 = 0x6;

/// VT-d SIP event codes
pub const SIP_EVENT_IOTLB_4K_HIT: u16 = 0x0;
pub const SIP_EVENT_IOTLB_2M_HIT: u16 = 0x1;
pub const SIP_EVENT_IOTLB_1G_HIT: u16 = 0x2;
pub const SIP_EVENT_SLPWC_L3_HIT: u16 = 0x3;
pub const SIP_EVENT_SLPWC_L4_HIT: u16 = 0x4;
pub const SIP_EVENT_RCC_HIT: u16 = 0x5;
pub const SIP_EVENT_IOTLB_4K_MISS: u16 = 0x6;
pub const SIP_EVENT_IOTLB_2M_MISS: u16 = 0x7;
pub const SIP_EVENT_IOTLB_1G_MISS: u16 = 0x8;
pub const SIP_EVENT_SLPWC_L3_MISS: u16 = 0x9;
pub const SIP_EVENT_SLPWC_L4_MISS: u16 = 0xa;
pub const SIP_EVENT_RCC_MISS: u16 = 0xb;

pub type VtdControl = EventControl;
pub type VtdCounter = TaggedCounter<COUNTER_WIDTH_BITS>;

/// Hardware event code selecting `event` for `port`
pub const fn port_event(event: u16, port: u8) -> u64 {
    event as u64 + port as u64
}
