//! Clock counter register definitions
//!
//! The clock counter is free running; software can neither reset nor
//! freeze it, and it has no event select.

/// Register offset from the feature base
pub const CLK_CNTR: u64 = 0x30;

/// The only basic event: FPGA clock ticks
pub const EVENT_CLK: u16 = 0x0;
