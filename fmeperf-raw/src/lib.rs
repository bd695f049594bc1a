//! # fmeperf-raw
//!
//! Register definitions for the FPGA Management Engine (FME) global
//! performance reporting feature found on Device Feature List (DFL) FPGA
//! cards.
//!
//! This crate provides type-safe abstractions over the feature's 64-bit
//! MMIO registers: typed layouts for every control and counter register,
//! the event codes each counter bank understands, and the bounded polling
//! primitive used by the select-then-read protocol.
//!
//! ## Usage
//!
//! ```ignore
//! use fmeperf_raw::fme::cache::{self, CacheControl};
//! use fmeperf_raw::{RegisterLayout, RegisterWindow};
//!
//! // Select the read channel and the read-hit event
//! let mut ctrl = CacheControl::from_reg_value(window.read64(cache::CACHE_CTRL));
//! ctrl.channel = cache::CHANNEL_RD;
//! ctrl.event = cache::EVENT_RD_HIT;
//!
//! window.write64(cache::CACHE_CTRL, ctrl.to_reg_value());
//! ```

pub mod fme;
pub mod mmio;
pub mod register;

// Re-export for convenience
pub use mmio::{read_poll_timeout, MmioError, MmioRegion, RegisterWindow, Result};
pub use register::{BitField, RegisterLayout};
