//! MMIO register window primitives
//!
//! This module provides the 64-bit register access abstraction every counter
//! driver is written against, a volatile implementation over a mapped region,
//! and the bounded polling loop used by the select-then-read protocol.
//! Mapping a device BAR into the process is left to the caller (see the
//! BAR registry in fmeperf-agent).

use std::ptr::NonNull;
use std::time::{Duration, Instant};

pub type Result<T> = std::result::Result<T, MmioError>;

/// Errors that can occur while setting up MMIO access
#[derive(Debug, thiserror::Error)]
pub enum MmioError {
    #[error("MMIO region at 0x{base:X} is not 8-byte aligned")]
    Misaligned { base: usize },

    #[error("Register offset 0x{offset:X} is outside the {len} byte window")]
    OutOfRange { offset: u64, len: usize },
}

/// A byte-addressable window of 64-bit hardware registers
///
/// Offsets are relative to the start of the window and must be 8-byte
/// aligned. Implementations must tolerate concurrent callers; serializing
/// multi-register sequences is the caller's job.
pub trait RegisterWindow: Send + Sync {
    /// Read the 64-bit register at `offset`
    fn read64(&self, offset: u64) -> u64;

    /// Write the 64-bit register at `offset`
    fn write64(&self, offset: u64, value: u64);
}

/// Volatile register access over an already-mapped memory region
#[derive(Debug)]
pub struct MmioRegion {
    base: NonNull<u8>,
    len: usize,
}

// The region is plain device memory; every access is a single volatile
// 64-bit load or store.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Wrap a mapped region
    ///
    /// # Safety
    ///
    /// `base` must point to `len` bytes of readable and writable device
    /// memory that stays mapped for the lifetime of the returned value.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> Result<Self> {
        if (base.as_ptr() as usize) % 8 != 0 {
            return Err(MmioError::Misaligned {
                base: base.as_ptr() as usize,
            });
        }
        Ok(Self { base, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Carve a sub-window starting at `offset`
    pub fn subregion(&self, offset: usize, len: usize) -> Result<MmioRegion> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => {
                // SAFETY: the sub-window lies inside our own mapping.
                let base = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) };
                unsafe { MmioRegion::from_raw_parts(base, len) }
            }
            _ => Err(MmioError::OutOfRange {
                offset: offset as u64,
                len: self.len,
            }),
        }
    }

    fn register_ptr(&self, offset: u64) -> *mut u64 {
        assert!(
            offset % 8 == 0 && (offset as usize) + 8 <= self.len,
            "register offset 0x{offset:X} outside {} byte window",
            self.len
        );
        // SAFETY: bounds and alignment checked above.
        unsafe { self.base.as_ptr().add(offset as usize) as *mut u64 }
    }
}

impl RegisterWindow for MmioRegion {
    fn read64(&self, offset: u64) -> u64 {
        unsafe { std::ptr::read_volatile(self.register_ptr(offset)) }
    }

    fn write64(&self, offset: u64, value: u64) {
        unsafe { std::ptr::write_volatile(self.register_ptr(offset), value) }
    }
}

/// Poll a register until `cond` accepts its value or `timeout` elapses
///
/// The register is sampled once up front and then every `delay`, busy-waiting
/// in between. Returns the accepted value, or the last value read on timeout.
/// This never sleeps, so `timeout` must stay in the microsecond range.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use fmeperf_raw::read_poll_timeout;
///
/// let value = read_poll_timeout(
///     &window,
///     FAB_CNTR,
///     |v| FAB_CNTR_EVENT.get(v) == event,
///     Duration::from_micros(1),
///     Duration::from_micros(30),
/// );
/// ```
pub fn read_poll_timeout<W, F>(
    window: &W,
    offset: u64,
    mut cond: F,
    delay: Duration,
    timeout: Duration,
) -> std::result::Result<u64, u64>
where
    W: RegisterWindow + ?Sized,
    F: FnMut(u64) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let value = window.read64(offset);
        if cond(value) {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            // One last sample so a value that settled during the final
            // delay is not reported as a timeout.
            let value = window.read64(offset);
            return if cond(value) { Ok(value) } else { Err(value) };
        }
        let next = Instant::now() + delay;
        while Instant::now() < next {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Backing {
        words: Vec<u64>,
    }

    impl Backing {
        fn region(&mut self) -> MmioRegion {
            let base = NonNull::new(self.words.as_mut_ptr() as *mut u8).unwrap();
            unsafe { MmioRegion::from_raw_parts(base, self.words.len() * 8).unwrap() }
        }
    }

    struct CountingWindow {
        reads: AtomicU64,
        settle_after: u64,
    }

    impl RegisterWindow for CountingWindow {
        fn read64(&self, _offset: u64) -> u64 {
            self.reads.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn write64(&self, _offset: u64, _value: u64) {}
    }

    #[test]
    fn test_region_read_write() {
        let mut backing = Backing { words: vec![0; 4] };
        let region = backing.region();
        region.write64(0x8, 0xDEAD_BEEF);
        assert_eq!(region.read64(0x8), 0xDEAD_BEEF);
        assert_eq!(region.read64(0x0), 0);
    }

    #[test]
    fn test_subregion_bounds() {
        let mut backing = Backing { words: vec![0; 4] };
        let region = backing.region();
        assert!(region.subregion(8, 16).is_ok());
        assert!(matches!(
            region.subregion(24, 16),
            Err(MmioError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_poll_settles() {
        let window = CountingWindow {
            reads: AtomicU64::new(0),
            settle_after: 3,
        };
        let result = read_poll_timeout(
            &window,
            0,
            |v| v >= window.settle_after,
            Duration::from_micros(1),
            Duration::from_millis(50),
        );
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_poll_times_out() {
        let window = CountingWindow {
            reads: AtomicU64::new(0),
            settle_after: u64::MAX,
        };
        let result = read_poll_timeout(
            &window,
            0,
            |_| false,
            Duration::from_micros(1),
            Duration::from_micros(30),
        );
        assert!(result.is_err());
    }
}
