//! Generic register abstractions for type-safe MMIO programming

/// A contiguous bit field inside a 64-bit register
///
/// `BitField::new(19, 16)` describes bits 16 through 19 inclusive, the same
/// way the hardware documentation writes `[19:16]`.
///
/// # Example
///
/// ```
/// use fmeperf_raw::BitField;
///
/// const EVENT: BitField = BitField::new(19, 16);
///
/// let value = EVENT.prep(0xa);
/// assert_eq!(value, 0xa_0000);
/// assert_eq!(EVENT.get(value), 0xa);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    shift: u32,
    width: u32,
}

impl BitField {
    /// Field covering bits `low..=high`
    pub const fn new(high: u32, low: u32) -> Self {
        assert!(high >= low && high < 64);
        Self {
            shift: low,
            width: high - low + 1,
        }
    }

    /// Single-bit field
    pub const fn bit(bit: u32) -> Self {
        Self::new(bit, bit)
    }

    /// In-place mask of the field
    pub const fn mask(&self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            ((1u64 << self.width) - 1) << self.shift
        }
    }

    /// Largest value the field can hold
    pub const fn max(&self) -> u64 {
        self.mask() >> self.shift
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Extract the field from a register value
    pub const fn get(&self, reg: u64) -> u64 {
        (reg & self.mask()) >> self.shift
    }

    /// Extract a single-bit field as a flag
    pub const fn is_set(&self, reg: u64) -> bool {
        self.get(reg) != 0
    }

    /// Shift `value` into position, truncating bits that do not fit
    pub const fn prep(&self, value: u64) -> u64 {
        (value << self.shift) & self.mask()
    }

    /// Replace the field inside `reg` with `value`
    pub const fn replace(&self, reg: u64, value: u64) -> u64 {
        (reg & !self.mask()) | self.prep(value)
    }
}

/// Trait for register layouts that can be converted to/from raw register values
///
/// This trait provides type-safe conversion between structured register
/// layouts and the raw 64-bit values that are written to/read from the
/// feature's MMIO window.
///
/// # Example
///
/// ```ignore
/// use fmeperf_raw::register::{BitField, RegisterLayout};
///
/// const ENABLE: BitField = BitField::bit(0);
/// const THRESHOLD: BitField = BitField::new(15, 8);
///
/// #[derive(Debug, Default)]
/// struct MyControl {
///     enable: bool,
///     threshold: u8,
/// }
///
/// impl RegisterLayout for MyControl {
///     fn to_reg_value(&self) -> u64 {
///         ENABLE.prep(self.enable as u64) | THRESHOLD.prep(self.threshold as u64)
///     }
///
///     fn from_reg_value(value: u64) -> Self {
///         Self {
///             enable: ENABLE.is_set(value),
///             threshold: THRESHOLD.get(value) as u8,
///         }
///     }
/// }
/// ```
pub trait RegisterLayout: Sized {
    /// Convert this register layout to a raw register value
    fn to_reg_value(&self) -> u64;

    /// Parse a raw register value into this register layout
    fn from_reg_value(value: u64) -> Self;

    /// Validate that the register values are within acceptable ranges
    ///
    /// Returns `Ok(())` if valid, or an error message if invalid.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitfield_masks() {
        assert_eq!(BitField::new(19, 16).mask(), 0x000F_0000);
        assert_eq!(BitField::new(47, 0).mask(), 0x0000_FFFF_FFFF_FFFF);
        assert_eq!(BitField::new(63, 60).mask(), 0xF000_0000_0000_0000);
        assert_eq!(BitField::new(63, 0).mask(), u64::MAX);
        assert_eq!(BitField::bit(23).mask(), 1 << 23);
    }

    #[test]
    fn test_bitfield_replace_keeps_other_bits() {
        let field = BitField::new(19, 16);
        let reg = 0xFFFF_FFFF_FFFF_FFFF;
        assert_eq!(field.replace(reg, 0x3), 0xFFFF_FFFF_FFF3_FFFF);
    }

    #[test]
    fn test_bitfield_prep_truncates() {
        let field = BitField::new(21, 20);
        assert_eq!(field.prep(0x7), 0x3 << 20);
        assert_eq!(field.max(), 0x3);
    }
}
