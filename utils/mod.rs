//! Utility functions and data structures
//!
//! This module contains the logger, the MMIO accessor and the memory
//! barriers used throughout the interrupt core.

pub mod log;
pub mod mmio;

pub use self::mmio::{MmioRegion, RegisterIo};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        use aarch64_cpu::asm::barrier;

        /// Data synchronization barrier (full system)
        ///
        /// Returns only after every outstanding memory access, including
        /// device writes to the interrupt controllers, has completed.
        #[inline]
        pub fn dsb() {
            barrier::dsb(barrier::SY);
        }
    } else {
        use ::core::sync::atomic::{fence, Ordering};

        /// Data synchronization barrier (full system)
        #[inline]
        pub fn dsb() {
            fence(Ordering::SeqCst);
        }
    }
}

/// Bit value helper, `BIT(n)` in register manuals
#[inline]
pub const fn bit(n: u32) -> u32 {
    1 << n
}

/// Index of the lowest set bit; `None` when `value` is zero.
///
/// Lowest index wins everywhere a pending word is decoded, so this doubles
/// as the interrupt tie-break rule.
#[inline]
pub const fn lowest_set_bit(value: u32) -> Option<u32> {
    if value == 0 {
        None
    } else {
        Some(value.trailing_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_set_bit() {
        assert_eq!(lowest_set_bit(0), None);
        assert_eq!(lowest_set_bit(1), Some(0));
        assert_eq!(lowest_set_bit(0b1010_0000), Some(5));
        assert_eq!(lowest_set_bit(0x8000_0000), Some(31));
    }

    #[test]
    fn test_bit() {
        assert_eq!(bit(0), 1);
        assert_eq!(bit(9), 0x200);
    }
}
