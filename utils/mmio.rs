//! Memory-mapped register access
//!
//! Every controller register access in the crate funnels through
//! [`RegisterIo`]. [`MmioRegion`] is the real implementation over a mapped
//! device window; the register-level simulator used by the tests is the
//! other one.

use ::core::ptr::NonNull;
use volatile::VolatilePtr;

/// 32-bit register window addressed by byte offset
pub trait RegisterIo: Send + Sync {
    /// Read the register at `offset`
    fn read32(&self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`
    ///
    /// The write is relaxed: callers that need the device to observe it
    /// before continuing issue [`crate::utils::dsb`] themselves.
    fn write32(&self, offset: usize, value: u32);

    /// Read-modify-write setting `bits`
    fn set_bits32(&self, offset: usize, bits: u32) {
        let value = self.read32(offset);
        self.write32(offset, value | bits);
    }

    /// Read-modify-write clearing `bits`
    fn clear_bits32(&self, offset: usize, bits: u32) {
        let value = self.read32(offset);
        self.write32(offset, value & !bits);
    }
}

/// A mapped MMIO window
#[derive(Debug)]
pub struct MmioRegion {
    /// Virtual address of the first register
    base: NonNull<u32>,
    /// Window size in bytes
    size: usize,
}

// Registers are accessed with volatile loads/stores only; sharing the
// window between cores is how the hardware is meant to be used.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Create a region for the window at `base`
    ///
    /// # Safety
    /// `base..base + size` must be mapped device memory that stays mapped
    /// for the lifetime of the region, and `base` must be 4-byte aligned.
    pub unsafe fn new(base: usize, size: usize) -> Self {
        Self {
            base: unsafe { NonNull::new_unchecked(base as *mut u32) },
            size,
        }
    }

    /// Base address of the window
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Size of the window in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    fn reg(&self, offset: usize) -> VolatilePtr<'_, u32> {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.size);
        // SAFETY: in bounds of the window promised mapped by `new`.
        unsafe {
            let ptr = (self.base.as_ptr() as *mut u8).add(offset) as *mut u32;
            VolatilePtr::new(NonNull::new_unchecked(ptr))
        }
    }
}

impl RegisterIo for MmioRegion {
    fn read32(&self, offset: usize) -> u32 {
        self.reg(offset).read()
    }

    fn write32(&self, offset: usize, value: u32) {
        self.reg(offset).write(value)
    }
}
