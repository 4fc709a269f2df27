//! Platform interrupt configuration
//!
//! Static description of the interrupt hardware handed over by platform
//! bring-up: controller base addresses, window sizes and the hardware IRQ
//! ranges the generic layer may hand out.

use ::core::ops::Range;

use crate::{Error, Result};

/// Compatible string the BCM2836 composite chip registers under
pub const BCM2836_COMPATIBLE: &str = "brcm,bcm2836-l1-intc";

/// Interrupt hardware description for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIrqConfig {
    /// Compatible string used for the chip registry lookup
    pub compatible: &'static str,
    /// Physical base of the per-core local controller
    pub local_base: usize,
    /// Size of the local controller window
    pub local_size: usize,
    /// Physical base of the banked (ARMCTRL) controller
    pub armctrl_base: usize,
    /// Size of the banked controller window
    pub armctrl_size: usize,
    /// Number of physical cores
    pub nr_cpus: usize,
    /// Software generated interrupt ids
    pub sgi: Range<u32>,
    /// Per-core peripheral interrupt ids
    pub ppi: Range<u32>,
    /// Shared peripheral interrupt ids
    pub spi: Range<u32>,
}

impl Default for PlatformIrqConfig {
    /// Raspberry Pi 3 (BCM2837, BCM2836-compatible interrupt layout)
    fn default() -> Self {
        Self {
            compatible: BCM2836_COMPATIBLE,
            local_base: 0x4000_0000,
            local_size: 0x100,
            armctrl_base: 0x3f00_b200,
            armctrl_size: 0x100,
            nr_cpus: 4,
            sgi: 0..16,
            ppi: 16..32,
            spi: 32..128,
        }
    }
}

impl PlatformIrqConfig {
    /// Total number of hardware ids covered by the three ranges
    pub fn nr_irqs(&self) -> u32 {
        self.spi.end
    }

    /// Check that the ranges are ordered, disjoint and contiguous
    pub fn validate(&self) -> Result<()> {
        if self.nr_cpus == 0 || self.nr_cpus > crate::arch::arm64::MAX_CPUS {
            return Err(Error::InvalidArgument);
        }

        if self.local_size == 0 || self.armctrl_size == 0 {
            return Err(Error::InvalidArgument);
        }

        let ranges = [&self.sgi, &self.ppi, &self.spi];
        if ranges.iter().any(|r| r.is_empty()) || self.sgi.start != 0 {
            return Err(Error::InvalidArgument);
        }

        if self.sgi.end != self.ppi.start || self.ppi.end != self.spi.start {
            return Err(Error::InvalidArgument);
        }

        Ok(())
    }
}
