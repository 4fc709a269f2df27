//! Interrupt handling module
//!
//! Hardware IRQ numbering, the [`chip::IrqChip`] capability interface, the
//! handler table the physical interrupt path dispatches through, and the
//! per-vCPU virtual interrupt state.

pub mod chip;
pub mod desc;
pub mod virq;

/// Flat hardware interrupt number
///
/// `[0, 16)` SGIs, `[16, 32)` PPIs, `[32, ..)` SPIs.
pub type HwIrq = u32;

/// Number of software generated interrupt ids
pub const NR_SGIS: u32 = 16;

/// First per-core peripheral interrupt id
pub const PPI_BASE: HwIrq = 16;

/// First shared peripheral interrupt id
pub const SPI_BASE: HwIrq = 32;

/// Which range a hardware id falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqClass {
    /// Software generated (inter-core signal)
    Sgi,
    /// Per-core peripheral
    Ppi,
    /// Shared peripheral
    Spi,
}

impl IrqClass {
    /// Classify `irq`
    pub const fn of(irq: HwIrq) -> Self {
        if irq < PPI_BASE {
            IrqClass::Sgi
        } else if irq < SPI_BASE {
            IrqClass::Ppi
        } else {
            IrqClass::Spi
        }
    }
}

/// Targets of a software generated interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgiMode {
    /// Every core in the mask except the sender
    ToOthers,
    /// Only the sending core
    ToSelf,
    /// Every core in the mask
    ToList,
}

/// Interrupt trigger type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqTrigger {
    /// Level sensitive
    Level,
    /// Edge triggered
    Edge,
}

/// Set of physical cores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuMask(u32);

impl CpuMask {
    /// Empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The first `nr_cpus` cores
    pub const fn first(nr_cpus: usize) -> Self {
        if nr_cpus >= 32 {
            Self(u32::MAX)
        } else {
            Self((1 << nr_cpus) - 1)
        }
    }

    /// Set containing only `cpu`
    pub const fn single(cpu: usize) -> Self {
        Self(1 << cpu)
    }

    /// Add `cpu` to the set
    pub fn set(&mut self, cpu: usize) {
        self.0 |= 1 << cpu;
    }

    /// Whether `cpu` is in the set
    pub const fn contains(&self, cpu: usize) -> bool {
        self.0 & (1 << cpu) != 0
    }

    /// Whether the set is empty
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Cores in the set, lowest first
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..32).filter(move |&cpu| self.contains(cpu))
    }
}
