//! Bcmvisor - interrupt virtualization core for BCM2836-class boards
//!
//! This library multiplexes the BCM2835 banked interrupt controller and the
//! BCM2836 per-core local controller between the hypervisor and its guests,
//! and injects virtual interrupts into a vCPU when it re-enters the guest.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Core modules
pub mod utils;
pub mod config;

// Architecture-specific code
pub mod arch;

// Core hypervisor modules
pub mod core;

pub use crate::core::irq::chip::{IrqChip, NativeVirqPort};
pub use crate::core::irq::{CpuMask, HwIrq, SgiMode};
pub use crate::core::irq::virq::{VirqAction, VirqDesc, VirqState, VirqStruct};
pub use crate::core::vmm::{Vcpu, Vm};

/// Bcmvisor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bring up the interrupt core for the platform described by `config`.
///
/// Looks up the chip registered for `config.compatible`, probes it and
/// installs it as the platform chip. Returns the descriptor table the
/// generic IRQ layer dispatches through.
///
/// # Safety
/// Both controller windows named by `config` must already be mapped as
/// device memory at their physical addresses.
pub unsafe fn init(
    config: &config::PlatformIrqConfig,
) -> Result<crate::core::irq::desc::IrqDescTable> {
    config.validate()?;

    let chip = unsafe { crate::core::irq::chip::probe(config)? };
    crate::core::irq::chip::install(chip)?;

    log::info!("Bcmvisor v{} interrupt core initialized", VERSION);

    Ok(crate::core::irq::desc::IrqDescTable::new(config))
}

/// Common error type for Bcmvisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    InvalidArgument,
    /// Not found
    NotFound,
    /// Resource busy
    ResourceBusy,
    /// Not initialized
    NotInitialized,
    /// Invalid state
    InvalidState,
    /// Fixed-capacity container is full
    NoSpace,
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;
