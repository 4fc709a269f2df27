//! ARM64 (AArch64) Architecture Support for Bcmvisor
//!
//! This module provides the pieces of the ARM64 port the interrupt core
//! depends on:
//! - CPU identification, DAIF save/restore and the HCR_EL2 virtual IRQ line
//! - The BCM2835/BCM2836 interrupt controller drivers
//!
//! ## References
//! - [ARM Architecture Reference Manual ARMv8-A](https://developer.arm.com/documentation/ddi0487/latest)
//! - BCM2835 ARM Peripherals, chapter 7 (interrupt controller)
//! - BCM2836 ARM-local peripherals (QA7 rev 3.4)

pub mod cpu;
pub mod interrupt;

pub use cpu::{current_cpu_id, HcrFlags};

/// Maximum number of CPUs the BCM2836 local controller has register slots for
pub const MAX_CPUS: usize = 4;
