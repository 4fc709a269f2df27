//! Core hypervisor modules
//!
//! Interrupt handling, the minimal VM/vCPU model the virq layer hangs off,
//! and synchronization primitives.

pub mod irq;
pub mod sync;
pub mod vmm;
