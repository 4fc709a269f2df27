//! Synchronization primitives
//!
//! This module provides synchronization primitives suitable for
//! use in the hypervisor kernel environment.

pub mod spinlock;

// Re-export SpinLock for convenience
pub use spinlock::{IrqSaveGuard, SpinLock, SpinLockGuard};
