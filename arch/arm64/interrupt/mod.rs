//! Interrupt controllers for ARM64 boards
//!
//! The BCM2836 composite chip: the per-core local controller in front of
//! the BCM2835 banked controller.

pub mod bcm2835;
pub mod bcm2836;

#[cfg(test)]
pub(crate) mod sim;

pub use bcm2835::Bcm2835Armctrl;
pub use bcm2836::{Bcm2836IrqChip, Bcm2836Local};
