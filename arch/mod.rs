//! Architecture support
//!
//! Only the ARM64 port exists. Its system-register accessors fall back to
//! portable stand-ins off target so the interrupt core can be unit tested
//! on the build host.

pub mod arm64;
