//! Virtual Machine (VM) descriptor
//!
//! Only what the interrupt core needs to know about a VM.

/// VM identifier
pub type VmId = u32;

/// VM structure
#[derive(Debug)]
pub struct Vm {
    /// Unique VM ID
    id: VmId,
    /// VM name
    name: &'static str,
    /// Whether the guest drives the BCM2836 interrupt model directly
    native: bool,
}

impl Vm {
    /// Create a VM that uses the BCM2836-shaped interrupt model directly
    pub const fn native(id: VmId, name: &'static str) -> Self {
        Self {
            id,
            name,
            native: true,
        }
    }

    /// Create a VM whose interrupts go through an emulated GIC
    pub const fn translated(id: VmId, name: &'static str) -> Self {
        Self {
            id,
            name,
            native: false,
        }
    }

    /// VM ID
    pub fn id(&self) -> VmId {
        self.id
    }

    /// VM name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the guest uses the physical controller's interrupt model
    pub fn is_native(&self) -> bool {
        self.native
    }
}
