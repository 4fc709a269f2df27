//! Virtual CPU (VCPU) state used by the interrupt core

use alloc::sync::Arc;
use ::core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::arm64::HcrFlags;
use crate::core::irq::virq::VirqStruct;
use crate::core::vmm::vm::Vm;

/// VCPU identifier
pub type VcpuId = u32;

/// VCPU structure
pub struct Vcpu {
    /// VCPU ID
    id: VcpuId,
    /// Owning VM
    vm: Arc<Vm>,
    /// Saved HCR_EL2, loaded on every guest entry
    hcr: AtomicU64,
    /// Virtual interrupt state
    virq: VirqStruct,
}

impl Vcpu {
    /// Create VCPU `id` of `vm`
    pub fn new(id: VcpuId, vm: Arc<Vm>) -> Self {
        Self {
            id,
            vm,
            hcr: AtomicU64::new((HcrFlags::IMO | HcrFlags::FMO).bits()),
            virq: VirqStruct::new(),
        }
    }

    /// VCPU ID
    pub fn id(&self) -> VcpuId {
        self.id
    }

    /// Owning VM
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Virtual interrupt state
    pub fn virq_struct(&self) -> &VirqStruct {
        &self.virq
    }

    /// Saved HCR_EL2 value
    pub fn hcr(&self) -> HcrFlags {
        HcrFlags::from_bits_retain(self.hcr.load(Ordering::Acquire))
    }

    /// Assert the "virtual interrupt present" bit (HCR_EL2.VI)
    pub fn set_virq_flag(&self) {
        self.hcr.fetch_or(HcrFlags::VI.bits(), Ordering::AcqRel);
    }

    /// Deassert the "virtual interrupt present" bit (HCR_EL2.VI)
    pub fn clear_virq_flag(&self) {
        self.hcr.fetch_and(!HcrFlags::VI.bits(), Ordering::AcqRel);
    }

    /// Whether HCR_EL2.VI is set in the saved context
    pub fn virq_flag(&self) -> bool {
        self.hcr().contains(HcrFlags::VI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virq_flag() {
        let vcpu = Vcpu::new(0, Arc::new(Vm::native(1, "linux")));
        assert!(!vcpu.virq_flag());
        assert!(vcpu.hcr().contains(HcrFlags::IMO));

        vcpu.set_virq_flag();
        assert!(vcpu.virq_flag());
        vcpu.clear_virq_flag();
        assert!(!vcpu.virq_flag());
        assert!(vcpu.hcr().contains(HcrFlags::IMO | HcrFlags::FMO));
    }

    #[test]
    fn test_owning_vm() {
        let vcpu = Vcpu::new(3, Arc::new(Vm::translated(2, "rtos")));
        assert_eq!(vcpu.id(), 3);
        assert!(!vcpu.vm().is_native());
        assert_eq!(vcpu.vm().name(), "rtos");
    }
}
