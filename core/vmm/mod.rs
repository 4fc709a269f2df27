//! Virtual machine manager glue
//!
//! The VM/VCPU object model proper lives outside the interrupt core. This
//! module keeps the parts the core hangs off: the VM and VCPU descriptors,
//! the transition hooks, and the two calls the VCPU run loop makes into the
//! interrupt layer.

pub mod hook;
pub mod vcpu;
pub mod vm;

pub use hook::{HookTable, HookType, VcpuHook};
pub use vcpu::{Vcpu, VcpuId};
pub use vm::{Vm, VmId};

use crate::arch::arm64::cpu;
use crate::core::irq::chip::IrqChip;
use crate::core::irq::virq::VirqAction;
use crate::Result;

/// Prepare `vcpu` to resume guest execution on this core
///
/// Runs the enter-to-guest hooks (virq injection among them) and then
/// drives the core's virtual IRQ line from the VCPU's saved HCR_EL2.
pub fn enter_guest(hooks: &HookTable, vcpu: &Vcpu) -> Result<()> {
    hooks.run(HookType::EnterToGuest, vcpu)?;
    cpu::set_virq_line(vcpu.virq_flag());
    Ok(())
}

/// The guest finished servicing virq `vno`
///
/// Retires the descriptor and lets the chip re-arm a bound hardware line.
pub fn complete_virq(chip: &dyn IrqChip, vcpu: &Vcpu, vno: u32) -> Result<()> {
    let desc = vcpu.virq_struct().retire(vno)?;
    log::trace!("vcpu {} completed virq {}", vcpu.id(), vno);
    chip.update_virq(vcpu, &desc, VirqAction::Clear)
}
