//! Interrupt chip interface and registry
//!
//! Every platform interrupt controller implements [`IrqChip`]. Chips are
//! declared in a static table keyed by device-tree compatible string;
//! platform bring-up probes the matching entry once and installs the
//! result as the platform chip.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::arch::arm64::interrupt::bcm2836;
use crate::config::{PlatformIrqConfig, BCM2836_COMPATIBLE};
use crate::core::irq::virq::{VirqAction, VirqDesc, VirqState};
use crate::core::irq::{CpuMask, HwIrq, IrqTrigger, SgiMode};
use crate::core::sync::SpinLock;
use crate::core::vmm::hook::{self, HookType};
use crate::core::vmm::Vcpu;
use crate::{Error, Result};

/// Delivery path into the emulated controller a native guest sees
///
/// Native guests program a BCM2836-shaped virtual controller; raising a
/// virq for them means making it visible there. Called with the vCPU's
/// virq lock held, so implementations must not touch its virq state.
pub trait NativeVirqPort: Send + Sync {
    /// Make virq `vno` visible to `vcpu`
    fn send_virq(&self, vcpu: &Vcpu, vno: u32) -> Result<()>;
}

/// Interrupt controller operations
pub trait IrqChip: Send + Sync {
    /// Chip name for diagnostics
    fn name(&self) -> &'static str;

    /// Mask `irq` on the calling core
    fn mask(&self, irq: HwIrq);

    /// Mask `irq` on core `cpu`
    fn mask_for_core(&self, irq: HwIrq, cpu: usize);

    /// Unmask `irq` on the calling core
    fn unmask(&self, irq: HwIrq);

    /// Unmask `irq` on core `cpu`
    fn unmask_for_core(&self, irq: HwIrq, cpu: usize);

    /// Signal end of interrupt for `irq`
    fn end_of_interrupt(&self, irq: HwIrq);

    /// Deactivate `irq` (re-arm a level-triggered line)
    fn direct_irq(&self, irq: HwIrq);

    /// Configure the trigger type of `irq`
    fn set_type(&self, irq: HwIrq, trigger: IrqTrigger) -> Result<()>;

    /// Configure the priority of `irq`
    fn set_priority(&self, irq: HwIrq, priority: u32) -> Result<()>;

    /// Route `irq` to core `cpu`
    fn set_affinity(&self, irq: HwIrq, cpu: usize) -> Result<()>;

    /// Highest-precedence pending interrupt of the calling core
    fn get_pending(&self) -> Option<HwIrq>;

    /// Send software generated interrupt `sgi`
    fn send_sgi(&self, sgi: u32, mode: SgiMode, cpus: CpuMask);

    /// Hardware view of a virq
    fn get_virq_state(&self, vcpu: &Vcpu, virq: &VirqDesc) -> VirqState;

    /// Deliver `virq` to the guest running on `vcpu`
    fn send_virq(&self, vcpu: &Vcpu, virq: &VirqDesc) -> Result<()>;

    /// Apply a guest-side change of `virq` to the hardware
    fn update_virq(&self, vcpu: &Vcpu, virq: &VirqDesc, action: VirqAction) -> Result<()>;

    /// Number of virqs each vCPU supports on this chip
    fn virq_count(&self) -> usize;

    /// Guest-entry hook: inject pending virqs into `vcpu`
    fn enter_to_guest(&self, vcpu: &Vcpu) -> Result<()>;

    /// Per-core initialisation on secondary cores
    fn secondary_init(&self) -> Result<()> {
        Ok(())
    }

    /// Connect the emulated controller native guests use
    ///
    /// Chips without a native guest interrupt model ignore it.
    fn attach_native_port(&self, _port: Arc<dyn NativeVirqPort>) {}
}

/// Chip constructor stored in the registry
///
/// # Safety
/// The controller windows named by the configuration must be mapped.
pub type ProbeFn = unsafe fn(&PlatformIrqConfig) -> Result<Box<dyn IrqChip>>;

/// Registry entry
pub struct IrqChipEntry {
    /// Device-tree compatible string
    pub compatible: &'static str,
    /// Constructor
    pub probe: ProbeFn,
}

static IRQCHIPS: &[IrqChipEntry] = &[IrqChipEntry {
    compatible: BCM2836_COMPATIBLE,
    probe: bcm2836::probe,
}];

/// Find the registry entry for `compatible`
pub fn find(compatible: &str) -> Option<&'static IrqChipEntry> {
    IRQCHIPS.iter().find(|entry| entry.compatible == compatible)
}

/// Probe the chip registered for `config.compatible`
///
/// # Safety
/// See [`ProbeFn`].
pub unsafe fn probe(config: &PlatformIrqConfig) -> Result<Box<dyn IrqChip>> {
    let entry = find(config.compatible).ok_or_else(|| {
        log::error!("no irq chip registered for {}", config.compatible);
        Error::NotFound
    })?;

    unsafe { (entry.probe)(config) }
}

/// The platform chip, set once at boot
static PLATFORM_CHIP: SpinLock<Option<&'static dyn IrqChip>> = SpinLock::new(None);

/// Install `chip` as the platform chip
///
/// The chip lives for the rest of the system's lifetime. Its guest-entry
/// hook is registered in the global hook table. A second install fails
/// with [`Error::ResourceBusy`].
pub fn install(chip: Box<dyn IrqChip>) -> Result<&'static dyn IrqChip> {
    let mut slot = PLATFORM_CHIP.lock();
    if slot.is_some() {
        return Err(Error::ResourceBusy);
    }

    let chip: &'static dyn IrqChip = Box::leak(chip);
    hook::get().register(
        HookType::EnterToGuest,
        Box::new(move |vcpu: &Vcpu| chip.enter_to_guest(vcpu)),
    )?;

    *slot = Some(chip);
    log::info!("irq chip {} installed", chip.name());
    Ok(chip)
}

/// The platform chip, once installed
pub fn get() -> Option<&'static dyn IrqChip> {
    *PLATFORM_CHIP.lock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::arm64::interrupt::sim::BcmSim;

    #[test]
    fn test_registry_lookup() {
        let entry = find("brcm,bcm2836-l1-intc").unwrap();
        assert_eq!(entry.compatible, BCM2836_COMPATIBLE);
        assert!(find("arm,gic-400").is_none());
    }

    #[test]
    fn test_probe_unknown_compatible() {
        let config = PlatformIrqConfig {
            compatible: "arm,cortex-a15-gic",
            ..PlatformIrqConfig::default()
        };
        assert!(matches!(unsafe { probe(&config) }, Err(Error::NotFound)));
    }

    #[test]
    fn test_install_once() {
        let (_sim, chip) = BcmSim::chip(4);
        let installed = install(Box::new(chip)).unwrap();
        assert_eq!(installed.name(), "bcm2836");
        assert!(get().is_some());
        assert_eq!(hook::get().len(HookType::EnterToGuest), 1);

        let (_sim, again) = BcmSim::chip(4);
        assert!(matches!(install(Box::new(again)), Err(Error::ResourceBusy)));
    }
}
