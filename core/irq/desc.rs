//! Hardware IRQ descriptor table
//!
//! The table the physical interrupt path dispatches through. Each hardware
//! id inside the platform's SGI/PPI/SPI ranges may carry one action: a host
//! handler, or a vCPU that owns the line and receives it as a virq.

use alloc::sync::Arc;
use alloc::vec::Vec;
use ::core::ops::Range;

use crate::config::PlatformIrqConfig;
use crate::core::irq::chip::IrqChip;
use crate::core::irq::{HwIrq, IrqClass, SPI_BASE};
use crate::core::sync::SpinLock;
use crate::core::vmm::Vcpu;
use crate::{Error, Result};

/// Host interrupt handler
pub type IrqHandlerFn = fn(irq: HwIrq, data: usize) -> Result<()>;

/// What happens when a hardware id fires
#[derive(Clone)]
pub enum IrqAction {
    /// Run a hypervisor handler
    Host {
        /// Handler function
        handler: IrqHandlerFn,
        /// Opaque handler argument
        data: usize,
    },
    /// Raise virq `vno` on `vcpu`
    Vcpu {
        /// Owning vCPU
        vcpu: Arc<Vcpu>,
        /// Virtual number the line is delivered as
        vno: u32,
    },
}

/// Interrupt descriptor
#[derive(Clone)]
pub struct IrqDesc {
    /// Name for diagnostics
    pub name: &'static str,
    /// Action run on dispatch
    pub action: IrqAction,
}

/// IRQ statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqStats {
    /// Interrupts dispatched to a registered action
    pub handled: u64,
    /// Of those, lines forwarded to a vCPU
    pub forwarded: u64,
    /// Interrupts with no registered action
    pub spurious: u64,
}

/// Hardware id -> action table
pub struct IrqDescTable {
    sgi: Range<HwIrq>,
    ppi: Range<HwIrq>,
    spi: Range<HwIrq>,
    descs: SpinLock<Vec<Option<IrqDesc>>>,
    stats: SpinLock<IrqStats>,
}

impl IrqDescTable {
    /// Create an empty table covering the ranges of `config`
    pub fn new(config: &PlatformIrqConfig) -> Self {
        let mut descs = Vec::new();
        descs.resize(config.nr_irqs() as usize, None);

        Self {
            sgi: config.sgi.clone(),
            ppi: config.ppi.clone(),
            spi: config.spi.clone(),
            descs: SpinLock::new(descs),
            stats: SpinLock::new(IrqStats::default()),
        }
    }

    /// Whether `irq` was allocated to one of the platform ranges
    pub fn is_allocated(&self, irq: HwIrq) -> bool {
        match IrqClass::of(irq) {
            IrqClass::Sgi => self.sgi.contains(&irq),
            IrqClass::Ppi => self.ppi.contains(&irq),
            IrqClass::Spi => self.spi.contains(&irq),
        }
    }

    fn install(&self, irq: HwIrq, desc: IrqDesc) -> Result<()> {
        if !self.is_allocated(irq) {
            return Err(Error::InvalidArgument);
        }

        let mut descs = self.descs.lock_irqsave();
        let slot = descs
            .get_mut(irq as usize)
            .ok_or(Error::InvalidArgument)?;
        if slot.is_some() {
            return Err(Error::ResourceBusy);
        }

        *slot = Some(desc);
        Ok(())
    }

    /// Register a host handler for `irq`
    pub fn request_irq(
        &self,
        irq: HwIrq,
        handler: IrqHandlerFn,
        data: usize,
        name: &'static str,
    ) -> Result<()> {
        self.install(
            irq,
            IrqDesc {
                name,
                action: IrqAction::Host { handler, data },
            },
        )?;

        log::debug!("irq {} requested by {}", irq, name);
        Ok(())
    }

    /// Hand `irq` to `vcpu`, delivered as virq `vno`
    ///
    /// The virq is bound to the hardware line so guest completion re-arms
    /// it.
    pub fn request_vcpu_irq(&self, irq: HwIrq, vcpu: Arc<Vcpu>, vno: u32) -> Result<()> {
        vcpu.virq_struct().bind_hw(vno, irq)?;

        let vcpu_id = vcpu.id();
        self.install(
            irq,
            IrqDesc {
                name: "vcpu",
                action: IrqAction::Vcpu { vcpu, vno },
            },
        )?;

        log::debug!("irq {} forwarded to vcpu {} as virq {}", irq, vcpu_id, vno);
        Ok(())
    }

    /// Remove the action registered for `irq`
    pub fn free_irq(&self, irq: HwIrq) -> Result<()> {
        let mut descs = self.descs.lock_irqsave();
        let slot = descs
            .get_mut(irq as usize)
            .ok_or(Error::InvalidArgument)?;

        slot.take().map(|_| ()).ok_or(Error::NotFound)
    }

    /// Descriptor registered for `irq`
    pub fn get(&self, irq: HwIrq) -> Option<IrqDesc> {
        self.descs.lock_irqsave().get(irq as usize).cloned().flatten()
    }

    /// Dispatch one hardware interrupt
    ///
    /// An id without an action is masked so it cannot storm. A banked line
    /// owned by a vCPU is masked after its virq is raised and stays masked
    /// until the guest completes it; per-core lines stay enabled.
    pub fn handle_irq(&self, chip: &dyn IrqChip, irq: HwIrq) {
        let Some(desc) = self.get(irq) else {
            log::error!("no handler for irq {}, masking it", irq);
            chip.mask(irq);
            self.stats.lock_irqsave().spurious += 1;
            return;
        };

        match desc.action {
            IrqAction::Host { handler, data } => {
                if let Err(e) = handler(irq, data) {
                    log::warn!("irq {} handler {} failed: {:?}", irq, desc.name, e);
                }
                self.stats.lock_irqsave().handled += 1;
            }
            IrqAction::Vcpu { vcpu, vno } => {
                if let Err(e) = vcpu.virq_struct().raise(vno) {
                    log::warn!(
                        "irq {}: raising virq {} on vcpu {} failed: {:?}",
                        irq,
                        vno,
                        vcpu.id(),
                        e
                    );
                }
                // Banked lines stay masked until the guest completes the
                // virq. Per-core sources are left to the guest's own
                // device state.
                if irq >= SPI_BASE {
                    chip.mask(irq);
                }

                let mut stats = self.stats.lock_irqsave();
                stats.handled += 1;
                stats.forwarded += 1;
            }
        }
    }

    /// Drain every interrupt pending on this core
    ///
    /// Returns the number of interrupts dispatched.
    pub fn handle_pending(&self, chip: &dyn IrqChip) -> usize {
        let mut count = 0;
        while let Some(irq) = chip.get_pending() {
            self.handle_irq(chip, irq);
            count += 1;
        }
        count
    }

    /// IRQ statistics
    pub fn stats(&self) -> IrqStats {
        *self.stats.lock_irqsave()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::arm64::interrupt::sim::BcmSim;
    use crate::core::irq::virq::VirqState;
    use crate::core::vmm::{self, Vm};
    use ::core::sync::atomic::{AtomicUsize, Ordering};

    static TICKS: AtomicUsize = AtomicUsize::new(0);

    fn tick(_irq: HwIrq, data: usize) -> Result<()> {
        TICKS.fetch_add(data, Ordering::SeqCst);
        Ok(())
    }

    fn table() -> IrqDescTable {
        IrqDescTable::new(&PlatformIrqConfig::default())
    }

    #[test]
    fn test_request_inside_ranges_only() {
        let table = table();
        assert_eq!(table.request_irq(27, tick, 0, "local-timer"), Ok(()));
        assert_eq!(table.request_irq(27, tick, 0, "again"), Err(Error::ResourceBusy));
        assert_eq!(table.request_irq(128, tick, 0, "oob"), Err(Error::InvalidArgument));

        assert_eq!(table.free_irq(27), Ok(()));
        assert_eq!(table.free_irq(27), Err(Error::NotFound));
    }

    #[test]
    fn test_narrow_spi_range() {
        let config = PlatformIrqConfig {
            spi: 32..64,
            ..PlatformIrqConfig::default()
        };
        let table = IrqDescTable::new(&config);
        assert!(table.is_allocated(63));
        assert!(!table.is_allocated(64));
        assert_eq!(table.request_irq(70, tick, 0, "uart"), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_host_handler_dispatch() {
        let (sim, chip) = BcmSim::chip(4);
        let table = table();
        table.request_irq(19, tick, 5, "cntv").unwrap();

        chip.unmask(19);
        sim.raise_timer(0, 3);
        // The line is level triggered; handle one event and drop the source.
        assert_eq!(chip.get_pending(), Some(19));
        table.handle_irq(&chip, 19);
        sim.lower_timer(0, 3);

        assert_eq!(TICKS.load(Ordering::SeqCst), 5);
        assert_eq!(table.stats().handled, 1);
        assert_eq!(table.handle_pending(&chip), 0);
    }

    #[test]
    fn test_unregistered_line_is_masked() {
        let (sim, chip) = BcmSim::chip(4);
        let table = table();

        chip.unmask(57);
        sim.raise_spi(57);
        assert_eq!(table.handle_pending(&chip), 1);

        assert_eq!(table.stats().spurious, 1);
        assert_eq!(sim.enabled(1) & (1 << 25), 0);
        assert_eq!(chip.get_pending(), None);
    }

    #[test]
    fn test_vcpu_line_forwarded_and_rearmed() {
        let (sim, chip) = BcmSim::chip(4);
        let table = table();
        let vcpu = Arc::new(Vcpu::new(0, Arc::new(Vm::translated(1, "guest"))));
        table.request_vcpu_irq(57, vcpu.clone(), 57).unwrap();

        chip.unmask(57);
        sim.raise_spi(57);
        assert_eq!(table.handle_pending(&chip), 1);

        // Masked until the guest completes the virq.
        assert_eq!(sim.enabled(1) & (1 << 25), 0);
        assert_eq!(table.stats().forwarded, 1);
        assert_eq!(vcpu.virq_struct().desc(57).unwrap().state(), VirqState::Pending);

        chip.enter_to_guest(&vcpu).unwrap();
        vcpu.virq_struct().lock().activate_pending_front().unwrap();
        vmm::complete_virq(&chip, &vcpu, 57).unwrap();

        assert_ne!(sim.enabled(1) & (1 << 25), 0);
        assert!(vcpu.virq_struct().lock().is_idle());
    }

    #[test]
    fn test_vcpu_local_timer_fires_again_after_completion() {
        let (sim, chip) = BcmSim::chip(4);
        let table = table();
        let vcpu = Arc::new(Vcpu::new(0, Arc::new(Vm::translated(1, "guest"))));
        table.request_vcpu_irq(19, vcpu.clone(), 19).unwrap();

        chip.unmask(19);
        sim.raise_timer(0, 3);
        assert_eq!(chip.get_pending(), Some(19));
        table.handle_irq(&chip, 19);
        sim.lower_timer(0, 3);

        assert_eq!(sim.timer_int_control(0) & (1 << 3), 1 << 3);
        assert_eq!(table.stats().forwarded, 1);

        vcpu.virq_struct().lock().activate_pending_front().unwrap();
        vmm::complete_virq(&chip, &vcpu, 19).unwrap();
        assert!(vcpu.virq_struct().lock().is_idle());

        sim.raise_timer(0, 3);
        assert_eq!(chip.get_pending(), Some(19));
        table.handle_irq(&chip, 19);
        assert_eq!(vcpu.virq_struct().desc(19).unwrap().state(), VirqState::Pending);
    }
}
