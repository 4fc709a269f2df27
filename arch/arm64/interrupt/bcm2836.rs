//! BCM2836 interrupt controller driver
//!
//! The BCM2836 adds a per-core "ARM local" controller in front of the
//! BCM2835 banked controller. The local controller owns the core timers,
//! four mailboxes per core (mailbox 0 carries inter-core SGIs), the PMU
//! line, and the GPU line through which the whole banked controller
//! cascades.
//!
//! Hardware id layout:
//! - 0..16: SGIs, delivered through mailbox 0
//! - 16..32: local sources, `16 + <bit in the local pending register>`
//! - 32..: banked controller lines, `bank * 32 + bit`
//!
//! Reference: BCM2836 ARM-local peripherals (QA7 rev 3.4)

use alloc::boxed::Box;
use alloc::sync::Arc;

use super::bcm2835::Bcm2835Armctrl;
use crate::arch::arm64::cpu;
use crate::config::PlatformIrqConfig;
use crate::core::irq::chip::{IrqChip, NativeVirqPort};
use crate::core::irq::virq::{VirqAction, VirqDesc, VirqState, VIRQ_NR};
use crate::core::irq::{CpuMask, HwIrq, IrqTrigger, SgiMode, NR_SGIS, PPI_BASE, SPI_BASE};
use crate::core::sync::SpinLock;
use crate::core::vmm::Vcpu;
use crate::utils::{self, bit, lowest_set_bit, MmioRegion, RegisterIo};
use crate::{Error, Result};

/// Local controller register offsets
pub mod local {
    /// Control register (timer clock source and increment)
    pub const CONTROL: usize = 0x000;
    /// Core timer prescaler
    pub const PRESCALER: usize = 0x008;
    /// GPU interrupt routing
    pub const GPU_ROUTING: usize = 0x00c;
    /// PMU interrupt routing, write-1-to-set
    pub const PM_ROUTING_SET: usize = 0x010;
    /// PMU interrupt routing, write-1-to-clear
    pub const PM_ROUTING_CLR: usize = 0x014;
    /// Core 0 timers interrupt control, one word per core
    pub const TIMER_INT_CONTROL0: usize = 0x040;
    /// Core 0 mailboxes interrupt control, one word per core
    pub const MAILBOX_INT_CONTROL0: usize = 0x050;
    /// Core 0 IRQ source, one word per core
    pub const IRQ_PENDING0: usize = 0x060;
    /// Core 0 mailbox 0 write-set, four mailboxes per core
    pub const MAILBOX0_SET0: usize = 0x080;
    /// Core 0 mailbox 0 read/write-clear, four mailboxes per core
    pub const MAILBOX0_CLR0: usize = 0x0c0;

    /// Timer prescaler 1:1
    pub const PRESCALER_1_1: u32 = 0x8000_0000;

    /// Timer interrupt control of `cpu`
    pub const fn timer_int_control(cpu: usize) -> usize {
        TIMER_INT_CONTROL0 + 4 * cpu
    }

    /// Mailbox interrupt control of `cpu`
    pub const fn mailbox_int_control(cpu: usize) -> usize {
        MAILBOX_INT_CONTROL0 + 4 * cpu
    }

    /// IRQ source register of `cpu`
    pub const fn irq_pending(cpu: usize) -> usize {
        IRQ_PENDING0 + 4 * cpu
    }

    /// Mailbox 0 write-set register of `cpu`
    pub const fn mailbox0_set(cpu: usize) -> usize {
        MAILBOX0_SET0 + 16 * cpu
    }

    /// Mailbox 0 write-clear register of `cpu`
    pub const fn mailbox0_clr(cpu: usize) -> usize {
        MAILBOX0_CLR0 + 16 * cpu
    }
}

/// Bits of the per-core IRQ source register
pub mod source {
    /// Secure physical timer
    pub const CNTPSIRQ: u32 = 0;
    /// Non-secure physical timer
    pub const CNTPNSIRQ: u32 = 1;
    /// Hypervisor physical timer
    pub const CNTHPIRQ: u32 = 2;
    /// Virtual timer
    pub const CNTVIRQ: u32 = 3;
    /// Mailbox 0 (SGIs)
    pub const MAILBOX0: u32 = 4;
    /// Mailbox 1
    pub const MAILBOX1: u32 = 5;
    /// Mailbox 2
    pub const MAILBOX2: u32 = 6;
    /// Mailbox 3
    pub const MAILBOX3: u32 = 7;
    /// GPU interrupt (banked controller cascade)
    pub const GPU_FAST: u32 = 8;
    /// Performance monitor
    pub const PMU_FAST: u32 = 9;
    /// AXI outstanding
    pub const AXI: u32 = 10;
    /// Local timer
    pub const LOCAL_TIMER: u32 = 11;
}

/// Hardware id of local source `bit`
pub const fn local_hwirq(bit: u32) -> HwIrq {
    PPI_BASE + bit
}

/// The GPU line the banked controller cascades through
pub const GPU_IRQ: HwIrq = local_hwirq(source::GPU_FAST);

/// The PMU line
pub const PMU_IRQ: HwIrq = local_hwirq(source::PMU_FAST);

/// BCM2836 per-core local controller
pub struct Bcm2836Local<R: RegisterIo> {
    io: R,
    nr_cpus: usize,
}

impl<R: RegisterIo> Bcm2836Local<R> {
    /// Wrap the controller window `io` serving `nr_cpus` cores
    pub fn new(io: R, nr_cpus: usize) -> Self {
        Self { io, nr_cpus }
    }

    /// Number of cores served
    pub fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    /// Bring-up: crystal clock 1:1 for the core timers, mailbox 0 IRQ
    /// enabled on every core
    pub fn init(&self) {
        self.io.write32(local::CONTROL, 0);
        self.io.write32(local::PRESCALER, local::PRESCALER_1_1);

        for cpu in 0..self.nr_cpus {
            self.io.write32(local::mailbox_int_control(cpu), 1);
        }
        utils::dsb();
    }

    /// Highest-precedence pending local source of core `cpu`
    ///
    /// A mailbox 0 message is consumed as it is decoded: its lowest set bit
    /// is cleared and returned as the SGI id. Bits beyond the SGI range are
    /// consumed and reported as nothing pending.
    pub fn get_pending(&self, cpu: usize) -> Option<HwIrq> {
        let stat = self.io.read32(local::irq_pending(cpu));

        if stat & bit(source::MAILBOX0) != 0 {
            let mailbox = local::mailbox0_clr(cpu);
            let sgi = lowest_set_bit(self.io.read32(mailbox))?;

            self.io.write32(mailbox, bit(sgi));
            utils::dsb();

            return (sgi < NR_SGIS).then_some(sgi);
        }

        lowest_set_bit(stat).map(local_hwirq)
    }

    /// Lowest pending local source of `cpu` numbered above `irq`
    pub fn pending_after(&self, cpu: usize, irq: HwIrq) -> Option<HwIrq> {
        let first = irq + 1 - PPI_BASE;
        let stat = self.io.read32(local::irq_pending(cpu)) & !(bit(first) - 1);
        lowest_set_bit(stat).map(local_hwirq)
    }

    fn check_cpu(&self, cpu: usize) -> bool {
        if cpu >= self.nr_cpus {
            log::warn!("bcm2836: no local controller slot for cpu {}", cpu);
            return false;
        }
        true
    }

    /// Disable local source `irq` on core `cpu`
    ///
    /// SGIs cannot be masked; sources without a per-core enable are left
    /// alone.
    pub fn mask(&self, irq: HwIrq, cpu: usize) {
        if !(PPI_BASE..SPI_BASE).contains(&irq) || !self.check_cpu(cpu) {
            return;
        }

        match irq - PPI_BASE {
            line @ source::CNTPSIRQ..=source::CNTVIRQ => {
                self.io.clear_bits32(local::timer_int_control(cpu), bit(line));
                utils::dsb();
            }
            source::PMU_FAST => {
                self.io.write32(local::PM_ROUTING_CLR, bit(cpu as u32));
                utils::dsb();
            }
            // The GPU line is routed to core 0 and always enabled.
            _ => {}
        }
    }

    /// Enable local source `irq` on core `cpu`
    pub fn unmask(&self, irq: HwIrq, cpu: usize) {
        if !(PPI_BASE..SPI_BASE).contains(&irq) || !self.check_cpu(cpu) {
            return;
        }

        match irq - PPI_BASE {
            line @ source::CNTPSIRQ..=source::CNTVIRQ => {
                self.io.set_bits32(local::timer_int_control(cpu), bit(line));
                utils::dsb();
            }
            source::PMU_FAST => {
                self.io.write32(local::PM_ROUTING_SET, bit(cpu as u32));
                utils::dsb();
            }
            _ => {}
        }
    }

    fn post_mailbox(&self, cpu: usize, sgi: u32) {
        if !self.check_cpu(cpu) {
            return;
        }

        self.io.write32(local::mailbox0_set(cpu), bit(sgi));
        utils::dsb();
    }

    /// Post SGI `sgi` to the mailbox 0 of every target core
    ///
    /// `self_cpu` is the sending core.
    pub fn send_sgi(&self, sgi: u32, mode: SgiMode, cpus: CpuMask, self_cpu: usize) {
        utils::dsb();
        if sgi >= NR_SGIS {
            return;
        }

        match mode {
            SgiMode::ToOthers => {
                for cpu in cpus.iter().filter(|&cpu| cpu != self_cpu) {
                    self.post_mailbox(cpu, sgi);
                }
            }
            SgiMode::ToSelf => self.post_mailbox(self_cpu, sgi),
            SgiMode::ToList => {
                for cpu in cpus.iter() {
                    self.post_mailbox(cpu, sgi);
                }
            }
        }
    }
}

/// BCM2836 composite interrupt chip
///
/// Ids below 32 are served by the local controller of the calling (or
/// named) core, ids from 32 up by the banked controller.
pub struct Bcm2836IrqChip<R: RegisterIo = MmioRegion> {
    local: Bcm2836Local<R>,
    armctrl: Bcm2835Armctrl<R>,
    native: SpinLock<Option<Arc<dyn NativeVirqPort>>>,
}

impl<R: RegisterIo> Bcm2836IrqChip<R> {
    /// Build the chip over the two controller windows
    pub fn new(local: R, armctrl: R, nr_cpus: usize) -> Self {
        Self {
            local: Bcm2836Local::new(local, nr_cpus),
            armctrl: Bcm2835Armctrl::new(armctrl),
            native: SpinLock::new(None),
        }
    }

    /// Program the controllers' initial state
    pub fn init(&self) {
        self.local.init();
    }

    /// Local controller
    pub fn local(&self) -> &Bcm2836Local<R> {
        &self.local
    }

    /// Banked controller
    pub fn armctrl(&self) -> &Bcm2835Armctrl<R> {
        &self.armctrl
    }

    fn mask_on(&self, irq: HwIrq, cpu: usize) {
        if irq >= SPI_BASE {
            self.armctrl.mask(irq);
        } else {
            self.local.mask(irq, cpu);
        }
    }

    fn unmask_on(&self, irq: HwIrq, cpu: usize) {
        if irq >= SPI_BASE {
            self.armctrl.unmask(irq);
        } else {
            self.local.unmask(irq, cpu);
        }
    }

    /// Follow the GPU line into the banked controller
    fn cascade(&self) -> Option<HwIrq> {
        let irq = self.armctrl.get_pending()?;
        if irq < SPI_BASE {
            // Bank 0 private lines share ids with SGIs and cannot be
            // requested; silence the one that fired.
            log::warn!("bcm2835: private line {} pending, masking it", irq);
            self.armctrl.mask(irq);
            return None;
        }
        Some(irq)
    }
}

impl<R: RegisterIo> IrqChip for Bcm2836IrqChip<R> {
    fn name(&self) -> &'static str {
        "bcm2836"
    }

    fn mask(&self, irq: HwIrq) {
        self.mask_on(irq, cpu::current_cpu_id());
    }

    fn mask_for_core(&self, irq: HwIrq, cpu: usize) {
        self.mask_on(irq, cpu);
    }

    fn unmask(&self, irq: HwIrq) {
        self.unmask_on(irq, cpu::current_cpu_id());
    }

    fn unmask_for_core(&self, irq: HwIrq, cpu: usize) {
        self.unmask_on(irq, cpu);
    }

    fn end_of_interrupt(&self, irq: HwIrq) {
        if irq >= SPI_BASE {
            self.armctrl.mask(irq);
        }
    }

    fn direct_irq(&self, irq: HwIrq) {
        if irq >= SPI_BASE {
            self.armctrl.unmask(irq);
        }
    }

    fn set_type(&self, _irq: HwIrq, _trigger: IrqTrigger) -> Result<()> {
        Ok(())
    }

    fn set_priority(&self, _irq: HwIrq, _priority: u32) -> Result<()> {
        Ok(())
    }

    fn set_affinity(&self, _irq: HwIrq, _cpu: usize) -> Result<()> {
        Ok(())
    }

    fn get_pending(&self) -> Option<HwIrq> {
        let cpu = cpu::current_cpu_id();
        let irq = self.local.get_pending(cpu)?;
        if irq != GPU_IRQ {
            return Some(irq);
        }

        // Nothing routable behind the GPU line: sources above it still count.
        self.cascade().or_else(|| self.local.pending_after(cpu, GPU_IRQ))
    }

    fn send_sgi(&self, sgi: u32, mode: SgiMode, cpus: CpuMask) {
        self.local.send_sgi(sgi, mode, cpus, cpu::current_cpu_id());
    }

    // TODO: report the guest-visible state once the native virq port
    // exposes it.
    fn get_virq_state(&self, _vcpu: &Vcpu, _virq: &VirqDesc) -> VirqState {
        VirqState::Inactive
    }

    fn send_virq(&self, vcpu: &Vcpu, virq: &VirqDesc) -> Result<()> {
        // Translated guests pick up virqs through their emulated GIC.
        if !vcpu.vm().is_native() {
            return Ok(());
        }

        let port = self.native.lock().clone().ok_or(Error::NotInitialized)?;
        port.send_virq(vcpu, virq.vno())
    }

    fn update_virq(&self, _vcpu: &Vcpu, virq: &VirqDesc, action: VirqAction) -> Result<()> {
        if action == VirqAction::Clear && virq.vno() >= SPI_BASE && virq.is_hw() {
            if let Some(hno) = virq.hno() {
                self.unmask(hno);
            }
        }
        Ok(())
    }

    fn virq_count(&self) -> usize {
        VIRQ_NR
    }

    /// Inject at most one pending virq into `vcpu`
    ///
    /// HCR_EL2.VI in the vCPU context is cleared when the vCPU has nothing
    /// pending or active and set otherwise. Queue entries whose request was
    /// withdrawn are dropped. A virq the native port fails to deliver stays
    /// queued for the next entry.
    fn enter_to_guest(&self, vcpu: &Vcpu) -> Result<()> {
        let mut virqs = vcpu.virq_struct().lock();

        if virqs.is_idle() {
            vcpu.clear_virq_flag();
            return Ok(());
        }

        vcpu.set_virq_flag();

        if !vcpu.vm().is_native() {
            return Ok(());
        }

        while let Some(head) = virqs.pending_front().copied() {
            if !head.is_pending() {
                log::error!(
                    "virq {} queued on vcpu {} without a request",
                    head.vno(),
                    vcpu.id()
                );
                virqs.drop_pending_front();
                continue;
            }

            match self.send_virq(vcpu, &head) {
                Ok(()) => {
                    virqs.activate_pending_front();
                }
                Err(e) => {
                    log::error!(
                        "virq {} delivery to vcpu {} failed: {:?}",
                        head.vno(),
                        vcpu.id(),
                        e
                    );
                }
            }
            break;
        }

        Ok(())
    }

    fn secondary_init(&self) -> Result<()> {
        log::debug!("bcm2836: cpu {} local interrupts ready", cpu::current_cpu_id());
        Ok(())
    }

    fn attach_native_port(&self, port: Arc<dyn NativeVirqPort>) {
        *self.native.lock() = Some(port);
    }
}

/// Registry constructor for `"brcm,bcm2836-l1-intc"`
///
/// # Safety
/// Both controller windows named by `config` must be mapped device memory.
pub unsafe fn probe(config: &PlatformIrqConfig) -> Result<Box<dyn IrqChip>> {
    if config.local_base == 0 || config.armctrl_base == 0 {
        return Err(Error::InvalidArgument);
    }

    log::info!(
        "bcm2836: l1 interrupt controller at {:#x}, armctrl at {:#x}",
        config.local_base,
        config.armctrl_base
    );

    let (local, armctrl) = unsafe {
        (
            MmioRegion::new(config.local_base, config.local_size),
            MmioRegion::new(config.armctrl_base, config.armctrl_size),
        )
    };

    let chip = Bcm2836IrqChip::new(local, armctrl, config.nr_cpus);
    chip.init();

    Ok(Box::new(chip))
}
