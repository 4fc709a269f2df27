//! Register-level model of the BCM2835 and BCM2836 controllers
//!
//! Backs [`RegisterIo`] for the unit tests. Pending status is derived from
//! raw line levels and the enable state on every read, the way the
//! hardware computes it: banked lines need their enable bit, local timers
//! their per-core control bit, the PMU its routing bit, and mailbox 0 its
//! interrupt control bit. The GPU line is routed to core 0.

use alloc::sync::Arc;

use super::bcm2835::{armctrl, hwirq_bank, hwirq_bit, NR_BANKS, SHORTCUTS};
use super::bcm2836::{local, source, Bcm2836IrqChip};
use crate::arch::arm64::MAX_CPUS;
use crate::core::irq::HwIrq;
use crate::core::sync::SpinLock;
use crate::utils::{bit, RegisterIo};

#[derive(Default)]
struct State {
    raw: [u32; NR_BANKS],
    enabled: [u32; NR_BANKS],
    forced_basic: u32,
    control: u32,
    prescaler: u32,
    gpu_routing: u32,
    pm_routing: u32,
    timer_raw: [u32; MAX_CPUS],
    timer_ctrl: [u32; MAX_CPUS],
    pmu_raw: [bool; MAX_CPUS],
    mailbox_ctrl: [u32; MAX_CPUS],
    mailbox0: [u32; MAX_CPUS],
}

impl State {
    fn bank_pending(&self, bank: usize) -> u32 {
        self.raw[bank] & self.enabled[bank]
    }

    fn basic_pending(&self) -> u32 {
        let bank1 = self.bank_pending(1);
        let bank2 = self.bank_pending(2);

        let mut stat = self.bank_pending(0) & armctrl::BANK0_HWIRQ_MASK;
        if bank1 != 0 {
            stat |= armctrl::BANK1_HWIRQ;
        }
        if bank2 != 0 {
            stat |= armctrl::BANK2_HWIRQ;
        }

        for (index, &line) in SHORTCUTS.iter().enumerate() {
            let bank = if index < 5 { bank1 } else { bank2 };
            if bank & bit(line) != 0 {
                stat |= bit(armctrl::SHORTCUT_SHIFT + index as u32);
            }
        }

        stat | self.forced_basic
    }

    fn local_pending(&self, cpu: usize) -> u32 {
        let mut stat = self.timer_raw[cpu] & self.timer_ctrl[cpu] & 0xf;
        if self.mailbox0[cpu] != 0 && self.mailbox_ctrl[cpu] & 1 != 0 {
            stat |= bit(source::MAILBOX0);
        }
        if cpu == (self.gpu_routing as usize & 0x3) && self.basic_pending() != 0 {
            stat |= bit(source::GPU_FAST);
        }
        if self.pmu_raw[cpu] && self.pm_routing & bit(cpu as u32) != 0 {
            stat |= bit(source::PMU_FAST);
        }
        stat
    }

    /// Per-core register block and core index of `offset`
    fn per_cpu(offset: usize, base: usize, stride: usize) -> Option<usize> {
        let end = base + stride * MAX_CPUS;
        if (base..end).contains(&offset) && (offset - base) % stride == 0 {
            Some((offset - base) / stride)
        } else {
            None
        }
    }

    fn local_read(&self, offset: usize) -> u32 {
        match offset {
            local::CONTROL => self.control,
            local::PRESCALER => self.prescaler,
            local::GPU_ROUTING => self.gpu_routing,
            local::PM_ROUTING_SET | local::PM_ROUTING_CLR => self.pm_routing,
            _ => {
                if let Some(cpu) = Self::per_cpu(offset, local::TIMER_INT_CONTROL0, 4) {
                    self.timer_ctrl[cpu]
                } else if let Some(cpu) = Self::per_cpu(offset, local::MAILBOX_INT_CONTROL0, 4) {
                    self.mailbox_ctrl[cpu]
                } else if let Some(cpu) = Self::per_cpu(offset, local::IRQ_PENDING0, 4) {
                    self.local_pending(cpu)
                } else if let Some(cpu) = Self::per_cpu(offset, local::MAILBOX0_CLR0, 16) {
                    self.mailbox0[cpu]
                } else {
                    0
                }
            }
        }
    }

    fn local_write(&mut self, offset: usize, value: u32) {
        match offset {
            local::CONTROL => self.control = value,
            local::PRESCALER => self.prescaler = value,
            local::GPU_ROUTING => self.gpu_routing = value,
            local::PM_ROUTING_SET => self.pm_routing |= value,
            local::PM_ROUTING_CLR => self.pm_routing &= !value,
            _ => {
                if let Some(cpu) = Self::per_cpu(offset, local::TIMER_INT_CONTROL0, 4) {
                    self.timer_ctrl[cpu] = value;
                } else if let Some(cpu) = Self::per_cpu(offset, local::MAILBOX_INT_CONTROL0, 4) {
                    self.mailbox_ctrl[cpu] = value;
                } else if let Some(cpu) = Self::per_cpu(offset, local::MAILBOX0_SET0, 16) {
                    self.mailbox0[cpu] |= value;
                } else if let Some(cpu) = Self::per_cpu(offset, local::MAILBOX0_CLR0, 16) {
                    self.mailbox0[cpu] &= !value;
                }
            }
        }
    }

    fn armctrl_read(&self, offset: usize) -> u32 {
        match offset {
            armctrl::IRQ_BASIC_PENDING => self.basic_pending(),
            armctrl::IRQ_PENDING_1 => self.bank_pending(1),
            armctrl::IRQ_PENDING_2 => self.bank_pending(2),
            armctrl::ENABLE_BASIC_IRQS | armctrl::DISABLE_BASIC_IRQS => self.enabled[0],
            armctrl::ENABLE_IRQS_1 | armctrl::DISABLE_IRQS_1 => self.enabled[1],
            armctrl::ENABLE_IRQS_2 | armctrl::DISABLE_IRQS_2 => self.enabled[2],
            _ => 0,
        }
    }

    fn armctrl_write(&mut self, offset: usize, value: u32) {
        match offset {
            armctrl::ENABLE_BASIC_IRQS => self.enabled[0] |= value,
            armctrl::ENABLE_IRQS_1 => self.enabled[1] |= value,
            armctrl::ENABLE_IRQS_2 => self.enabled[2] |= value,
            armctrl::DISABLE_BASIC_IRQS => self.enabled[0] &= !value,
            armctrl::DISABLE_IRQS_1 => self.enabled[1] &= !value,
            armctrl::DISABLE_IRQS_2 => self.enabled[2] &= !value,
            _ => {}
        }
    }
}

/// Both controllers of one simulated board
pub struct BcmSim {
    state: SpinLock<State>,
}

/// Which controller a [`SimWindow`] decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Local,
    Armctrl,
}

/// A controller register window of a [`BcmSim`]
pub struct SimWindow {
    sim: Arc<BcmSim>,
    window: Window,
}

impl RegisterIo for SimWindow {
    fn read32(&self, offset: usize) -> u32 {
        let state = self.sim.state.lock();
        match self.window {
            Window::Local => state.local_read(offset),
            Window::Armctrl => state.armctrl_read(offset),
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.sim.state.lock();
        match self.window {
            Window::Local => state.local_write(offset, value),
            Window::Armctrl => state.armctrl_write(offset, value),
        }
    }
}

impl BcmSim {
    /// A powered-on board with every line low and disabled
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: SpinLock::new(State::default()),
        })
    }

    /// A board plus a composite chip brought up over it
    pub fn chip(nr_cpus: usize) -> (Arc<Self>, Bcm2836IrqChip<SimWindow>) {
        let sim = Self::new();
        let chip = Bcm2836IrqChip::new(sim.local(), sim.armctrl(), nr_cpus);
        chip.init();
        (sim, chip)
    }

    /// Local controller window
    pub fn local(self: &Arc<Self>) -> SimWindow {
        SimWindow {
            sim: self.clone(),
            window: Window::Local,
        }
    }

    /// Banked controller window
    pub fn armctrl(self: &Arc<Self>) -> SimWindow {
        SimWindow {
            sim: self.clone(),
            window: Window::Armctrl,
        }
    }

    /// Drive banked line `irq` high
    pub fn raise_spi(&self, irq: HwIrq) {
        self.state.lock().raw[hwirq_bank(irq)] |= hwirq_bit(irq);
    }

    /// Drive banked line `irq` low
    pub fn lower_spi(&self, irq: HwIrq) {
        self.state.lock().raw[hwirq_bank(irq)] &= !hwirq_bit(irq);
    }

    /// OR `bits` into the basic pending register regardless of line state
    pub fn force_basic_pending(&self, bits: u32) {
        self.state.lock().forced_basic |= bits;
    }

    /// Drive core timer `line` (0..4) of `cpu` high
    pub fn raise_timer(&self, cpu: usize, line: u32) {
        self.state.lock().timer_raw[cpu] |= bit(line);
    }

    /// Drive core timer `line` of `cpu` low
    pub fn lower_timer(&self, cpu: usize, line: u32) {
        self.state.lock().timer_raw[cpu] &= !bit(line);
    }

    /// Drive the PMU line of `cpu` high
    pub fn raise_pmu(&self, cpu: usize) {
        self.state.lock().pmu_raw[cpu] = true;
    }

    /// Set `bits` in mailbox 0 of `cpu` from outside the chip
    pub fn post_mailbox(&self, cpu: usize, bits: u32) {
        self.state.lock().mailbox0[cpu] |= bits;
    }

    /// Enable register of `bank`
    pub fn enabled(&self, bank: usize) -> u32 {
        self.state.lock().enabled[bank]
    }

    /// Local control register
    pub fn control(&self) -> u32 {
        self.state.lock().control
    }

    /// Core timer prescaler
    pub fn prescaler(&self) -> u32 {
        self.state.lock().prescaler
    }

    /// PMU routing bits
    pub fn pm_routing(&self) -> u32 {
        self.state.lock().pm_routing
    }

    /// Timer interrupt control of `cpu`
    pub fn timer_int_control(&self, cpu: usize) -> u32 {
        self.state.lock().timer_ctrl[cpu]
    }

    /// Mailbox interrupt control of `cpu`
    pub fn mailbox_int_control(&self, cpu: usize) -> u32 {
        self.state.lock().mailbox_ctrl[cpu]
    }

    /// Mailbox 0 contents of `cpu`
    pub fn mailbox(&self, cpu: usize) -> u32 {
        self.state.lock().mailbox0[cpu]
    }
}
