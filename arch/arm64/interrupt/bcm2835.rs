//! BCM2835 banked interrupt controller (ARMCTRL) driver
//!
//! The GPU-side controller exposes three banks of interrupt lines. Bank 0
//! ("basic") carries eight ARM-private lines, two summary bits for banks 1
//! and 2, and eleven shortcut bits that mirror frequently used bank 1/2
//! lines so the common case needs a single register read.
//!
//! Reference: BCM2835 ARM Peripherals, section 7.5

use crate::core::irq::HwIrq;
use crate::utils::{self, bit, lowest_set_bit, RegisterIo};

/// Number of register banks
pub const NR_BANKS: usize = 3;

/// Lines per bank
pub const IRQS_PER_BANK: u32 = 32;

/// ARMCTRL register offsets and bit definitions
pub mod armctrl {
    use crate::utils::bit;

    /// IRQ basic pending (bank 0)
    pub const IRQ_BASIC_PENDING: usize = 0x00;
    /// IRQ pending 1 (bank 1)
    pub const IRQ_PENDING_1: usize = 0x04;
    /// IRQ pending 2 (bank 2)
    pub const IRQ_PENDING_2: usize = 0x08;
    /// Enable IRQs 1
    pub const ENABLE_IRQS_1: usize = 0x10;
    /// Enable IRQs 2
    pub const ENABLE_IRQS_2: usize = 0x14;
    /// Enable basic IRQs
    pub const ENABLE_BASIC_IRQS: usize = 0x18;
    /// Disable IRQs 1
    pub const DISABLE_IRQS_1: usize = 0x1c;
    /// Disable IRQs 2
    pub const DISABLE_IRQS_2: usize = 0x20;
    /// Disable basic IRQs
    pub const DISABLE_BASIC_IRQS: usize = 0x24;

    /// ARM-private lines in bank 0
    pub const BANK0_HWIRQ_MASK: u32 = 0xff;
    /// Bank 1 has a pending line
    pub const BANK1_HWIRQ: u32 = bit(8);
    /// Bank 2 has a pending line
    pub const BANK2_HWIRQ: u32 = bit(9);
    /// Shortcut bits mirroring bank 1 lines
    pub const SHORTCUT1_MASK: u32 = 0x0000_7c00;
    /// Shortcut bits mirroring bank 2 lines
    pub const SHORTCUT2_MASK: u32 = 0x001f_8000;
    /// Position of the first shortcut bit
    pub const SHORTCUT_SHIFT: u32 = 10;
    /// Every meaningful bit of the basic pending register
    pub const BANK0_VALID_MASK: u32 =
        BANK0_HWIRQ_MASK | BANK1_HWIRQ | BANK2_HWIRQ | SHORTCUT1_MASK | SHORTCUT2_MASK;
}

/// Bank lines mirrored by the shortcut bits, in shortcut-bit order
///
/// The first five entries are bank 1 lines, the rest bank 2 lines. Fixed
/// by the hardware wiring.
pub const SHORTCUTS: [u32; 11] = [7, 9, 10, 18, 19, 21, 22, 23, 24, 25, 30];

/// Flat id of line `line` in bank `bank`
#[inline]
pub const fn make_hwirq(bank: usize, line: u32) -> HwIrq {
    bank as u32 * IRQS_PER_BANK + line
}

/// Bank holding `irq`
#[inline]
pub const fn hwirq_bank(irq: HwIrq) -> usize {
    (irq / IRQS_PER_BANK) as usize
}

/// Bit of `irq` inside its bank registers
#[inline]
pub const fn hwirq_bit(irq: HwIrq) -> u32 {
    bit(irq % IRQS_PER_BANK)
}

/// Per-bank register offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankRegisters {
    /// Pending status register of each bank
    pub pending: [usize; NR_BANKS],
    /// Enable (write-1-to-set) register of each bank
    pub enable: [usize; NR_BANKS],
    /// Disable (write-1-to-clear) register of each bank
    pub disable: [usize; NR_BANKS],
}

impl BankRegisters {
    /// The BCM2835 register layout
    pub const fn bcm2835() -> Self {
        use armctrl::*;

        Self {
            pending: [IRQ_BASIC_PENDING, IRQ_PENDING_1, IRQ_PENDING_2],
            enable: [ENABLE_BASIC_IRQS, ENABLE_IRQS_1, ENABLE_IRQS_2],
            disable: [DISABLE_BASIC_IRQS, DISABLE_IRQS_1, DISABLE_IRQS_2],
        }
    }
}

/// BCM2835 banked controller
pub struct Bcm2835Armctrl<R: RegisterIo> {
    io: R,
    regs: BankRegisters,
}

impl<R: RegisterIo> Bcm2835Armctrl<R> {
    /// Wrap the controller window `io`
    pub fn new(io: R) -> Self {
        Self {
            io,
            regs: BankRegisters::bcm2835(),
        }
    }

    /// Register layout in use
    pub fn registers(&self) -> &BankRegisters {
        &self.regs
    }

    /// Disable line `irq` for every core
    pub fn mask(&self, irq: HwIrq) {
        let bank = hwirq_bank(irq);
        if bank >= NR_BANKS {
            log::warn!("bcm2835: mask of irq {} outside the banks", irq);
            return;
        }

        self.io.write32(self.regs.disable[bank], hwirq_bit(irq));
        utils::dsb();
    }

    /// Enable line `irq` for every core
    pub fn unmask(&self, irq: HwIrq) {
        let bank = hwirq_bank(irq);
        if bank >= NR_BANKS {
            log::warn!("bcm2835: unmask of irq {} outside the banks", irq);
            return;
        }

        self.io.write32(self.regs.enable[bank], hwirq_bit(irq));
        utils::dsb();
    }

    /// Lowest pending line of bank `bank`
    fn bank_pending(&self, bank: usize) -> Option<HwIrq> {
        let stat = self.io.read32(self.regs.pending[bank]);
        match lowest_set_bit(stat) {
            Some(line) => Some(make_hwirq(bank, line)),
            None => {
                log::debug!("bcm2835: bank {} summary set but no line pending", bank);
                None
            }
        }
    }

    /// Line behind the lowest set shortcut bit in `stat`
    fn shortcut_pending(bank: usize, stat: u32) -> Option<HwIrq> {
        let index = lowest_set_bit(stat >> armctrl::SHORTCUT_SHIFT)?;
        Some(make_hwirq(bank, SHORTCUTS[index as usize]))
    }

    /// Highest-precedence pending line
    ///
    /// Precedence: bank 0 private lines, bank 1 shortcuts, bank 2
    /// shortcuts, then a full scan of bank 1 and bank 2. Lowest bit wins
    /// within each step.
    ///
    /// # Panics
    /// If the basic pending register reports a status none of the steps
    /// can route, the controller model is broken and the system halts.
    pub fn get_pending(&self) -> Option<HwIrq> {
        use armctrl::*;

        let stat = self.io.read32(self.regs.pending[0]) & BANK0_VALID_MASK;

        if stat == 0 {
            None
        } else if stat & BANK0_HWIRQ_MASK != 0 {
            lowest_set_bit(stat & BANK0_HWIRQ_MASK).map(|line| make_hwirq(0, line))
        } else if stat & SHORTCUT1_MASK != 0 {
            Self::shortcut_pending(1, stat & SHORTCUT1_MASK)
        } else if stat & SHORTCUT2_MASK != 0 {
            Self::shortcut_pending(2, stat & SHORTCUT2_MASK)
        } else if stat & BANK1_HWIRQ != 0 {
            self.bank_pending(1)
        } else if stat & BANK2_HWIRQ != 0 {
            self.bank_pending(2)
        } else {
            panic!("bcm2835: unroutable basic pending status {:#x}", stat);
        }
    }
}
