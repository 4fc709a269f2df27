//! ARM64 CPU helpers
//!
//! Core identification, local IRQ masking and the HCR_EL2 virtual
//! interrupt line.

bitflags::bitflags! {
    /// HCR_EL2 bits the interrupt core touches
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HcrFlags: u64 {
        /// Route physical FIQ to EL2
        const FMO = 1 << 3;
        /// Route physical IRQ to EL2
        const IMO = 1 << 4;
        /// Route physical SError to EL2
        const AMO = 1 << 5;
        /// Virtual FIQ pending
        const VF = 1 << 6;
        /// Virtual IRQ pending
        const VI = 1 << 7;
        /// Virtual SError pending
        const VSE = 1 << 8;
    }
}

/// DAIF.I, the IRQ mask bit
const DAIF_IRQ: u64 = 1 << 7;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", not(test)))] {
        use aarch64_cpu::registers::{DAIF, HCR_EL2, MPIDR_EL1};
        use tock_registers::interfaces::{Readable, Writeable};

        /// Get the current CPU ID (MPIDR_EL1.Aff0)
        #[inline]
        pub fn current_cpu_id() -> usize {
            (MPIDR_EL1.get() & 0xff) as usize
        }

        /// Mask IRQs on this core and return the previous DAIF value
        #[inline]
        pub fn local_irq_save() -> u64 {
            let flags = DAIF.get();
            DAIF.set(flags | DAIF_IRQ);
            flags
        }

        /// Restore DAIF saved by [`local_irq_save`]
        #[inline]
        pub fn local_irq_restore(flags: u64) {
            DAIF.set(flags);
        }

        /// Drive HCR_EL2.VI for the vCPU about to run on this core
        pub fn set_virq_line(asserted: bool) {
            let hcr = HcrFlags::from_bits_retain(HCR_EL2.get());
            let hcr = if asserted {
                hcr | HcrFlags::VI
            } else {
                hcr - HcrFlags::VI
            };
            HCR_EL2.set(hcr.bits());
        }
    } else if #[cfg(test)] {
        use ::core::cell::Cell;

        std::thread_local! {
            static CPU_ID: Cell<usize> = const { Cell::new(0) };
            static DAIF: Cell<u64> = const { Cell::new(0) };
            static VIRQ_LINE: Cell<bool> = const { Cell::new(false) };
        }

        /// Get the current CPU ID (the simulated core of this test thread)
        pub fn current_cpu_id() -> usize {
            CPU_ID.with(|c| c.get())
        }

        /// Pin the calling test thread to simulated core `cpu`
        pub fn set_current_cpu_id(cpu: usize) {
            CPU_ID.with(|c| c.set(cpu));
        }

        /// Mask IRQs on this core and return the previous DAIF value
        pub fn local_irq_save() -> u64 {
            DAIF.with(|d| d.replace(d.get() | DAIF_IRQ))
        }

        /// Restore DAIF saved by [`local_irq_save`]
        pub fn local_irq_restore(flags: u64) {
            DAIF.with(|d| d.set(flags));
        }

        /// Whether IRQs are currently masked on this core
        pub fn irqs_masked() -> bool {
            DAIF.with(|d| d.get() & DAIF_IRQ != 0)
        }

        /// Drive the simulated virtual IRQ line of this core
        pub fn set_virq_line(asserted: bool) {
            VIRQ_LINE.with(|l| l.set(asserted));
        }

        /// Last value driven onto the virtual IRQ line of this core
        pub fn virq_line() -> bool {
            VIRQ_LINE.with(|l| l.get())
        }
    } else {
        /// Get the current CPU ID; hosted builds only ever run core 0
        #[inline]
        pub fn current_cpu_id() -> usize {
            0
        }

        #[inline]
        pub fn local_irq_save() -> u64 {
            DAIF_IRQ
        }

        #[inline]
        pub fn local_irq_restore(_flags: u64) {}

        #[inline]
        pub fn set_virq_line(_asserted: bool) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hcr_bits() {
        assert_eq!(HcrFlags::VI.bits(), 1 << 7);
        assert_eq!(HcrFlags::VF.bits(), 1 << 6);
        assert_eq!(HcrFlags::IMO.bits(), 1 << 4);
    }

    #[test]
    fn test_irq_save_restore_nests() {
        assert!(!irqs_masked());
        let outer = local_irq_save();
        assert!(irqs_masked());
        let inner = local_irq_save();
        local_irq_restore(inner);
        assert!(irqs_masked());
        local_irq_restore(outer);
        assert!(!irqs_masked());
    }

    #[test]
    fn test_cpu_id_is_per_thread() {
        set_current_cpu_id(2);
        assert_eq!(current_cpu_id(), 2);
        std::thread::spawn(|| assert_eq!(current_cpu_id(), 0))
            .join()
            .unwrap();
    }
}
