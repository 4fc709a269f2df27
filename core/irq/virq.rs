//! Virtual interrupt state for one vCPU
//!
//! Every vCPU owns [`VIRQ_NR`] virq descriptors, indexed by virtual number.
//! A descriptor's lifecycle is
//!
//! ```text
//!   Inactive --raise--> Pending --guest entry--> Active --completion--> Inactive
//! ```
//!
//! and its state always mirrors its list membership: `Pending` descriptors
//! sit in the FIFO pending queue, `Active` ones in the active list, and
//! `Inactive` ones in neither. Both lists hold virtual numbers only, so a
//! descriptor can never be linked twice.

use heapless::Deque;

use crate::core::irq::HwIrq;
use crate::core::sync::{IrqSaveGuard, SpinLock};
use crate::{Error, Result};

/// Number of virqs per vCPU
pub const VIRQ_NR: usize = 128;

bitflags::bitflags! {
    /// Virq descriptor flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VirqFlags: u32 {
        /// Backed by a physical interrupt line (`hno`)
        const HW = 1 << 0;
        /// Requested and not yet delivered to the guest
        const PENDING = 1 << 1;
        /// Enabled by the guest
        const ENABLED = 1 << 2;
    }
}

/// Lifecycle state of a virq
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirqState {
    /// Idle
    Inactive,
    /// Waiting in the pending queue for the next guest entry
    Pending,
    /// Delivered to the guest, waiting for completion
    Active,
}

/// Update requested through [`crate::IrqChip::update_virq`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirqAction {
    /// The guest enabled the virq
    Enable,
    /// The guest disabled the virq
    Disable,
    /// The guest completed the virq
    Clear,
}

/// One virtual interrupt line of a vCPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirqDesc {
    vno: u32,
    hno: Option<HwIrq>,
    flags: VirqFlags,
    state: VirqState,
}

impl VirqDesc {
    /// Create an idle, enabled, software-only descriptor
    pub const fn new(vno: u32) -> Self {
        Self {
            vno,
            hno: None,
            flags: VirqFlags::ENABLED,
            state: VirqState::Inactive,
        }
    }

    /// Virtual interrupt number
    pub fn vno(&self) -> u32 {
        self.vno
    }

    /// Bound hardware interrupt, if any
    pub fn hno(&self) -> Option<HwIrq> {
        self.hno
    }

    /// Descriptor flags
    pub fn flags(&self) -> VirqFlags {
        self.flags
    }

    /// Lifecycle state
    pub fn state(&self) -> VirqState {
        self.state
    }

    /// Whether the virq is backed by a hardware line
    pub fn is_hw(&self) -> bool {
        self.flags.contains(VirqFlags::HW)
    }

    /// Whether the virq has been requested and not yet delivered
    pub fn is_pending(&self) -> bool {
        self.flags.contains(VirqFlags::PENDING)
    }

    /// Whether the guest has the virq enabled
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(VirqFlags::ENABLED)
    }
}

/// Descriptor arena and pending/active lists of one vCPU
pub struct VirqQueues {
    descs: heapless::Vec<VirqDesc, VIRQ_NR>,
    pending: Deque<u32, VIRQ_NR>,
    active: heapless::Vec<u32, VIRQ_NR>,
}

impl VirqQueues {
    fn new() -> Self {
        let mut descs = heapless::Vec::new();
        for vno in 0..VIRQ_NR as u32 {
            // Capacity is exactly VIRQ_NR.
            let _ = descs.push(VirqDesc::new(vno));
        }

        Self {
            descs,
            pending: Deque::new(),
            active: heapless::Vec::new(),
        }
    }

    fn slot(&mut self, vno: u32) -> Result<&mut VirqDesc> {
        self.descs
            .get_mut(vno as usize)
            .ok_or(Error::InvalidArgument)
    }

    /// Descriptor for `vno`
    pub fn desc(&self, vno: u32) -> Option<&VirqDesc> {
        self.descs.get(vno as usize)
    }

    /// Bind `vno` to hardware line `hno`
    ///
    /// Only an inactive descriptor can be rebound.
    pub fn bind_hw(&mut self, vno: u32, hno: HwIrq) -> Result<()> {
        let desc = self.slot(vno)?;
        if desc.state != VirqState::Inactive {
            return Err(Error::ResourceBusy);
        }

        desc.hno = Some(hno);
        desc.flags.insert(VirqFlags::HW);
        Ok(())
    }

    /// Record the guest enabling or disabling `vno`
    pub fn set_enabled(&mut self, vno: u32, enabled: bool) -> Result<()> {
        let desc = self.slot(vno)?;
        desc.flags.set(VirqFlags::ENABLED, enabled);
        Ok(())
    }

    /// Request `vno`: Inactive -> Pending
    ///
    /// Returns `Ok(false)` when the virq was already pending and the request
    /// coalesced with it. A virq the guest is still servicing cannot be
    /// raised again until it completes.
    pub fn raise(&mut self, vno: u32) -> Result<bool> {
        let desc = self.slot(vno)?;
        match desc.state {
            VirqState::Inactive => {
                desc.flags.insert(VirqFlags::PENDING);
                desc.state = VirqState::Pending;
                self.pending.push_back(vno).map_err(|_| Error::NoSpace)?;
                Ok(true)
            }
            VirqState::Pending => {
                let fresh = !desc.is_pending();
                desc.flags.insert(VirqFlags::PENDING);
                Ok(fresh)
            }
            VirqState::Active => Err(Error::InvalidState),
        }
    }

    /// Withdraw the request for a queued virq without unlinking it
    ///
    /// The descriptor stays in the pending queue with its `PENDING` flag
    /// cleared; the next guest entry notices and drops it.
    pub fn withdraw(&mut self, vno: u32) -> Result<()> {
        let desc = self.slot(vno)?;
        if desc.state != VirqState::Pending {
            return Err(Error::InvalidState);
        }

        desc.flags.remove(VirqFlags::PENDING);
        Ok(())
    }

    /// Complete `vno`: Active -> Inactive
    ///
    /// Returns the descriptor as it was while active, so the caller can
    /// re-arm a bound hardware line.
    pub fn retire(&mut self, vno: u32) -> Result<VirqDesc> {
        let desc = self.slot(vno)?;
        if desc.state != VirqState::Active {
            return Err(Error::InvalidState);
        }

        let retired = *desc;
        desc.state = VirqState::Inactive;
        self.active.retain(|&v| v != vno);
        Ok(retired)
    }

    /// Head of the pending queue
    pub fn pending_front(&self) -> Option<&VirqDesc> {
        self.pending.front().and_then(|&vno| self.desc(vno))
    }

    /// Unlink the head of the pending queue without delivering it
    pub fn drop_pending_front(&mut self) -> Option<VirqDesc> {
        let vno = self.pending.pop_front()?;
        let desc = self.slot(vno).ok()?;
        desc.flags.remove(VirqFlags::PENDING);
        desc.state = VirqState::Inactive;
        Some(*desc)
    }

    /// Move the head of the pending queue to the active list
    pub fn activate_pending_front(&mut self) -> Option<VirqDesc> {
        let vno = self.pending.pop_front()?;
        let desc = self.slot(vno).ok()?;
        desc.flags.remove(VirqFlags::PENDING);
        desc.state = VirqState::Active;
        let activated = *desc;
        // At most VIRQ_NR distinct descriptors can be active.
        let _ = self.active.push(vno);
        Some(activated)
    }

    /// Whether both lists are empty
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    /// Virtual numbers in the pending queue, oldest first
    pub fn pending(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending.iter().copied()
    }

    /// Virtual numbers in the active list, in delivery order
    pub fn active(&self) -> impl Iterator<Item = u32> + '_ {
        self.active.iter().copied()
    }

    /// Number of queued virqs
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of active virqs
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Every descriptor's state matches its list membership
    #[cfg(test)]
    pub(crate) fn assert_membership(&self) {
        use alloc::vec::Vec;

        let pending: Vec<u32> = self.pending().collect();
        let active: Vec<u32> = self.active().collect();

        for desc in self.descs.iter() {
            let vno = desc.vno();
            let in_pending = pending.iter().filter(|&&v| v == vno).count();
            let in_active = active.iter().filter(|&&v| v == vno).count();
            assert!(in_pending + in_active <= 1, "virq {} linked twice", vno);

            match desc.state() {
                VirqState::Inactive => assert_eq!(in_pending + in_active, 0),
                VirqState::Pending => assert_eq!(in_pending, 1),
                VirqState::Active => assert_eq!(in_active, 1),
            }
        }
    }
}

/// Per-vCPU virq state
///
/// Shared between the physical interrupt path and the guest-entry path,
/// so every access goes through [`VirqStruct::lock`], which masks IRQs on
/// the calling core for as long as the lists are held.
pub struct VirqStruct {
    queues: SpinLock<VirqQueues>,
}

impl Default for VirqStruct {
    fn default() -> Self {
        Self::new()
    }
}

impl VirqStruct {
    /// Create the virq state for a new vCPU
    pub fn new() -> Self {
        Self {
            queues: SpinLock::new(VirqQueues::new()),
        }
    }

    /// Lock the lists with IRQs masked on this core
    pub fn lock(&self) -> IrqSaveGuard<'_, VirqQueues> {
        self.queues.lock_irqsave()
    }

    /// Snapshot of the descriptor for `vno`
    pub fn desc(&self, vno: u32) -> Option<VirqDesc> {
        self.lock().desc(vno).copied()
    }

    /// See [`VirqQueues::bind_hw`]
    pub fn bind_hw(&self, vno: u32, hno: HwIrq) -> Result<()> {
        self.lock().bind_hw(vno, hno)
    }

    /// See [`VirqQueues::raise`]
    pub fn raise(&self, vno: u32) -> Result<bool> {
        self.lock().raise(vno)
    }

    /// See [`VirqQueues::withdraw`]
    pub fn withdraw(&self, vno: u32) -> Result<()> {
        self.lock().withdraw(vno)
    }

    /// See [`VirqQueues::retire`]
    pub fn retire(&self, vno: u32) -> Result<VirqDesc> {
        self.lock().retire(vno)
    }
}
