//! VCPU transition hooks
//!
//! Subsystems register callbacks that run on the VCPU entry path.
//! The interrupt chip registers its guest-entry injection hook here.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::core::sync::SpinLock;
use crate::core::vmm::Vcpu;
use crate::{Error, Result};

/// Maximum hooks per type
pub const MAX_HOOKS: usize = 8;

/// Point at which a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    /// Right before the VCPU resumes guest execution
    EnterToGuest,
}

/// A VCPU transition callback
pub trait VcpuHook: Send + Sync {
    /// Run the hook for `vcpu`
    fn call(&self, vcpu: &Vcpu) -> Result<()>;
}

impl<F> VcpuHook for F
where
    F: Fn(&Vcpu) -> Result<()> + Send + Sync,
{
    fn call(&self, vcpu: &Vcpu) -> Result<()> {
        self(vcpu)
    }
}

/// Registered hooks, per type, in registration order
pub struct HookTable {
    enter: SpinLock<Vec<Box<dyn VcpuHook>>>,
}

impl Default for HookTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HookTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            enter: SpinLock::new(Vec::new()),
        }
    }

    fn slot(&self, ty: HookType) -> &SpinLock<Vec<Box<dyn VcpuHook>>> {
        match ty {
            HookType::EnterToGuest => &self.enter,
        }
    }

    /// Register `hook` to run at `ty`
    pub fn register(&self, ty: HookType, hook: Box<dyn VcpuHook>) -> Result<()> {
        let mut hooks = self.slot(ty).lock();
        if hooks.len() >= MAX_HOOKS {
            return Err(Error::NoSpace);
        }

        hooks.push(hook);
        Ok(())
    }

    /// Run every hook of type `ty`, stopping at the first failure
    pub fn run(&self, ty: HookType, vcpu: &Vcpu) -> Result<()> {
        let hooks = self.slot(ty).lock();
        for hook in hooks.iter() {
            hook.call(vcpu)?;
        }
        Ok(())
    }

    /// Number of hooks registered for `ty`
    pub fn len(&self, ty: HookType) -> usize {
        self.slot(ty).lock().len()
    }
}

static HOOKS: HookTable = HookTable::new();

/// The global hook table
pub fn get() -> &'static HookTable {
    &HOOKS
}
