//! Simple spinlock implementation
//!
//! Provides a basic spinlock that busy-waits until the lock is acquired,
//! plus an IRQ-saving variant for data shared with interrupt context.
//! Suitable for short critical sections.

use ::core::cell::UnsafeCell;
use ::core::hint;
use ::core::ops::{Deref, DerefMut};
use ::core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::arm64::cpu;

/// A simple spinlock
pub struct SpinLock<T> {
    /// Atomic flag indicating if the lock is held
    locked: AtomicBool,
    /// The data protected by the lock
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create a new spinlock
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Try to acquire the lock without blocking
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    /// Acquire the lock, spinning until it's available
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }

            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    /// Mask IRQs on this core, then acquire the lock
    ///
    /// IRQs stay masked until the guard is dropped, so an interrupt handler
    /// that takes the same lock can never preempt the holder on this core.
    pub fn lock_irqsave(&self) -> IrqSaveGuard<'_, T> {
        let flags = cpu::local_irq_save();
        IrqSaveGuard {
            guard: ::core::mem::ManuallyDrop::new(self.lock()),
            flags,
        }
    }

    /// Check if the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Consume the lock and return the protected data
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A guard that provides access to the data protected by a SpinLock
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Guard returned by [`SpinLock::lock_irqsave`]
///
/// Releases the lock first, then restores the saved IRQ state.
pub struct IrqSaveGuard<'a, T> {
    guard: ::core::mem::ManuallyDrop<SpinLockGuard<'a, T>>,
    flags: u64,
}

impl<'a, T> Deref for IrqSaveGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<'a, T> DerefMut for IrqSaveGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<'a, T> Drop for IrqSaveGuard<'a, T> {
    fn drop(&mut self) {
        // SAFETY: dropped exactly once, here.
        unsafe { ::core::mem::ManuallyDrop::drop(&mut self.guard) };
        cpu::local_irq_restore(self.flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;

    #[test]
    fn test_lock_unlock() {
        let lock = SpinLock::new(5);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert_eq!(lock.into_inner(), 6);
    }

    #[test]
    fn test_irqsave_masks_while_held() {
        let lock = SpinLock::new(());
        assert!(!cpu::irqs_masked());
        {
            let _guard = lock.lock_irqsave();
            assert!(cpu::irqs_masked());
            assert!(lock.is_locked());
        }
        assert!(!cpu::irqs_masked());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_contended_counter() {
        let lock = Arc::new(SpinLock::new(0u32));
        let workers: alloc::vec::Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock_irqsave() += 1;
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }
}
