//! The lock module.
//!
//! Contains types for locks and lock guards that provide mutual
//! exclusion, and the traits that express their behaviors.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

mod sleepablelock;
mod sleeplock;
mod spinlock;
mod wait;

pub use sleepablelock::{Sleepablelock, SleepablelockGuard};
pub use sleeplock::{Sleeplock, SleeplockGuard};
pub use spinlock::{RawSpinlock, Spinlock, SpinlockGuard};
pub use wait::WaitChannel;

/// Raw mutual exclusion.
pub trait RawLock {
    /// Acquires the lock.
    fn acquire(&self);

    /// Releases the lock.
    fn release(&self);
}

/// A lock that owns its `RawLock` and `data: T`.
pub struct Lock<R: RawLock, T> {
    pub(super) lock: R,
    pub(super) data: UnsafeCell<T>,
}

// SAFETY: the raw lock provides the mutual exclusion that makes sharing
// sound.
unsafe impl<R: RawLock, T: Send> Sync for Lock<R, T> {}
unsafe impl<R: RawLock, T: Send> Send for Lock<R, T> {}

/// Guards that provide exclusive access to the lock's data until dropped.
pub struct Guard<'s, R: RawLock, T> {
    lock: &'s Lock<R, T>,
}

impl<R: RawLock, T> Lock<R, T> {
    /// Acquires the lock and returns its guard.
    pub fn lock(&self) -> Guard<'_, R, T> {
        self.lock.acquire();
        Guard { lock: self }
    }

    /// Returns a raw pointer to the inner data without locking. The
    /// caller must ensure the access does not race.
    pub fn get_mut_raw(&self) -> *mut T {
        self.data.get()
    }

    /// Returns a mutable reference to the inner data.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the lock and returns the inner data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<R: RawLock, T> Guard<'_, R, T> {
    /// Temporarily releases the lock, runs `f`, and reacquires.
    ///
    /// Used when the lock order requires giving this lock up before
    /// taking another.
    pub fn reacquire_after<U>(&mut self, f: impl FnOnce() -> U) -> U {
        self.lock.lock.release();
        let result = f();
        self.lock.lock.acquire();
        result
    }

    /// Releases the inner raw lock without consuming the guard.
    ///
    /// # Safety
    ///
    /// Must be paired with `raw_acquire`, and `self` must not be
    /// accessed in between. Used by `WaitChannel::sleep`.
    pub(super) unsafe fn raw_release(&mut self) {
        self.lock.lock.release();
    }

    /// Reacquires the inner raw lock after `raw_release`.
    ///
    /// # Safety
    ///
    /// See `raw_release`.
    pub(super) unsafe fn raw_acquire(&mut self) {
        self.lock.lock.acquire();
    }
}

impl<R: RawLock, T> Drop for Guard<'_, R, T> {
    fn drop(&mut self) {
        self.lock.lock.release();
    }
}

impl<R: RawLock, T> Deref for Guard<'_, R, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<R: RawLock, T> DerefMut for Guard<'_, R, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the guard holds the lock.
        unsafe { &mut *self.lock.data.get() }
    }
}
