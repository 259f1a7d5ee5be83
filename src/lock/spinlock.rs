//! Spin locks.
//!
//! On the single CPU a "spin" lock never actually spins against another
//! core; acquiring one disables interrupts for its whole critical
//! section, which is what excludes the interrupt handlers. The atomic
//! flag stays, both as a re-entrancy check and as the real lock when the
//! code runs multi-threaded on the host under test.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};

use super::{Guard, Lock, RawLock};
use crate::intr::HeldInterrupts;

/// Mutual exclusion lock that disables interrupts while held.
pub struct RawSpinlock {
    /// Name of lock, for diagnostics.
    name: &'static str,

    locked: AtomicBool,

    /// The interrupt-off witness held for the duration of the lock.
    held: UnsafeCell<Option<HeldInterrupts>>,
}

// SAFETY: `held` is only touched by the owner of `locked`.
unsafe impl Sync for RawSpinlock {}

/// Locks that disable interrupts while held.
pub type Spinlock<T> = Lock<RawSpinlock, T>;
/// Guards of `Spinlock<T>`.
pub type SpinlockGuard<'s, T> = Guard<'s, RawSpinlock, T>;

impl RawSpinlock {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
            held: UnsafeCell::new(None),
        }
    }
}

impl RawLock for RawSpinlock {
    fn acquire(&self) {
        // Interrupts go off before the flag is taken, so an interrupt
        // handler can never find the flag held on its own CPU.
        let held = HeldInterrupts::new();

        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }

        // SAFETY: we just took `locked`.
        unsafe { *self.held.get() = Some(held) };
    }

    fn release(&self) {
        debug_assert!(self.locked.load(Ordering::Relaxed), "release {}", self.name);

        // SAFETY: we hold `locked`.
        let held = unsafe { (*self.held.get()).take() };
        self.locked.store(false, Ordering::Release);

        // Dropping the witness may turn interrupts back on, so it goes
        // last.
        mem::drop(held);
    }
}

impl<T> Spinlock<T> {
    /// Returns a new `Spinlock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            lock: RawSpinlock::new(name),
            data: UnsafeCell::new(data),
        }
    }
}
