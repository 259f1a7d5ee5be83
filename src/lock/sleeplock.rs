//! Sleeping locks.

use core::cell::UnsafeCell;

use super::{Guard, Lock, RawLock, Sleepablelock};

/// Long-term locks for processes. The holder is parked, not spinning,
/// so these may be held across block I/O.
pub struct RawSleeplock {
    /// Pid holding the lock. `-1` means unlocked.
    locked: Sleepablelock<i32>,

    /// Name of lock for diagnostics.
    name: &'static str,
}

/// Locks that sleep instead of busy wait.
pub type Sleeplock<T> = Lock<RawSleeplock, T>;
pub type SleeplockGuard<'s, T> = Guard<'s, RawSleeplock, T>;

fn holder_id() -> i32 {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "none")] {
            crate::proc::current_pid().unwrap_or(0)
        } else {
            // Host tests are single-threaded per lock user; any
            // non-negative id will do.
            0
        }
    }
}

impl RawSleeplock {
    const fn new(name: &'static str) -> Self {
        Self {
            locked: Sleepablelock::new("sleep lock", -1),
            name,
        }
    }
}

impl RawLock for RawSleeplock {
    fn acquire(&self) {
        let mut guard = self.locked.lock();
        while *guard != -1 {
            let _ = guard.sleep();
        }
        *guard = holder_id();
    }

    fn release(&self) {
        let mut guard = self.locked.lock();
        *guard = -1;
        guard.wakeup();
    }
}

impl<T> Sleeplock<T> {
    /// Returns a new `Sleeplock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            lock: RawSleeplock::new(name),
            data: UnsafeCell::new(data),
        }
    }
}
