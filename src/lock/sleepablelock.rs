//! Sleepable locks.

use core::cell::UnsafeCell;

use super::{spinlock::RawSpinlock, Guard, Lock, RawLock, WaitChannel};

/// Mutual exclusion spin lock whose guards can sleep.
pub struct RawSleepablelock {
    lock: RawSpinlock,
    /// WaitChannel used to sleep/wake up the lock's guards.
    waitchannel: WaitChannel,
}

/// Similar to `Spinlock`, but guards of this lock can sleep.
pub type Sleepablelock<T> = Lock<RawSleepablelock, T>;
/// Guards of `Sleepablelock<T>`. These guards can `sleep()`/`wakeup()`.
pub type SleepablelockGuard<'s, T> = Guard<'s, RawSleepablelock, T>;

impl RawSleepablelock {
    const fn new(name: &'static str) -> Self {
        Self {
            lock: RawSpinlock::new(name),
            waitchannel: WaitChannel::new(),
        }
    }
}

impl RawLock for RawSleepablelock {
    fn acquire(&self) {
        self.lock.acquire();
    }

    fn release(&self) {
        self.lock.release();
    }
}

impl<T> Sleepablelock<T> {
    /// Returns a new `Sleepablelock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            lock: RawSleepablelock::new(name),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T> SleepablelockGuard<'_, T> {
    /// Sleep until another holder calls `wakeup`. Returns `false` if
    /// interrupted by a signal.
    pub fn sleep(&mut self) -> bool {
        // The channel lives in the lock, which outlives the guard.
        let chan = &self.lock.lock.waitchannel as *const WaitChannel;
        // SAFETY: sleep re-locks before returning and the channel is
        // never moved.
        unsafe { (*chan).sleep(self) }
    }

    pub fn wakeup(&self) {
        self.lock.lock.waitchannel.wakeup();
    }
}
