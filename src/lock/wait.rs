//! Wait channels.
//!
//! A `WaitChannel` is a rendezvous point identified by its address.
//! Sleeping atomically releases the guard the caller holds and parks the
//! current task in the scheduler; waking marks every task parked on the
//! channel READY. On the host there is no scheduler, so sleeping is a
//! bug in the test.

use super::{Guard, RawLock};

pub struct WaitChannel {
    _private: (),
}

impl WaitChannel {
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Channel identity.
    fn id(&self) -> usize {
        self as *const _ as usize
    }

    /// Atomically release `guard`, sleep on this channel, and reacquire
    /// `guard` before returning. Returns `false` if the sleep was cut
    /// short by a signal.
    pub fn sleep<R: RawLock, T>(&self, guard: &mut Guard<'_, R, T>) -> bool {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "none")] {
                // SAFETY: the guard's lock is released only after the
                // sleeper is registered (no lost wakeup), reacquired
                // before the guard is touched again.
                let guard_ptr = guard as *mut Guard<'_, R, T>;
                let uninterrupted = crate::proc::sleep_on(self.id(), move || {
                    // SAFETY: the guard outlives the park; nothing else
                    // touches it until raw_acquire below.
                    unsafe { (*guard_ptr).raw_release() }
                });
                // SAFETY: paired with the release above.
                unsafe { guard.raw_acquire() };
                uninterrupted
            } else {
                let _ = guard;
                unreachable!("blocking on a WaitChannel in a host test")
            }
        }
    }

    /// Wake up all tasks sleeping on this channel.
    pub fn wakeup(&self) {
        #[cfg(target_os = "none")]
        crate::proc::wakeup(self.id());
    }
}
