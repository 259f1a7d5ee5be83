//! Host stand-in for the interrupt primitives, used by unit tests.
//!
//! There is no interrupt controller on the host; locks taken during tests
//! fall back to plain atomics, so these are no-ops.

pub fn intr_on() {}

pub fn intr_off() {}

pub fn intr_get() -> bool {
    false
}

pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}
