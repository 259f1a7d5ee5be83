//! Interrupt-disable critical sections.
//!
//! Mutual exclusion against interrupt handlers on the single CPU is
//! interrupt disabling. Sections nest: interrupts come back on only when
//! the outermost `HeldInterrupts` is dropped, and only if they were on
//! when it was created.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::arch::{intr_get, intr_off, intr_on};

/// Nesting depth of interrupt-off sections on the CPU.
static NOFF: AtomicU32 = AtomicU32::new(0);

/// Were interrupts enabled before the outermost section?
static INTENA: AtomicBool = AtomicBool::new(false);

/// Witness that interrupts are off.
///
/// # Safety
///
/// The CPU's `NOFF` equals the number of live `HeldInterrupts`.
pub struct HeldInterrupts(());

impl HeldInterrupts {
    pub fn new() -> Self {
        let old = intr_get();
        intr_off();

        if NOFF.load(Ordering::Relaxed) == 0 {
            INTENA.store(old, Ordering::Relaxed);
        }
        NOFF.fetch_add(1, Ordering::Relaxed);

        HeldInterrupts(())
    }

    /// Adopt a depth left behind by a context switch: a freshly created
    /// task starts life one level deep, with no witness on its stack.
    ///
    /// # Safety
    ///
    /// Interrupts must be off and the caller must own exactly one
    /// unaccounted level of depth.
    pub unsafe fn assume_held() -> Self {
        debug_assert!(!intr_get());
        debug_assert!(NOFF.load(Ordering::Relaxed) >= 1);
        HeldInterrupts(())
    }
}

/// The interrupts-were-enabled flag for the current outermost section.
/// Context switches save and restore it per task around `swtch`.
pub fn saved_intena() -> bool {
    INTENA.load(Ordering::Relaxed)
}

pub fn restore_intena(v: bool) {
    INTENA.store(v, Ordering::Relaxed);
}

impl Drop for HeldInterrupts {
    fn drop(&mut self) {
        debug_assert!(!intr_get(), "HeldInterrupts dropped while interruptible");
        let prev = NOFF.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev >= 1, "unbalanced HeldInterrupts");

        if prev == 1 && INTENA.load(Ordering::Relaxed) {
            intr_on();
        }
    }
}

/// Run `f` with interrupts off. Keep the body short; nothing inside may
/// block.
pub fn with_interrupts_disabled<R>(f: impl FnOnce(&HeldInterrupts) -> R) -> R {
    let held = HeldInterrupts::new();
    f(&held)
}
