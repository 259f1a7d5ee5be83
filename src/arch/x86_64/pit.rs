//! 8254 programmable interval timer.

use crate::param::TICK_HZ;

use super::asm::outb;
use super::memlayout::{PIT_CH0, PIT_CMD};

/// Input clock of channel 0.
const PIT_BASE_HZ: u64 = 1_193_180;

/// Program channel 0, mode 3 (square wave), LOHI load, to fire at
/// `TICK_HZ`.
///
/// # Safety
///
/// Must run once with interrupts off.
pub unsafe fn init() {
    let divisor = (PIT_BASE_HZ / TICK_HZ) as u16;
    unsafe {
        // channel 0 | access lobyte/hibyte | mode 3 | binary
        outb(PIT_CMD, 0x36);
        outb(PIT_CH0, divisor as u8);
        outb(PIT_CH0, (divisor >> 8) as u8);
    }
}
