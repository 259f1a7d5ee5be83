//! Arch-independent trap handling.
//!
//! Everything the low-level stubs capture funnels through `handle`:
//! device interrupts (EOI'd here, rescheduling only on the timer path
//! and only for user-mode interrupts), the syscall vector, and CPU
//! exceptions. A fault in user mode becomes a fatal signal for the
//! task; a fault in kernel mode is a kernel bug and panics.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::x86_64::asm::r_cr2;
use crate::arch::x86_64::kbd;
use crate::arch::x86_64::memlayout::{IRQ_ATA0, IRQ_BASE, IRQ_COM1, IRQ_KBD, IRQ_TIMER, VEC_SYSCALL};
use crate::arch::x86_64::pic;
use crate::arch::x86_64::trap::{PageFaultError, TrapFrame};
use crate::arch::x86_64::uart;
use crate::console::CONSOLE;
use crate::proc::{self, SIGSEGV};

/// Monotonic tick counter, incremented on every timer interrupt.
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Acquire)
}

const VEC_PAGE_FAULT: usize = 14;
const VEC_DOUBLE_FAULT: usize = 8;

fn irq_of(vector: usize) -> Option<u8> {
    let base = IRQ_BASE as usize;
    if (base..base + 16).contains(&vector) {
        Some((vector - base) as u8)
    } else {
        None
    }
}

pub fn handle(tf: &mut TrapFrame) {
    let vector = tf.vector;

    if vector == VEC_SYSCALL as usize {
        crate::syscall::dispatch(tf);
    } else if let Some(irq) = irq_of(vector) {
        handle_irq(irq, tf);
    } else {
        handle_exception(tf);
    }

    // Signals raised while in the kernel are delivered before user
    // mode resumes.
    if tf.from_user() {
        proc::check_signals();
    }
}

fn handle_irq(irq: u8, tf: &mut TrapFrame) {
    let mut preempt = false;
    match irq {
        IRQ_TIMER => {
            let now = TICKS.fetch_add(1, Ordering::AcqRel) + 1;
            // EOI before the scheduler may switch away from this stack
            // frame for a long time.
            pic::eoi(irq);
            preempt = proc::on_tick(now);
        }
        IRQ_KBD => {
            while let Some(c) = kbd::getc() {
                CONSOLE.intr(c);
            }
            pic::eoi(irq);
        }
        IRQ_COM1 => {
            while let Some(c) = uart::getc() {
                CONSOLE.intr(c);
            }
            pic::eoi(irq);
        }
        IRQ_ATA0 => {
            // The driver polls; the line still needs acknowledging.
            pic::eoi(irq);
        }
        _ => {
            log::debug!("stray irq {}", irq);
            pic::eoi(irq);
        }
    }

    if preempt && tf.from_user() {
        proc::yield_now();
    }
}

fn handle_exception(tf: &mut TrapFrame) {
    if tf.vector == VEC_DOUBLE_FAULT {
        panic!("double fault, rip={:#x}", tf.rip);
    }

    if tf.vector == VEC_PAGE_FAULT {
        let addr = r_cr2();
        let err = PageFaultError::from_bits_truncate(tf.err);
        if err.contains(PageFaultError::USER) {
            // On-demand region? Materialize the page and resume.
            let resolved = proc::with_current(|p| {
                p.memory
                    .as_mut()
                    .map_or(false, |m| !err.contains(PageFaultError::PRESENT) && m.handle_fault(addr))
            });
            if resolved {
                return;
            }
            log::warn!(
                "segfault: pid {:?} at {:#x} (err {:#x}, rip {:#x})",
                proc::current_pid(),
                addr,
                tf.err,
                tf.rip
            );
            proc::with_current(|p| p.sig.post(SIGSEGV));
            return;
        }
        panic!(
            "kernel page fault at {:#x}, err {:#x}, rip {:#x}",
            addr, tf.err, tf.rip
        );
    }

    if tf.from_user() {
        // Any other CPU exception from ring 3 kills the task.
        log::warn!(
            "fatal exception {} for pid {:?}, rip {:#x}",
            tf.vector,
            proc::current_pid(),
            tf.rip
        );
        proc::with_current(|p| p.sig.post(SIGSEGV));
        return;
    }

    panic!(
        "unexpected kernel trap {} (err {:#x}), rip {:#x}",
        tf.vector, tf.err, tf.rip
    );
}
