//! x86-64 instructions and port I/O.

// Dead code is allowed in this file because not all accessors are used in
// the kernel.
#![allow(dead_code)]

use core::arch::asm;

use bitflags::bitflags;

bitflags! {
    /// RFLAGS register.
    pub struct Rflags: u64 {
        /// Interrupt enable.
        const IF = 1 << 9;
        /// Always one on real hardware.
        const RESERVED1 = 1 << 1;
    }
}

impl Rflags {
    #[inline]
    pub fn read() -> Self {
        let mut x: u64;
        unsafe {
            asm!("pushfq", "pop {x}", x = out(reg) x);
        }
        Self::from_bits_truncate(x)
    }
}

/// Are device interrupts enabled?
#[inline]
pub fn intr_get() -> bool {
    Rflags::read().contains(Rflags::IF)
}

/// Enable device interrupts.
#[inline]
pub fn intr_on() {
    unsafe { asm!("sti") };
}

/// Disable device interrupts.
#[inline]
pub fn intr_off() {
    unsafe { asm!("cli") };
}

/// Halt until the next interrupt. Interrupts must be enabled, otherwise
/// the CPU never wakes up.
#[inline]
pub fn wait_for_interrupt() {
    unsafe { asm!("hlt") };
}

/// Read a byte from an I/O port.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let mut x: u8;
    unsafe {
        asm!("in al, dx", in("dx") port, out("al") x, options(nomem, nostack));
    }
    x
}

/// Write a byte to an I/O port.
#[inline]
pub unsafe fn outb(port: u16, data: u8) {
    unsafe {
        asm!("out dx, al", in("dx") port, in("al") data, options(nomem, nostack));
    }
}

/// Read a 16-bit word from an I/O port.
#[inline]
pub unsafe fn inw(port: u16) -> u16 {
    let mut x: u16;
    unsafe {
        asm!("in ax, dx", in("dx") port, out("ax") x, options(nomem, nostack));
    }
    x
}

/// Write a 16-bit word to an I/O port.
#[inline]
pub unsafe fn outw(port: u16, data: u16) {
    unsafe {
        asm!("out dx, ax", in("dx") port, in("ax") data, options(nomem, nostack));
    }
}

/// Page-table root: physical address of the PML4 plus control bits.
#[inline]
pub fn r_cr3() -> usize {
    let mut x: usize;
    unsafe {
        asm!("mov {x}, cr3", x = out(reg) x);
    }
    x
}

/// Install a page-table root. Flushes the non-global TLB entries.
#[inline]
pub unsafe fn w_cr3(x: usize) {
    unsafe {
        asm!("mov cr3, {x}", x = in(reg) x);
    }
}

/// Faulting virtual address of the last page fault.
#[inline]
pub fn r_cr2() -> usize {
    let mut x: usize;
    unsafe {
        asm!("mov {x}, cr2", x = out(reg) x);
    }
    x
}

/// Invalidate one TLB entry.
#[inline]
pub unsafe fn invlpg(va: usize) {
    unsafe {
        asm!("invlpg [{va}]", va = in(reg) va, options(nostack));
    }
}

#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u64,
}

/// Load the global descriptor table.
#[inline]
pub unsafe fn lgdt(p: &DescriptorTablePointer) {
    unsafe {
        asm!("lgdt [{p}]", p = in(reg) p, options(nostack));
    }
}

/// Load the interrupt descriptor table.
#[inline]
pub unsafe fn lidt(p: &DescriptorTablePointer) {
    unsafe {
        asm!("lidt [{p}]", p = in(reg) p, options(nostack));
    }
}

/// Load the task register with a TSS selector.
#[inline]
pub unsafe fn ltr(sel: u16) {
    unsafe {
        asm!("ltr {sel:x}", sel = in(reg) sel, options(nostack));
    }
}

/// Reload the segment registers after installing a new GDT. The far
/// return swaps CS; the data segments are plain moves.
#[inline]
pub unsafe fn reload_segments(code_sel: u16, data_sel: u16) {
    unsafe {
        asm!(
            "push {code}",
            "lea {tmp}, [rip + 2f]",
            "push {tmp}",
            "retfq",
            "2:",
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov ss, {data:x}",
            code = in(reg) code_sel as u64,
            data = in(reg) data_sel as u64,
            tmp = lateout(reg) _,
        );
    }
}
