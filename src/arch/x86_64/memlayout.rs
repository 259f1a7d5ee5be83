//! Physical and virtual memory layout.
//!
//! The bootloader leaves us in long mode with low memory identity-mapped.
//! The kernel keeps that identity map (supervisor-only pages, so ring 3
//! cannot touch it) and adds the canonical higher-half alias of all
//! physical memory at `KERNBASE`. User mappings live in their own PML4
//! slots starting at `USER_BASE`, so replicating the kernel half into a
//! new address space is a copy of the kernel's PML4 entries.

/// Higher-half alias of physical memory (PML4 slot 256).
pub const KERNBASE: usize = 0xFFFF_8000_0000_0000;

/// First user-mappable virtual address (PML4 slot 1).
pub const USER_BASE: usize = 0x0000_0080_0000_0000;

/// One past the last user-mappable virtual address.
pub const USER_TOP: usize = 0x0000_0100_0000_0000;

/// Top of the user stack; grows down from here.
pub const USTACK_TOP: usize = USER_TOP;

/// Legacy PC I/O ports consumed by the core.
pub const COM1: u16 = 0x3F8;
pub const KBD_DATA: u16 = 0x60;
pub const KBD_STATUS: u16 = 0x64;
pub const PIC1_CMD: u16 = 0x20;
pub const PIC1_DATA: u16 = 0x21;
pub const PIC2_CMD: u16 = 0xA0;
pub const PIC2_DATA: u16 = 0xA1;
pub const PIT_CH0: u16 = 0x40;
pub const PIT_CMD: u16 = 0x43;

/// IRQ 0..15 are remapped to vectors 0x20..0x2F.
pub const IRQ_BASE: u8 = 0x20;
pub const IRQ_TIMER: u8 = 0;
pub const IRQ_KBD: u8 = 1;
pub const IRQ_COM1: u8 = 4;
pub const IRQ_ATA0: u8 = 14;

/// Software trap vector used for system calls.
pub const VEC_SYSCALL: u8 = 0x80;

extern "C" {
    /// First address after the kernel image. Defined by kernel.ld.
    pub static mut end: [u8; 0];
}

/// First address after the kernel image, as a physical frame boundary.
pub fn kernel_end() -> usize {
    // SAFETY: safe to take only the address of a static.
    unsafe { end.as_ptr() as usize }
}
