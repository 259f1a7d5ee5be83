//! Boot entry.
//!
//! The bootloader leaves the CPU in long mode with low memory identity
//! mapped, a small stack below 1 MiB, and a Multiboot-style info pointer
//! in rbx. `_start` moves the pointer into the C calling convention and
//! lands in `kstart`, which brings up the descriptor tables and the
//! legacy devices before handing the parsed memory map to the
//! arch-independent kernel.

use core::arch::global_asm;

use arrayvec::ArrayVec;

use super::{gdt, idt, pic, pit, uart};

global_asm!(
    r#"
.section .text
.globl _start
_start:
    cli
    mov rdi, rbx
    call kstart
1:  hlt
    jmp 1b
"#
);

/// One usable physical memory range.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub base: usize,
    pub len: usize,
}

/// What the shim hands to the kernel: usable RAM, as reported by the
/// bootloader.
pub type MemMap = ArrayVec<Region, 16>;

/// Multiboot info header fields the shim consumes.
#[repr(C)]
struct MultibootInfo {
    flags: u32,
    mem_lower: u32,
    mem_upper: u32,
    _skip: [u32; 8],
    mmap_length: u32,
    mmap_addr: u32,
}

/// Multiboot memory-map entry. `size` does not include itself.
#[repr(C, packed)]
struct MmapEntry {
    size: u32,
    base: u64,
    len: u64,
    typ: u32,
}

const MMAP_AVAILABLE: u32 = 1;
const MBI_FLAG_MMAP: u32 = 1 << 6;

/// # Safety
///
/// `info` must point at a Multiboot info structure in identity-mapped
/// memory.
unsafe fn parse_memmap(info: usize) -> MemMap {
    let mut map = MemMap::new();
    // SAFETY: bootloader contract.
    let mbi = unsafe { &*(info as *const MultibootInfo) };
    if mbi.flags & MBI_FLAG_MMAP == 0 {
        // No map provided; fall back to mem_upper KiB above 1 MiB.
        let _ = map.try_push(Region {
            base: 0x10_0000,
            len: mbi.mem_upper as usize * 1024,
        });
        return map;
    }

    let mut at = mbi.mmap_addr as usize;
    let end = at + mbi.mmap_length as usize;
    while at < end {
        // SAFETY: bootloader contract; entries are packed.
        let entry = unsafe { &*(at as *const MmapEntry) };
        if entry.typ == MMAP_AVAILABLE {
            let _ = map.try_push(Region {
                base: entry.base as usize,
                len: entry.len as usize,
            });
        }
        at += entry.size as usize + 4;
    }
    map
}

#[no_mangle]
unsafe extern "C" fn kstart(mb_info: usize) -> ! {
    // SAFETY: boot path, single CPU, interrupts off.
    unsafe {
        gdt::init();
        idt::init();
        pic::init();
        pit::init();
        uart::init();
        let memmap = parse_memmap(mb_info);
        crate::kernel::kernel_main(memmap)
    }
}
