//! 4-level page tables.
//!
//! Physical memory is identity-mapped (and aliased in the higher half),
//! so a table at physical address `p` is read through virtual address
//! `p`. The kernel's PML4 slots are built once at boot and copied into
//! every new address space; user mappings live in their own slots, all
//! above `USER_BASE`.

use bitflags::bitflags;

use crate::kalloc::{self, frame_to_pa, pa_to_frame};
use crate::page::{pgrounddown, PGSIZE};
use crate::param::PHYSTOP;
use crate::error::{Errno, Result};

use super::asm::{invlpg, w_cr3};
use super::memlayout::{KERNBASE, USER_BASE, USER_TOP};

bitflags! {
    /// Page-table entry flags.
    pub struct PteFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        /// 2 MiB page when set in a PD entry.
        const HUGE = 1 << 7;
        const GLOBAL = 1 << 8;
        const NO_EXECUTE = 1 << 63;
    }
}

const PTE_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;
const ENTRIES: usize = 512;

/// Index into the level-`lvl` table for `va` (lvl 3 = PML4).
fn pt_index(va: usize, lvl: usize) -> usize {
    (va >> (12 + 9 * lvl)) & 0x1FF
}

#[repr(C, align(4096))]
struct RawTable {
    entries: [u64; ENTRIES],
}

impl RawTable {
    /// # Safety
    ///
    /// `pa` must be a page-aligned physical address holding a page table
    /// this address space owns (or the shared kernel tables).
    unsafe fn from_pa<'a>(pa: usize) -> &'a mut RawTable {
        // Identity map: physical address doubles as virtual.
        unsafe { &mut *(pa as *mut RawTable) }
    }
}

/// Owner of one address space's top-level table.
///
/// The root and the intermediate user tables are owned by this struct
/// (freed on `destroy`); the mapped user frames are owned by the
/// `UserMemory` built on top, which unmaps and frees them first.
#[derive(Debug)]
pub struct PageTableRoot {
    pml4_pa: usize,
}

/// The canonical kernel root, shared (read-only after boot) by every
/// address space via PML4-slot copies.
static mut KERNEL_ROOT: usize = 0;

fn alloc_table() -> Result<usize> {
    let frame = kalloc::alloc_frame().ok_or(Errno::ENOMEM)?;
    let pa = frame_to_pa(frame);
    // SAFETY: freshly allocated frame, identity-mapped.
    unsafe { core::ptr::write_bytes(pa as *mut u8, 0, PGSIZE) };
    Ok(pa)
}

/// Build the kernel's canonical mappings: identity map of
/// `[0, PHYSTOP)` in slot 0 plus the higher-half alias at `KERNBASE`,
/// both supervisor-only, in 2 MiB pages.
///
/// # Safety
///
/// Must run once at boot, after the frame allocator is up.
pub unsafe fn init_kernel_root() -> Result<()> {
    let pml4_pa = alloc_table()?;
    let pdpt_pa = alloc_table()?;

    let dir_flags = (PteFlags::PRESENT | PteFlags::WRITABLE).bits();
    // SAFETY: both tables were just allocated.
    let pml4 = unsafe { RawTable::from_pa(pml4_pa) };
    pml4.entries[0] = pdpt_pa as u64 | dir_flags;
    pml4.entries[pt_index(KERNBASE, 3)] = pdpt_pa as u64 | dir_flags;

    const HUGE_SIZE: usize = 2 * 1024 * 1024;
    let leaf = (PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::HUGE | PteFlags::GLOBAL).bits();
    let pdpt = unsafe { RawTable::from_pa(pdpt_pa) };
    for (i, chunk) in (0..PHYSTOP).step_by(HUGE_SIZE * ENTRIES).enumerate() {
        let pd_pa = alloc_table()?;
        pdpt.entries[i] = pd_pa as u64 | dir_flags;
        let pd = unsafe { RawTable::from_pa(pd_pa) };
        for (j, pa) in (chunk..PHYSTOP).step_by(HUGE_SIZE).take(ENTRIES).enumerate() {
            pd.entries[j] = pa as u64 | leaf;
        }
    }

    // SAFETY: boot path, single CPU.
    unsafe { KERNEL_ROOT = pml4_pa };
    Ok(())
}

/// Install the canonical kernel root on this CPU.
pub unsafe fn install_kernel_root() {
    // SAFETY: init_kernel_root ran first.
    unsafe { w_cr3(KERNEL_ROOT) };
}

impl PageTableRoot {
    /// A placeholder root that must never be installed or destroyed;
    /// used to take a real root out of a struct by value.
    pub const fn dangling() -> Self {
        Self { pml4_pa: 0 }
    }

    /// A fresh address space: the kernel half replicated, the user half
    /// empty.
    pub fn new() -> Result<Self> {
        let pml4_pa = alloc_table()?;
        // SAFETY: fresh table; KERNEL_ROOT is immutable after boot.
        unsafe {
            let pml4 = RawTable::from_pa(pml4_pa);
            let kernel = RawTable::from_pa(KERNEL_ROOT);
            pml4.entries[0] = kernel.entries[0];
            for i in ENTRIES / 2..ENTRIES {
                pml4.entries[i] = kernel.entries[i];
            }
        }
        Ok(Self { pml4_pa })
    }

    /// The physical address loaded into CR3 on a switch to this space.
    pub fn cr3(&self) -> usize {
        self.pml4_pa
    }

    /// Make this the active address space.
    pub unsafe fn install(&self) {
        unsafe { w_cr3(self.pml4_pa) };
    }

    fn user_range_ok(va: usize) -> Result<()> {
        if (USER_BASE..USER_TOP).contains(&va) {
            Ok(())
        } else {
            Err(Errno::EFAULT)
        }
    }

    /// Walk to the PTE for `va`, allocating intermediate tables when
    /// `alloc` is set.
    fn walk(&self, va: usize, alloc: bool) -> Result<&'static mut u64> {
        Self::user_range_ok(va)?;
        let mut table_pa = self.pml4_pa;
        for lvl in (1..=3).rev() {
            // SAFETY: table_pa is the root we own or a table reached
            // from it.
            let table = unsafe { RawTable::from_pa(table_pa) };
            let pte = &mut table.entries[pt_index(va, lvl)];
            if *pte & PteFlags::PRESENT.bits() == 0 {
                if !alloc {
                    return Err(Errno::EFAULT);
                }
                let new_pa = alloc_table()?;
                *pte = new_pa as u64
                    | (PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER).bits();
            }
            table_pa = (*pte & PTE_ADDR_MASK) as usize;
        }
        // SAFETY: leaf table reached through owned entries.
        let table = unsafe { RawTable::from_pa(table_pa) };
        Ok(&mut table.entries[pt_index(va, 0)])
    }

    /// Map the page at `va` to the frame at `pa`.
    pub fn map(&mut self, va: usize, pa: usize, flags: PteFlags) -> Result<()> {
        debug_assert_eq!(va % PGSIZE, 0, "map: unaligned va");
        debug_assert_eq!(pa % PGSIZE, 0, "map: unaligned pa");
        let pte = self.walk(va, true)?;
        if *pte & PteFlags::PRESENT.bits() != 0 {
            panic!("remap of {:#x}", va);
        }
        *pte = pa as u64 | (flags | PteFlags::PRESENT).bits();
        Ok(())
    }

    /// Remove the mapping at `va`, returning the physical address that
    /// was mapped so the caller can release the frame.
    pub fn unmap(&mut self, va: usize) -> Result<usize> {
        let pte = self.walk(va, false)?;
        if *pte & PteFlags::PRESENT.bits() == 0 {
            return Err(Errno::EFAULT);
        }
        let pa = (*pte & PTE_ADDR_MASK) as usize;
        *pte = 0;
        // SAFETY: flushing a stale translation is always sound.
        unsafe { invlpg(va) };
        Ok(pa)
    }

    /// Physical address and flags backing `va`, if mapped.
    pub fn translate(&self, va: usize) -> Option<(usize, PteFlags)> {
        let pte = self.walk(pgrounddown(va), false).ok()?;
        if *pte & PteFlags::PRESENT.bits() == 0 {
            return None;
        }
        let pa = (*pte & PTE_ADDR_MASK) as usize + (va % PGSIZE);
        Some((pa, PteFlags::from_bits_truncate(*pte)))
    }

    /// Is `va` mapped writable from ring 3?
    pub fn user_writable(&self, va: usize) -> bool {
        matches!(
            self.translate(va),
            Some((_, f)) if f.contains(PteFlags::USER | PteFlags::WRITABLE)
        )
    }

    fn free_table_recursive(table_pa: usize, lvl: usize) {
        if lvl > 1 {
            // SAFETY: reached through owned entries.
            let table = unsafe { RawTable::from_pa(table_pa) };
            for pte in table.entries.iter() {
                if *pte & PteFlags::PRESENT.bits() != 0 {
                    Self::free_table_recursive((*pte & PTE_ADDR_MASK) as usize, lvl - 1);
                }
            }
        }
        kalloc::free_frame(pa_to_frame(table_pa));
    }

    /// Tear down this address space's user tables. All user frames must
    /// already be unmapped (the memory owner frees them); only paging
    /// structures are released here.
    pub fn destroy(self) {
        // SAFETY: we own the root; kernel slots are shared and skipped.
        let pml4 = unsafe { RawTable::from_pa(self.pml4_pa) };
        for i in 1..ENTRIES / 2 {
            let pte = pml4.entries[i];
            if pte & PteFlags::PRESENT.bits() != 0 {
                Self::free_table_recursive((pte & PTE_ADDR_MASK) as usize, 3);
            }
        }
        kalloc::free_frame(pa_to_frame(self.pml4_pa));
    }
}
