//! Global descriptor table and task state segment.
//!
//! Long mode ignores segment bases and limits; the GDT exists to encode
//! ring 0 vs ring 3 and to anchor the TSS, whose RSP0 field is what moves
//! the CPU onto the current task's kernel stack on a ring transition.

use core::mem;

use crate::intr::HeldInterrupts;

use super::asm::{lgdt, ltr, reload_segments, DescriptorTablePointer};

pub const KCODE_SEL: u16 = 0x08;
pub const KDATA_SEL: u16 = 0x10;
pub const UCODE_SEL: u16 = 0x18 | 3;
pub const UDATA_SEL: u16 = 0x20 | 3;
pub const TSS_SEL: u16 = 0x28;

/// 64-bit task state segment.
#[repr(C, packed)]
pub struct TaskStateSegment {
    _reserved0: u32,
    /// Stack pointer loaded on a ring 3 -> ring 0 transition.
    rsp0: u64,
    rsp1: u64,
    rsp2: u64,
    _reserved1: u64,
    ist: [u64; 7],
    _reserved2: u64,
    _reserved3: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn zero() -> Self {
        Self {
            _reserved0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            _reserved1: 0,
            ist: [0; 7],
            _reserved2: 0,
            _reserved3: 0,
            iomap_base: mem::size_of::<TaskStateSegment>() as u16,
        }
    }
}

/// Segment descriptor flags, already shifted into their qword positions.
const ACCESSED: u64 = 1 << 40;
const WRITABLE: u64 = 1 << 41;
const EXECUTABLE: u64 = 1 << 43;
const CODE_DATA: u64 = 1 << 44;
const DPL3: u64 = 3 << 45;
const PRESENT: u64 = 1 << 47;
const LONG_CODE: u64 = 1 << 53;

const KCODE_DESC: u64 = PRESENT | CODE_DATA | EXECUTABLE | LONG_CODE;
const KDATA_DESC: u64 = PRESENT | CODE_DATA | WRITABLE;
const UCODE_DESC: u64 = KCODE_DESC | DPL3;
const UDATA_DESC: u64 = KDATA_DESC | DPL3;

/// The GDT: null, kernel code/data, user code/data, 16-byte TSS slot.
static mut GDT: [u64; 7] = [0, KCODE_DESC, KDATA_DESC, UCODE_DESC, UDATA_DESC, 0, 0];

static mut TSS: TaskStateSegment = TaskStateSegment::zero();

/// Builds the two-qword TSS descriptor for `base`/`limit`.
fn tss_descriptor(base: u64, limit: u64) -> (u64, u64) {
    let low = PRESENT
        | (limit & 0xFFFF)
        | ((base & 0xFF_FFFF) << 16)
        | ((base >> 24 & 0xFF) << 56)
        | (0b1001 << 40); // available 64-bit TSS
    (low, base >> 32)
}

/// Install the GDT and TSS on the boot CPU.
///
/// # Safety
///
/// Must be called exactly once, before interrupts are enabled.
pub unsafe fn init() {
    // SAFETY: single CPU, called once with interrupts off.
    unsafe {
        let base = &TSS as *const _ as u64;
        let limit = (mem::size_of::<TaskStateSegment>() - 1) as u64;
        let (low, high) = tss_descriptor(base, limit);
        GDT[5] = low;
        GDT[6] = high;

        lgdt(&DescriptorTablePointer {
            limit: (mem::size_of_val(&GDT) - 1) as u16,
            base: GDT.as_ptr() as u64,
        });
        reload_segments(KCODE_SEL, KDATA_SEL);
        ltr(TSS_SEL);
    }
}

/// Point RSP0 at the current task's kernel stack top so the next trap
/// from ring 3 lands there.
pub fn set_kernel_stack(_held: &HeldInterrupts, top: usize) {
    // SAFETY: interrupts are off (witnessed by `_held`) and there is a
    // single CPU, so nothing else touches the TSS concurrently.
    unsafe { TSS.rsp0 = top as u64 };
}
