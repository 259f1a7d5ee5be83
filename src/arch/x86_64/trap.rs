//! Low-level trap entry.
//!
//! 256 per-vector stubs normalize the stack (dummy error code where the
//! CPU pushes none), record the vector number and funnel into `alltraps`,
//! which saves the register file as a `TrapFrame` and calls into the
//! arch-independent handler. The return path restores the frame and
//! `iretq`s, so a handler may rewrite user state (signal death, fork
//! return values) by mutating the frame.

use core::arch::global_asm;

use bitflags::bitflags;

// Exceptions 8, 10-14 and 17 push a hardware error code; every other
// vector gets a dummy zero so the frame layout is uniform.
global_asm!(
    r#"
.altmacro
.macro vector num
    .align 8
vector\num:
    .if (\num == 8) || ((\num >= 10) && (\num <= 14)) || (\num == 17)
    .else
    push 0
    .endif
    push \num
    jmp alltraps
.endm

.section .text
.set i, 0
.rept 256
    vector %i
    .set i, i+1
.endr

.align 8
alltraps:
    push rax
    push rcx
    push rdx
    push rbx
    push rbp
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    mov rdi, rsp
    call trap_dispatch
.globl trapret
trapret:
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rbp
    pop rbx
    pop rdx
    pop rcx
    pop rax
    add rsp, 16
    iretq

.macro vecaddr num
    .quad vector\num
.endm

.section .rodata
.globl vectors
.align 8
vectors:
.set i, 0
.rept 256
    vecaddr %i
    .set i, i+1
.endr
"#
);

/// Saved register file at trap entry, in push order.
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct TrapFrame {
    pub r15: usize,
    pub r14: usize,
    pub r13: usize,
    pub r12: usize,
    pub r11: usize,
    pub r10: usize,
    pub r9: usize,
    pub r8: usize,
    pub rdi: usize,
    pub rsi: usize,
    pub rbp: usize,
    pub rbx: usize,
    pub rdx: usize,
    pub rcx: usize,
    pub rax: usize,

    pub vector: usize,
    pub err: usize,

    // Pushed by the CPU.
    pub rip: usize,
    pub cs: usize,
    pub rflags: usize,
    pub rsp: usize,
    pub ss: usize,
}

impl TrapFrame {
    /// Did this trap arrive from ring 3?
    pub fn from_user(&self) -> bool {
        self.cs & 3 == 3
    }

    /// The n-th syscall argument (rdi, rsi, rdx, r10, r8, r9).
    pub fn syscall_arg(&self, n: usize) -> usize {
        match n {
            0 => self.rdi,
            1 => self.rsi,
            2 => self.rdx,
            3 => self.r10,
            4 => self.r8,
            5 => self.r9,
            _ => panic!("syscall_arg"),
        }
    }

    /// Syscall number, taken from rax.
    pub fn syscall_num(&self) -> usize {
        self.rax
    }

    /// Place a syscall return value (or negated errno) in rax.
    pub fn set_return(&mut self, v: i64) {
        self.rax = v as usize;
    }
}

bitflags! {
    /// Page-fault error code bits.
    pub struct PageFaultError: usize {
        /// Fault on a present page (protection) rather than a miss.
        const PRESENT = 1 << 0;
        /// Write access.
        const WRITE = 1 << 1;
        /// Fault taken in ring 3.
        const USER = 1 << 2;
        /// Reserved bit set in a paging structure.
        const RESERVED = 1 << 3;
        /// Instruction fetch.
        const INSTRUCTION = 1 << 4;
    }
}

/// All traps land here with interrupts off.
#[no_mangle]
extern "C" fn trap_dispatch(tf: &mut TrapFrame) {
    crate::trap::handle(tf);
}

/// Enter ring 3 by unwinding through the trap return path with `tf` as
/// the frame to restore. Used for the first return of a new task and
/// after exec replaces the user image.
///
/// # Safety
///
/// `tf` must be a fully-formed frame at the top of the current kernel
/// stack, with user segment selectors and a valid user rip/rsp.
pub unsafe fn return_to_user(tf: *mut TrapFrame) -> ! {
    unsafe {
        core::arch::asm!(
            "mov rsp, {tf}",
            "jmp trapret",
            tf = in(reg) tf,
            options(noreturn),
        );
    }
}
