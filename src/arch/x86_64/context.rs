//! Kernel context switching.
//!
//! `swtch` saves the callee-saved registers of the outgoing task into its
//! `Context` and restores the incoming one, resuming at the saved rip.
//! Everything caller-saved is already on the kernel stack at the call
//! site, so this is all a switch needs.

use core::arch::global_asm;

/// Callee-saved register file of a suspended kernel control flow.
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub rsp: usize,
    pub rbp: usize,
    pub rbx: usize,
    pub r12: usize,
    pub r13: usize,
    pub r14: usize,
    pub r15: usize,
    pub rip: usize,
}

impl Context {
    /// A context that, when switched to, starts running `entry` on the
    /// kernel stack topped at `kstack_top`.
    pub fn initial(kstack_top: usize, entry: usize) -> Self {
        Self {
            // Leave one slot for swtch's return-address store.
            rsp: kstack_top - 8,
            rip: entry,
            ..Self::default()
        }
    }
}

global_asm!(
    r#"
.section .text
.globl swtch
.align 8
swtch:
    mov [rdi + 0x00], rsp
    mov [rdi + 0x08], rbp
    mov [rdi + 0x10], rbx
    mov [rdi + 0x18], r12
    mov [rdi + 0x20], r13
    mov [rdi + 0x28], r14
    mov [rdi + 0x30], r15
    mov rax, [rsp]
    mov [rdi + 0x38], rax

    mov rsp, [rsi + 0x00]
    mov rbp, [rsi + 0x08]
    mov rbx, [rsi + 0x10]
    mov r12, [rsi + 0x18]
    mov r13, [rsi + 0x20]
    mov r14, [rsi + 0x28]
    mov r15, [rsi + 0x30]
    mov rax, [rsi + 0x38]
    mov [rsp], rax
    ret
"#
);

extern "C" {
    /// Save into `out`, restore from `in_`. Interrupts must be off.
    pub fn swtch(out: *mut Context, in_: *const Context);
}
