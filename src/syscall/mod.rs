//! System call dispatch.
//!
//! The trap layer lands here with the call number in rax and up to six
//! arguments in registers. Numbers outside the table are rejected with
//! EINVAL; handler errors come back as the negated errno in the return
//! register. Pointer arguments are validated against the caller's user
//! range by the copy routines, which also fault in on-demand pages the
//! way a direct touch would.

use alloc::string::String;
use alloc::vec::Vec;

use cstr_core::CStr;

use crate::addr::UVAddr;
use crate::arch::x86_64::trap::TrapFrame;
use crate::error::{Errno, Result};
use crate::fs::path;
use crate::param::{MAXARG, MAXPATH};
use crate::proc::with_current;

mod file;
mod proc;

pub fn dispatch(tf: &mut TrapFrame) {
    let ret = match tf.syscall_num() {
        1 => proc::sys_exit(tf),
        2 => proc::sys_fork(tf),
        3 => file::sys_read(tf),
        4 => file::sys_write(tf),
        5 => file::sys_open(tf),
        6 => file::sys_close(tf),
        7 => file::sys_exec(tf),
        8 => proc::sys_wait(tf),
        9 => proc::sys_kill(tf),
        10 => proc::sys_getpid(tf),
        11 => proc::sys_getppid(tf),
        12 => proc::sys_sleep(tf),
        13 => proc::sys_yield(tf),
        14 => proc::sys_gettime(tf),
        15 => file::sys_chdir(tf),
        16 => file::sys_getcwd(tf),
        17 => file::sys_mkdir(tf),
        18 => file::sys_rmdir(tf),
        19 => file::sys_stat(tf),
        20 => file::sys_fstat(tf),
        21 => file::sys_lseek(tf),
        22 => file::sys_dup(tf),
        23 => file::sys_dup2(tf),
        24 => file::sys_pipe(tf),
        25 => file::sys_link(tf),
        26 => file::sys_unlink(tf),
        27 => proc::sys_brk(tf),
        28 => proc::sys_mmap(tf),
        29 => proc::sys_munmap(tf),
        30 => proc::sys_getuid(tf),
        31 => proc::sys_setuid(tf),
        32 => proc::sys_signal(tf),
        33 => proc::sys_sigaction(tf),
        34 => proc::sys_sigprocmask(tf),
        35 => proc::sys_sigsuspend(tf),
        36 => proc::sys_alarm(tf),
        37 => file::sys_ls(tf),
        38 => file::sys_mount(tf),
        39 => proc::sys_kernel_info(tf),
        40 => file::sys_get_block_devices(tf),
        num => {
            log::warn!(
                "pid {:?}: unknown syscall {}",
                crate::proc::current_pid(),
                num
            );
            Err(Errno::EINVAL)
        }
    };

    match ret {
        Ok(v) => tf.set_return(v),
        Err(e) => tf.set_return(e.as_neg()),
    }
}

/// The n-th raw argument.
pub(super) fn argraw(tf: &TrapFrame, n: usize) -> usize {
    tf.syscall_arg(n)
}

/// The n-th argument as a 32-bit integer.
pub(super) fn argint(tf: &TrapFrame, n: usize) -> i32 {
    tf.syscall_arg(n) as i32
}

/// The n-th argument as a user pointer.
pub(super) fn argaddr(tf: &TrapFrame, n: usize) -> UVAddr {
    UVAddr::new(tf.syscall_arg(n))
}

/// Copy kernel bytes to a user pointer.
pub(super) fn copy_out_user(dst: UVAddr, src: &[u8]) -> Result<()> {
    with_current(|p| {
        p.memory
            .as_mut()
            .ok_or(Errno::EFAULT)?
            .copy_out(dst, src)
    })
}

/// Copy user bytes into a kernel buffer.
pub(super) fn copy_in_user(dst: &mut [u8], src: UVAddr) -> Result<()> {
    with_current(|p| {
        p.memory
            .as_mut()
            .ok_or(Errno::EFAULT)?
            .copy_in(dst, src)
    })
}

/// Fetch a NUL-terminated user string.
pub(super) fn fetch_str(addr: UVAddr) -> Result<String> {
    let mut buf = [0u8; MAXPATH];
    let len = with_current(|p| {
        p.memory
            .as_mut()
            .ok_or(Errno::EFAULT)?
            .copy_in_str(&mut buf, addr)
    })?;
    buf[len] = 0;
    let cstr = CStr::from_bytes_with_nul(&buf[..=len]).map_err(|_| Errno::EINVAL)?;
    let s = cstr.to_str().map_err(|_| Errno::EINVAL)?;
    Ok(String::from(s))
}

/// Fetch the n-th argument as a path, made absolute and normalized
/// against the caller's working directory.
pub(super) fn fetch_path(tf: &TrapFrame, n: usize) -> Result<String> {
    let raw = fetch_str(argaddr(tf, n))?;
    if raw.is_empty() {
        return Err(Errno::ENOENT);
    }
    let cwd = with_current(|p| p.cwd.clone());
    Ok(path::normalize(&raw, &cwd))
}

/// Fetch a NULL-terminated user array of string pointers (argv/envp).
/// A null array pointer reads as empty.
pub(super) fn fetch_str_vec(addr: UVAddr) -> Result<Vec<String>> {
    let mut out = Vec::new();
    if addr.is_null() {
        return Ok(out);
    }
    for i in 0..MAXARG {
        let mut ptr = [0u8; 8];
        copy_in_user(&mut ptr, addr.wrapping_add(i * 8))?;
        let p = usize::from_le_bytes(ptr);
        if p == 0 {
            return Ok(out);
        }
        out.push(fetch_str(UVAddr::new(p))?);
    }
    Err(Errno::ERANGE)
}
