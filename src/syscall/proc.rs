//! Process, memory and signal system calls.

use crate::arch::x86_64::trap::TrapFrame;
use crate::error::{Errno, Result};
use crate::param::{KERNEL_ARCH, KERNEL_NAME, KERNEL_VERSION};
use crate::proc::{
    self, check_sig, with_current, SIG_BLOCK, SIG_SETMASK, SIG_UNBLOCK,
};

use super::{argaddr, argint, argraw, copy_in_user, copy_out_user};

pub fn sys_exit(tf: &mut TrapFrame) -> Result<i64> {
    let code = argint(tf, 0);
    proc::exit(code)
}

pub fn sys_fork(tf: &mut TrapFrame) -> Result<i64> {
    let pid = proc::fork(tf)?;
    Ok(pid as i64)
}

pub fn sys_wait(tf: &mut TrapFrame) -> Result<i64> {
    let status_at = argaddr(tf, 0);
    let (pid, status) = proc::wait()?;
    if !status_at.is_null() {
        copy_out_user(status_at, &status.to_le_bytes())?;
    }
    Ok(pid as i64)
}

pub fn sys_kill(tf: &mut TrapFrame) -> Result<i64> {
    let pid = argint(tf, 0);
    let sig = argint(tf, 1);
    proc::kill(pid, sig)?;
    Ok(0)
}

pub fn sys_getpid(_tf: &mut TrapFrame) -> Result<i64> {
    Ok(proc::current_pid().ok_or(Errno::ESRCH)? as i64)
}

pub fn sys_getppid(_tf: &mut TrapFrame) -> Result<i64> {
    Ok(with_current(|p| p.ppid) as i64)
}

pub fn sys_sleep(tf: &mut TrapFrame) -> Result<i64> {
    let ms = argraw(tf, 0) as u64;
    if proc::sleep_ms(ms) {
        Ok(0)
    } else {
        Err(Errno::EINTR)
    }
}

pub fn sys_yield(_tf: &mut TrapFrame) -> Result<i64> {
    proc::yield_now();
    Ok(0)
}

/// Milliseconds since boot (the tick counter at 1000 Hz).
pub fn sys_gettime(_tf: &mut TrapFrame) -> Result<i64> {
    Ok(crate::trap::ticks() as i64)
}

pub fn sys_brk(tf: &mut TrapFrame) -> Result<i64> {
    let addr = argraw(tf, 0);
    with_current(|p| {
        let m = p.memory.as_mut().ok_or(Errno::ENOMEM)?;
        if addr == 0 {
            return Ok(m.brk() as i64);
        }
        Ok(m.set_brk(addr)? as i64)
    })
}

pub fn sys_mmap(tf: &mut TrapFrame) -> Result<i64> {
    // addr hint in arg 0 is ignored; the kernel places the region.
    let len = argraw(tf, 1);
    let va = with_current(|p| p.memory.as_mut().ok_or(Errno::ENOMEM)?.mmap(len))?;
    Ok(va as i64)
}

pub fn sys_munmap(tf: &mut TrapFrame) -> Result<i64> {
    let addr = argraw(tf, 0);
    let len = argraw(tf, 1);
    with_current(|p| p.memory.as_mut().ok_or(Errno::ENOMEM)?.munmap(addr, len))?;
    Ok(0)
}

pub fn sys_getuid(_tf: &mut TrapFrame) -> Result<i64> {
    Ok(with_current(|p| p.uid) as i64)
}

pub fn sys_setuid(tf: &mut TrapFrame) -> Result<i64> {
    let uid = argraw(tf, 0) as u16;
    with_current(|p| {
        if p.uid != 0 && p.uid != uid {
            return Err(Errno::EPERM);
        }
        p.uid = uid;
        Ok(0)
    })
}

/// signal(sig, handler) -> previous handler.
pub fn sys_signal(tf: &mut TrapFrame) -> Result<i64> {
    let sig = argint(tf, 0);
    check_sig(sig)?;
    if sig == proc::SIGKILL {
        return Err(Errno::EINVAL);
    }
    let handler = argraw(tf, 1);
    let old = with_current(|p| {
        core::mem::replace(&mut p.sig.handlers[(sig - 1) as usize], handler)
    });
    Ok(old as i64)
}

/// The userspace sigaction record.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct UserSigaction {
    handler: usize,
    mask: u32,
    flags: u32,
}

pub fn sys_sigaction(tf: &mut TrapFrame) -> Result<i64> {
    let sig = argint(tf, 0);
    check_sig(sig)?;
    if sig == proc::SIGKILL {
        return Err(Errno::EINVAL);
    }
    let act_at = argaddr(tf, 1);
    let old_at = argaddr(tf, 2);

    let old = with_current(|p| p.sig.handlers[(sig - 1) as usize]);
    if !old_at.is_null() {
        let rec = UserSigaction {
            handler: old,
            mask: 0,
            flags: 0,
        };
        copy_out_user(old_at, record_bytes(&rec))?;
    }
    if !act_at.is_null() {
        let mut raw = [0u8; core::mem::size_of::<UserSigaction>()];
        copy_in_user(&mut raw, act_at)?;
        let handler = usize::from_le_bytes(raw[..8].try_into().map_err(|_| Errno::EFAULT)?);
        with_current(|p| p.sig.handlers[(sig - 1) as usize] = handler);
    }
    Ok(0)
}

fn record_bytes(rec: &UserSigaction) -> &[u8] {
    // Plain repr(C) data headed for user space.
    unsafe {
        core::slice::from_raw_parts(
            rec as *const UserSigaction as *const u8,
            core::mem::size_of::<UserSigaction>(),
        )
    }
}

pub fn sys_sigprocmask(tf: &mut TrapFrame) -> Result<i64> {
    let how = argraw(tf, 0);
    let set_at = argaddr(tf, 1);
    let old_at = argaddr(tf, 2);

    let old = with_current(|p| p.sig.mask);
    if !old_at.is_null() {
        copy_out_user(old_at, &old.to_le_bytes())?;
    }
    if !set_at.is_null() {
        let mut raw = [0u8; 4];
        copy_in_user(&mut raw, set_at)?;
        let set = u32::from_le_bytes(raw);
        with_current(|p| {
            p.sig.mask = match how {
                SIG_BLOCK => p.sig.mask | set,
                SIG_UNBLOCK => p.sig.mask & !set,
                SIG_SETMASK => set,
                _ => return Err(Errno::EINVAL),
            };
            Ok(())
        })?;
    }
    Ok(0)
}

/// Park with a temporary mask until a deliverable signal arrives.
/// Always "fails" with EINTR, per contract.
pub fn sys_sigsuspend(tf: &mut TrapFrame) -> Result<i64> {
    let mask_at = argaddr(tf, 0);
    let mut raw = [0u8; 4];
    copy_in_user(&mut raw, mask_at)?;
    let tmp_mask = u32::from_le_bytes(raw);

    let me = proc::current_pid().ok_or(Errno::ESRCH)?;
    let saved = with_current(|p| core::mem::replace(&mut p.sig.mask, tmp_mask));
    loop {
        if with_current(|p| p.sig.deliverable() != 0 || p.killed) {
            break;
        }
        // Any signal delivery wakes blocked tasks.
        let _ = proc::sleep_on(sigsuspend_chan(me), || {});
    }
    with_current(|p| p.sig.mask = saved);
    Err(Errno::EINTR)
}

fn sigsuspend_chan(pid: i32) -> usize {
    0x5157_0000_0000 + pid as usize
}

pub fn sys_alarm(tf: &mut TrapFrame) -> Result<i64> {
    let secs = argraw(tf, 0) as u64;
    let now = crate::trap::ticks();
    let prev = with_current(|p| {
        let prev = p.alarm_at.take();
        if secs > 0 {
            p.alarm_at = Some(now + secs * crate::param::TICK_HZ);
        }
        prev
    });
    // Seconds remaining of a previously pending alarm.
    Ok(prev.map_or(0, |at| (at.saturating_sub(now)) / crate::param::TICK_HZ) as i64)
}

/// The record `kernel_info` fills.
#[repr(C)]
struct KernelInfo {
    name: [u8; 16],
    version: [u8; 16],
    arch: [u8; 8],
    uptime_ticks: u64,
    nproc: u32,
    _pad: u32,
}

pub fn sys_kernel_info(tf: &mut TrapFrame) -> Result<i64> {
    let uva = argaddr(tf, 0);

    fn fill(dst: &mut [u8], s: &str) {
        let n = s.len().min(dst.len() - 1);
        dst[..n].copy_from_slice(&s.as_bytes()[..n]);
    }

    let mut info = KernelInfo {
        name: [0; 16],
        version: [0; 16],
        arch: [0; 8],
        uptime_ticks: crate::trap::ticks(),
        nproc: proc::live_pids().len() as u32,
        _pad: 0,
    };
    fill(&mut info.name, KERNEL_NAME);
    fill(&mut info.version, KERNEL_VERSION);
    fill(&mut info.arch, KERNEL_ARCH);

    // Plain repr(C) data headed for user space.
    let bytes = unsafe {
        core::slice::from_raw_parts(
            &info as *const KernelInfo as *const u8,
            core::mem::size_of::<KernelInfo>(),
        )
    };
    copy_out_user(uva, bytes)?;
    Ok(0)
}
