//! Processes.
//!
//! One record per task in a pid-keyed table; parent links are pids, so
//! the process graph has no pointer cycles and a ZOMBIE is just a
//! record with no running context. The table is guarded by interrupt
//! disabling (single CPU), the scheduler owns readiness, and all
//! context switching funnels through `reschedule` in procs.rs.

use alloc::string::String;

use crate::arch::x86_64::context::Context;
use crate::error::{Errno, Result};
use crate::file::FdTable;
use crate::kalloc::Frame;
use crate::param::{MAXPROCNAME, NSIG};
use crate::sched::Pid;
use crate::vm::UserMemory;

mod procs;

pub use procs::*;

/// Task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Allocated, not yet runnable.
    New,
    Ready,
    Running,
    /// Timed sleep with a wakeup tick.
    Sleeping,
    /// Parked on a wait channel.
    Blocked,
    /// Exited, awaiting reap by the parent.
    Zombie,
    /// Slot being torn down.
    Dead,
}

impl ProcState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Sleeping => "sleeping",
            Self::Blocked => "blocked",
            Self::Zombie => "zombie",
            Self::Dead => "dead",
        }
    }
}

pub const SIGINT: i32 = 2;
pub const SIGKILL: i32 = 9;
pub const SIGSEGV: i32 = 11;
pub const SIGALRM: i32 = 14;
pub const SIGTERM: i32 = 15;
pub const SIGCHLD: i32 = 17;

/// Handler dispositions; anything else is a user handler address.
pub const SIG_DFL: usize = 0;
pub const SIG_IGN: usize = 1;

/// How `sigprocmask` edits the mask.
pub const SIG_BLOCK: usize = 0;
pub const SIG_UNBLOCK: usize = 1;
pub const SIG_SETMASK: usize = 2;

const fn sigbit(sig: i32) -> u32 {
    1 << (sig as u32 - 1)
}

/// Per-task signal state.
#[derive(Clone)]
pub struct SigState {
    pub pending: u32,
    pub mask: u32,
    pub handlers: [usize; NSIG],
}

impl SigState {
    pub fn new() -> Self {
        Self {
            pending: 0,
            mask: 0,
            handlers: [SIG_DFL; NSIG],
        }
    }

    pub fn post(&mut self, sig: i32) {
        if (1..=NSIG as i32).contains(&sig) {
            self.pending |= sigbit(sig);
        }
    }

    pub fn clear(&mut self, sig: i32) {
        self.pending &= !sigbit(sig);
    }

    /// Deliverable pending signals: pending and not masked. SIGKILL
    /// cannot be masked.
    pub fn deliverable(&self) -> u32 {
        self.pending & (!self.mask | sigbit(SIGKILL))
    }

    /// Lowest-numbered deliverable signal.
    pub fn next_deliverable(&self) -> Option<i32> {
        let d = self.deliverable();
        if d == 0 {
            None
        } else {
            Some(d.trailing_zeros() as i32 + 1)
        }
    }

    /// What fork hands the child: dispositions and mask, no pendings.
    pub fn clone_for_fork(&self) -> Self {
        Self {
            pending: 0,
            mask: self.mask,
            handlers: self.handlers,
        }
    }
}

/// One process.
pub struct Proc {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: [u8; MAXPROCNAME],
    pub uid: u16,
    pub gid: u16,
    pub state: ProcState,
    /// Exit status, valid in ZOMBIE.
    pub xstate: i32,
    pub nice: i8,
    pub priority: u8,

    /// Saved kernel flow; restored by swtch.
    pub context: Context,
    /// First frame of the contiguous kernel stack.
    pub kstack: Frame,
    /// User address space; kernel-only tasks carry none.
    pub memory: Option<UserMemory>,

    pub files: FdTable,
    pub cwd: String,
    pub sig: SigState,

    /// Wait channel this task is parked on, 0 when none.
    pub chan: usize,
    /// SIGALRM deadline in ticks.
    pub alarm_at: Option<u64>,
    /// Set by SIGKILL; honored at every kernel boundary.
    pub killed: bool,
}

impl Proc {
    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let n = bytes.len().min(MAXPROCNAME - 1);
        self.name = [0; MAXPROCNAME];
        self.name[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(0);
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }
}

/// Argument error taxonomy used by the signal syscalls.
pub fn check_sig(sig: i32) -> Result<()> {
    if (1..=NSIG as i32).contains(&sig) {
        Ok(())
    } else {
        Err(Errno::EINVAL)
    }
}
