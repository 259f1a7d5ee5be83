//! The process table, context switching, and task lifecycle.
//!
//! Single CPU: the table is a static guarded by interrupt disabling,
//! and every switch happens at exactly one level of interrupt-off
//! depth, with the interrupts-were-enabled flag saved on the outgoing
//! task's stack. The boot flow becomes the idle task once `init` is
//! spawned; `pick_next` falling through to idle is what keeps the CPU
//! halted instead of spinning.

use alloc::string::String;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::arch::x86_64::context::{swtch, Context};
use crate::arch::x86_64::gdt::{self, UCODE_SEL, UDATA_SEL};
use crate::arch::x86_64::trap::{return_to_user, TrapFrame};
use crate::arch::x86_64::vm::install_kernel_root;
use crate::error::{Errno, Result};
use crate::file::{File, FdTable};
use crate::fs::sysfs::SYS_VARS;
use crate::fs::OpenFlags;
use crate::intr::{self, HeldInterrupts};
use crate::kalloc::{self, frame_to_pa};
use crate::lock::Spinlock;
use crate::page::PGSIZE;
use crate::param::{NPROC, TICK_HZ};
use crate::sched::{Pid, SchedPolicy, Scheduler};
use crate::vm::UserMemory;

use super::{Proc, ProcState, SigState, SIGALRM, SIGCHLD, SIGKILL, SIG_DFL, SIG_IGN};

/// Kernel stack pages per task.
pub const KSTACK_PAGES: usize = 4;

/// The idle flow (the boot stack) is "pid 0".
pub const IDLE_PID: Pid = 0;

/// pid 1; orphans are reparented here.
pub const INIT_PID: Pid = 1;

/// Wait channels derived from pids (parent waits on its own).
const WAIT_CHAN_BASE: usize = 0x57A1_7000_0000;

const fn wait_chan(pid: Pid) -> usize {
    WAIT_CHAN_BASE + pid as usize
}

pub struct ProcTable {
    slots: [Option<Proc>; NPROC],
    next_pid: Pid,
}

impl ProcTable {
    const fn new() -> Self {
        const NONE: Option<Proc> = None;
        Self {
            slots: [NONE; NPROC],
            next_pid: 1,
        }
    }

    fn alloc_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    pub fn get(&self, pid: Pid) -> Option<&Proc> {
        self.slots
            .iter()
            .flatten()
            .find(|p| p.pid == pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Proc> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|p| p.pid == pid)
    }

    fn insert(&mut self, proc: Proc) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(Errno::EAGAIN)?;
        *slot = Some(proc);
        Ok(())
    }

    fn remove(&mut self, pid: Pid) -> Option<Proc> {
        for slot in self.slots.iter_mut() {
            if slot.as_ref().map_or(false, |p| p.pid == pid) {
                return slot.take();
            }
        }
        None
    }

    fn live_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Walk the parent chain: is `pid` below `ancestor`? The chain is
    /// acyclic by construction (children always carry higher pids than
    /// the parent had at fork time, and reparenting only targets init).
    pub fn is_descendant_of(&self, pid: Pid, ancestor: Pid) -> bool {
        let mut at = pid;
        while let Some(p) = self.get(at) {
            if p.ppid == ancestor {
                return true;
            }
            if p.ppid == at || at == INIT_PID {
                return false;
            }
            at = p.ppid;
        }
        false
    }
}

struct TableCell(UnsafeCell<ProcTable>);

// SAFETY: all access goes through `table()` under disabled interrupts
// on the single CPU.
unsafe impl Sync for TableCell {}

static TABLE: TableCell = TableCell(UnsafeCell::new(ProcTable::new()));

/// Currently running pid; IDLE_PID when the idle flow owns the CPU.
static CURRENT: AtomicI32 = AtomicI32::new(IDLE_PID);

static SCHEDULER: Spinlock<Option<Scheduler>> = Spinlock::new("SCHED", None);

struct CtxCell(UnsafeCell<Context>);

// SAFETY: only touched by swtch under disabled interrupts.
unsafe impl Sync for CtxCell {}

/// The idle flow's saved context.
static IDLE_CTX: CtxCell = CtxCell(UnsafeCell::new(Context {
    rsp: 0,
    rbp: 0,
    rbx: 0,
    r12: 0,
    r13: 0,
    r14: 0,
    r15: 0,
    rip: 0,
}));

/// Exclusive table access. Sound because interrupts are off (witnessed
/// by `held`) and kernel control flow is non-preemptive.
fn table(_held: &HeldInterrupts) -> &'static mut ProcTable {
    // SAFETY: see above.
    unsafe { &mut *TABLE.0.get() }
}

/// Install the scheduling policy. Once, at boot.
pub fn init(policy: SchedPolicy) {
    *SCHEDULER.lock() = Some(Scheduler::new(policy));
}

fn with_sched<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = SCHEDULER.lock();
    f(guard.as_mut().expect("scheduler not initialized"))
}

pub fn current_pid() -> Option<Pid> {
    match CURRENT.load(Ordering::Relaxed) {
        IDLE_PID => None,
        pid => Some(pid),
    }
}

/// Run `f` on the current process. Panics when called from the idle
/// flow.
pub fn with_current<R>(f: impl FnOnce(&mut Proc) -> R) -> R {
    let held = HeldInterrupts::new();
    let pid = CURRENT.load(Ordering::Relaxed);
    let proc = table(&held).get_mut(pid).expect("no current process");
    f(proc)
}

/// Run `f` on the whole table with interrupts off.
pub fn with_table<R>(f: impl FnOnce(&mut ProcTable) -> R) -> R {
    let held = HeldInterrupts::new();
    f(table(&held))
}

/// Switch away from the current flow. The caller has already moved the
/// outgoing task out of RUNNING (state + scheduler queues); interrupts
/// are off at exactly depth `held`.
unsafe fn reschedule(held: &HeldInterrupts) {
    let cur = CURRENT.load(Ordering::Relaxed);
    let next = with_sched(|s| s.pick_next()).unwrap_or(IDLE_PID);
    if next == cur {
        // Sole runnable task went right back on the CPU.
        if cur != IDLE_PID {
            if let Some(p) = table(held).get_mut(cur) {
                p.state = ProcState::Running;
            }
        }
        return;
    }

    let t = table(held);
    let out_ctx: *mut Context = if cur == IDLE_PID {
        IDLE_CTX.0.get()
    } else {
        &mut t.get_mut(cur).expect("outgoing task vanished").context
    };
    let in_ctx: *const Context = if next == IDLE_PID {
        IDLE_CTX.0.get()
    } else {
        let p = t.get_mut(next).expect("incoming task vanished");
        // A saved stack pointer outside the task's kernel stack means
        // the stack was overrun while it ran.
        let base = frame_to_pa(p.kstack);
        if !(base..=kstack_top(p.kstack)).contains(&p.context.rsp) {
            panic!(
                "pid {}: kernel stack pointer {:#x} out of bounds",
                p.pid, p.context.rsp
            );
        }
        p.state = ProcState::Running;
        gdt::set_kernel_stack(held, kstack_top(p.kstack));
        match &p.memory {
            // SAFETY: the address space lives as long as the task.
            Some(m) => unsafe { m.install() },
            None => unsafe { install_kernel_root() },
        }
        &p.context
    };
    if next == IDLE_PID {
        // SAFETY: boot built the kernel root.
        unsafe { install_kernel_root() };
    }
    CURRENT.store(next, Ordering::Relaxed);

    // The enable flag belongs to this task; carry it across on our
    // stack.
    let saved = intr::saved_intena();
    // SAFETY: both contexts are valid; interrupts are off.
    unsafe { swtch(out_ctx, in_ctx) };
    intr::restore_intena(saved);
}

fn kstack_top(frame: usize) -> usize {
    frame_to_pa(frame) + KSTACK_PAGES * PGSIZE
}

/// Voluntarily give up the CPU.
pub fn yield_now() {
    let held = HeldInterrupts::new();
    let cur = CURRENT.load(Ordering::Relaxed);
    if cur != IDLE_PID {
        if let Some(p) = table(&held).get_mut(cur) {
            p.state = ProcState::Ready;
        }
        with_sched(|s| {
            let _ = s.yield_current();
        });
    }
    // SAFETY: depth is exactly this `held`.
    unsafe { reschedule(&held) };
}

/// Sleep for `ms` milliseconds (`0` behaves as yield). Returns `false`
/// when interrupted by a signal.
pub fn sleep_ms(ms: u64) -> bool {
    if ms == 0 {
        yield_now();
        return true;
    }
    let deadline = crate::trap::ticks() + (ms * TICK_HZ + 999) / 1000;
    let held = HeldInterrupts::new();
    let cur = CURRENT.load(Ordering::Relaxed);
    if let Some(p) = table(&held).get_mut(cur) {
        p.state = ProcState::Sleeping;
    }
    with_sched(|s| {
        let _ = s.suspend_current(Some(deadline));
    });
    // SAFETY: depth is exactly this `held`.
    unsafe { reschedule(&held) };
    !with_current_killable(&held, cur)
}

fn with_current_killable(held: &HeldInterrupts, pid: Pid) -> bool {
    table(held)
        .get_mut(pid)
        .map_or(false, |p| p.killed || p.sig.deliverable() != 0)
}

/// Park the current task on `chan`. `release` runs after the sleeper
/// is registered, with interrupts still off, so a paired wakeup can
/// never be lost. Returns `false` when woken by a signal.
pub fn sleep_on(chan: usize, release: impl FnOnce()) -> bool {
    let held = HeldInterrupts::new();
    let cur = CURRENT.load(Ordering::Relaxed);
    if cur == IDLE_PID {
        panic!("idle flow tried to sleep");
    }
    {
        let p = table(&held).get_mut(cur).expect("no current process");
        // A signal that raced in ahead of the park would be lost until
        // the next wakeup; bail instead of sleeping through it.
        if p.killed || p.sig.deliverable() != 0 {
            release();
            return false;
        }
        p.state = ProcState::Blocked;
        p.chan = chan;
    }
    with_sched(|s| {
        let _ = s.suspend_current(None);
    });
    release();
    // SAFETY: depth is exactly this `held` (release dropped its own).
    unsafe { reschedule(&held) };
    let p = table(&held).get_mut(cur).expect("current vanished");
    p.chan = 0;
    !(p.killed || p.sig.deliverable() != 0)
}

/// Wake every task parked on `chan`.
pub fn wakeup(chan: usize) {
    let held = HeldInterrupts::new();
    let t = table(&held);
    let mut woken: [Pid; NPROC] = [0; NPROC];
    let mut n = 0;
    for p in t.slots.iter_mut().flatten() {
        if p.state == ProcState::Blocked && p.chan == chan {
            p.state = ProcState::Ready;
            woken[n] = p.pid;
            n += 1;
        }
    }
    with_sched(|s| {
        for &pid in &woken[..n] {
            s.wake(pid);
        }
    });
}

/// Timer hook: account the tick, release due sleepers, post alarms.
/// Returns whether the current task should be preempted.
pub fn on_tick(now: u64) -> bool {
    let held = HeldInterrupts::new();
    let outcome = with_sched(|s| s.tick(now));
    let t = table(&held);
    for pid in &outcome.woken {
        if let Some(p) = t.get_mut(*pid) {
            if p.state == ProcState::Sleeping {
                p.state = ProcState::Ready;
            }
        }
    }
    // Alarms.
    let mut to_wake: [Pid; NPROC] = [0; NPROC];
    let mut n = 0;
    for p in t.slots.iter_mut().flatten() {
        if p.alarm_at.map_or(false, |at| at <= now) {
            p.alarm_at = None;
            p.sig.post(SIGALRM);
            if matches!(p.state, ProcState::Sleeping | ProcState::Blocked) {
                p.state = ProcState::Ready;
                to_wake[n] = p.pid;
                n += 1;
            }
        }
    }
    if n > 0 {
        with_sched(|s| {
            for &pid in &to_wake[..n] {
                s.wake(pid);
            }
        });
    }
    outcome.preempt
}

/// The idle loop: what the boot flow does forever after init is up.
pub fn idle_loop() -> ! {
    loop {
        crate::arch::intr_on();
        crate::arch::wait_for_interrupt();
        let runnable = with_sched(|s| s.runnable_count());
        if runnable > 0 {
            let held = HeldInterrupts::new();
            // SAFETY: idle switches at depth 1 like everyone else.
            unsafe { reschedule(&held) };
        }
    }
}

/// Allocate a kernel stack.
fn alloc_kstack() -> Result<usize> {
    kalloc::alloc_contiguous(KSTACK_PAGES).ok_or(Errno::ENOMEM)
}

fn free_kstack(frame: usize) {
    for f in frame..frame + KSTACK_PAGES {
        kalloc::free_frame(f);
    }
}

/// First entry of every forked (or spawned) task: finish the switch
/// protocol and drop to user mode through the trap frame parked at the
/// top of the kernel stack.
extern "C" fn forkret() -> ! {
    // The switch left one interrupt-off level with no witness.
    intr::restore_intena(true);
    // SAFETY: exactly the level reschedule left behind.
    drop(unsafe { HeldInterrupts::assume_held() });

    let tf = with_current(|p| trap_frame_slot(p.kstack));
    // SAFETY: fork/spawn placed a complete frame there.
    unsafe { return_to_user(tf) }
}

/// Where a task's initial trap frame lives: top of its kernel stack.
fn trap_frame_slot(kstack: usize) -> *mut TrapFrame {
    ((kstack_top(kstack) - core::mem::size_of::<TrapFrame>()) & !0xF) as *mut TrapFrame
}

/// Build a user trap frame for a first entry at `rip`/`rsp`.
fn initial_trap_frame(rip: usize, rsp: usize) -> TrapFrame {
    TrapFrame {
        rip,
        rsp,
        cs: UCODE_SEL as usize,
        ss: UDATA_SEL as usize,
        // IF set plus the always-one bit.
        rflags: 0x202,
        ..TrapFrame::default()
    }
}

/// A user program that calls exec("/init") and exits on failure.
/// Hand-assembled for the syscall ABI (number in rax, int 0x80).
const INITCODE: [u8; 44] = [
    0x48, 0xC7, 0xC0, 0x07, 0x00, 0x00, 0x00, // mov rax, 7 (exec)
    0x48, 0x8D, 0x3D, 0x18, 0x00, 0x00, 0x00, // lea rdi, [rip+24] (path)
    0x31, 0xF6, // xor esi, esi
    0x31, 0xD2, // xor edx, edx
    0xCD, 0x80, // int 0x80
    0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00, // mov rax, 1 (exit)
    0x48, 0xC7, 0xC7, 0x01, 0x00, 0x00, 0x00, // mov rdi, 1
    0xCD, 0x80, // int 0x80
    0xEB, 0xFE, // jmp .
    b'/', b'i', b'n', b'i', b't', 0,
];

/// Create pid 1 running INITCODE with the console on 0/1/2.
pub fn spawn_init() -> Result<()> {
    let mut memory = UserMemory::new()?;
    let base = crate::arch::x86_64::memlayout::USER_BASE;
    memory.load_segment(base, &INITCODE, INITCODE.len())?;
    let stack_top = memory.setup_stack()?;
    memory.set_heap_base(base + PGSIZE);

    let kstack = alloc_kstack()?;
    let tf_slot = trap_frame_slot(kstack);
    // SAFETY: freshly allocated, identity-mapped stack memory.
    unsafe { tf_slot.write(initial_trap_frame(base, stack_top)) };

    let mut files = FdTable::new();
    let console = File::open(
        crate::kernel::vfs(),
        "/dev/console",
        OpenFlags::RDWR,
        0,
    )?;
    let _ = files.alloc(console.clone())?;
    let _ = files.alloc(console.clone())?;
    let _ = files.alloc(console)?;

    let mut proc = Proc {
        pid: 0,
        ppid: 0,
        name: [0; crate::param::MAXPROCNAME],
        uid: 0,
        gid: 0,
        state: ProcState::Ready,
        xstate: 0,
        nice: 0,
        priority: 1,
        context: Context::initial(tf_slot as usize, forkret as usize),
        kstack,
        memory: Some(memory),
        files,
        cwd: String::from("/"),
        sig: SigState::new(),
        chan: 0,
        alarm_at: None,
        killed: false,
    };
    proc.set_name("init");

    with_table(|t| {
        let pid = t.alloc_pid();
        debug_assert_eq!(pid, INIT_PID);
        proc.pid = pid;
        proc.ppid = pid;
        t.insert(proc)
    })?;
    with_sched(|s| s.add_task(INIT_PID, 0, 1));
    Ok(())
}

/// fork: duplicate the calling task. The child resumes in user mode
/// with 0 in its return register; the parent gets the child's pid.
pub fn fork(tf: &TrapFrame) -> Result<Pid> {
    // Expensive copies happen outside the table lock.
    let (memory, files, cwd, sig, name, uid, gid, nice, priority, ppid) = with_current(|p| {
        Ok::<_, Errno>((
            p.memory.as_ref().ok_or(Errno::EINVAL)?.clone_for_fork()?,
            p.files.clone_for_fork(),
            p.cwd.clone(),
            p.sig.clone_for_fork(),
            p.name,
            p.uid,
            p.gid,
            p.nice,
            p.priority,
            p.pid,
        ))
    })?;

    let kstack = alloc_kstack()?;
    let kstack_guard = scopeguard::guard(kstack, |k| free_kstack(k));

    let tf_slot = trap_frame_slot(kstack);
    let mut child_tf = *tf;
    child_tf.rax = 0;
    // SAFETY: the new kernel stack is owned and identity-mapped.
    unsafe { tf_slot.write(child_tf) };

    let proc = Proc {
        pid: 0,
        ppid,
        name,
        uid,
        gid,
        state: ProcState::Ready,
        xstate: 0,
        nice,
        priority,
        context: Context::initial(tf_slot as usize, forkret as usize),
        kstack,
        memory: Some(memory),
        files,
        cwd,
        sig,
        chan: 0,
        alarm_at: None,
        killed: false,
    };

    let pid = with_table(|t| {
        if t.live_count() >= SYS_VARS.max_processes() {
            return Err(Errno::EAGAIN);
        }
        let pid = t.alloc_pid();
        let mut proc = proc;
        proc.pid = pid;
        t.insert(proc)?;
        Ok(pid)
    })?;

    scopeguard::ScopeGuard::into_inner(kstack_guard);
    with_sched(|s| s.add_task(pid, nice, priority));
    Ok(pid)
}

/// exit: become a zombie and switch away for good.
pub fn exit(code: i32) -> ! {
    let pid = current_pid().expect("idle flow exiting");
    if pid == INIT_PID {
        panic!("init exiting with {}", code);
    }

    // Release user-held resources while interrupts are still on: file
    // closes may touch the disk.
    let (mut files, memory) = with_current(|p| {
        (
            core::mem::replace(&mut p.files, FdTable::new()),
            p.memory.take(),
        )
    });
    files.close_all();
    // The address space being dropped is still installed; step off it
    // first.
    // SAFETY: the kernel root is always valid.
    unsafe { install_kernel_root() };
    drop(memory);

    let held = HeldInterrupts::new();
    {
        let t = table(&held);
        // Orphans go to init.
        let mut orphaned_zombie = false;
        for p in t.slots.iter_mut().flatten() {
            if p.ppid == pid {
                p.ppid = INIT_PID;
                orphaned_zombie |= p.state == ProcState::Zombie;
            }
        }
        let me = t.get_mut(pid).expect("exiting task vanished");
        me.state = ProcState::Zombie;
        me.xstate = code;
        let ppid = me.ppid;
        if let Some(parent) = t.get_mut(ppid) {
            parent.sig.post(SIGCHLD);
        }
        drop(t);
        if orphaned_zombie {
            wakeup_locked(&held, wait_chan(INIT_PID));
        }
        wakeup_locked(&held, wait_chan(ppid));
    }
    with_sched(|s| s.remove_task(pid));

    // SAFETY: depth is exactly this `held`; we never come back.
    unsafe { reschedule(&held) };
    unreachable!("zombie ran again");
}

/// `wakeup` body for callers that already hold interrupts off.
fn wakeup_locked(held: &HeldInterrupts, chan: usize) {
    let t = table(held);
    let mut woken: [Pid; NPROC] = [0; NPROC];
    let mut n = 0;
    for p in t.slots.iter_mut().flatten() {
        if p.state == ProcState::Blocked && p.chan == chan {
            p.state = ProcState::Ready;
            woken[n] = p.pid;
            n += 1;
        }
    }
    with_sched(|s| {
        for &pid in &woken[..n] {
            s.wake(pid);
        }
    });
}

/// wait: block until a child exits, reap it, return (pid, status).
pub fn wait() -> Result<(Pid, i32)> {
    let me = current_pid().ok_or(Errno::ESRCH)?;
    loop {
        let held = HeldInterrupts::new();
        let t = table(&held);
        let mut have_kids = false;
        let mut zombie: Option<Pid> = None;
        for p in t.slots.iter().flatten() {
            if p.ppid == me && p.pid != me {
                have_kids = true;
                if p.state == ProcState::Zombie {
                    zombie = Some(p.pid);
                    break;
                }
            }
        }

        if let Some(zpid) = zombie {
            let dead = t.remove(zpid).expect("zombie vanished");
            drop(held);
            // The zombie's kernel stack is finally free.
            free_kstack(dead.kstack);
            with_current(|p| p.sig.clear(SIGCHLD));
            return Ok((zpid, dead.xstate));
        }
        if !have_kids {
            return Err(Errno::ECHILD);
        }
        if with_current_killable(&held, me) {
            return Err(Errno::EINTR);
        }

        // Sleep until some child's exit pokes our channel. The held
        // section ends only after the sleeper is registered.
        {
            let p = t.get_mut(me).expect("no current process");
            p.state = ProcState::Blocked;
            p.chan = wait_chan(me);
        }
        with_sched(|s| {
            let _ = s.suspend_current(None);
        });
        // SAFETY: depth is exactly this `held`.
        unsafe { reschedule(&held) };
        drop(held);
    }
}

/// kill: deliver `sig` to `pid`. Permission is self/descendants, or
/// uid 0. `sig` 0 probes existence only.
pub fn kill(target: Pid, sig: i32) -> Result<()> {
    if sig != 0 {
        super::check_sig(sig)?;
    }
    let me = current_pid().ok_or(Errno::ESRCH)?;
    with_table(|t| {
        let my_uid = t.get(me).ok_or(Errno::ESRCH)?.uid;
        let allowed = my_uid == 0
            || target == me
            || t.is_descendant_of(target, me);
        let p = t.get_mut(target).ok_or(Errno::ESRCH)?;
        if p.state == ProcState::Zombie || p.state == ProcState::Dead {
            return Err(Errno::ESRCH);
        }
        if !allowed {
            return Err(Errno::EPERM);
        }
        if sig == 0 {
            return Ok(());
        }
        p.sig.post(sig);
        if sig == SIGKILL {
            p.killed = true;
        }
        // Interrupt a sleep so the signal is seen promptly.
        let wake = matches!(p.state, ProcState::Sleeping | ProcState::Blocked);
        if wake {
            p.state = ProcState::Ready;
        }
        let pid = p.pid;
        if wake {
            with_sched(|s| s.wake(pid));
        }
        Ok(())
    })
}

/// Apply deliverable signals at the kernel/user boundary. May not
/// return (default action is death).
pub fn check_signals() {
    let action = with_current(|p| {
        while let Some(sig) = p.sig.next_deliverable() {
            if sig == SIGKILL || p.killed {
                return Some(SIGKILL);
            }
            let handler = p.sig.handlers[(sig - 1) as usize];
            match handler {
                SIG_IGN => p.sig.clear(sig),
                SIG_DFL => {
                    if sig == SIGCHLD {
                        p.sig.clear(sig);
                    } else {
                        return Some(sig);
                    }
                }
                // A registered user handler consumes the signal; user
                // trampolines are not part of the core.
                _ => p.sig.clear(sig),
            }
        }
        None
    });
    if let Some(sig) = action {
        exit(128 + sig);
    }
}

/// `/proc/ps`: one line per live task.
pub fn ps() -> String {
    let mut out = String::from("PID\tPPID\tSTATE\tNAME\n");
    with_table(|t| {
        for p in t.slots.iter().flatten() {
            out.push_str(&alloc::format!(
                "{}\t{}\t{}\t{}\n",
                p.pid,
                p.ppid,
                p.state.as_str(),
                p.name_str()
            ));
        }
    });
    out
}

/// procfs hook: pids with live table slots.
pub fn live_pids() -> alloc::vec::Vec<Pid> {
    with_table(|t| t.slots.iter().flatten().map(|p| p.pid).collect())
}

/// procfs hook: `/proc/[pid]/status`.
pub fn pid_status(pid: Pid) -> Option<String> {
    with_table(|t| {
        t.get(pid).map(|p| {
            alloc::format!(
                "Name:\t{}\nPid:\t{}\nPPid:\t{}\nState:\t{}\nUid:\t{}\nGid:\t{}\nNice:\t{}\n",
                p.name_str(),
                p.pid,
                p.ppid,
                p.state.as_str(),
                p.uid,
                p.gid,
                p.nice
            )
        })
    })
}
