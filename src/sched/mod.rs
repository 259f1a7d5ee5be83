//! The scheduler.
//!
//! Policy is pluggable at init time: round-robin, fixed priority with
//! round-robin ties, or CFS. The scheduler owns only readiness — which
//! pid runs next, for how long, and who is due to wake — while the
//! process table owns task state and contexts. That split keeps the
//! whole policy machine runnable (and tested) on the host.
//!
//! The tick hook charges the current task, wakes expired sleepers, and
//! reports whether the current slice is exhausted; the caller performs
//! the actual context switch.

use alloc::collections::BTreeMap;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::param::{CFS_MIN_GRANULARITY, CFS_PERIOD, NPRIO, QUANTUM};

pub mod cfs;

use cfs::CfsQueue;

pub type Pid = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    RoundRobin,
    Priority,
    Cfs,
}

/// Per-task scheduling bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedEntity {
    pub nice: i8,
    /// 0 is the highest priority level.
    pub priority: u8,
    pub vruntime: u64,
    /// Total ticks of CPU consumed.
    pub run_ticks: u64,
    /// Ticks consumed of the current slice.
    slice_used: u64,
    slice: u64,
}

/// What `tick` tells the caller to do.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Tasks whose sleep deadline passed; make them READY again.
    pub woken: Vec<Pid>,
    /// The current task exhausted its slice; switch.
    pub preempt: bool,
}

pub struct Scheduler {
    policy: SchedPolicy,
    entities: BTreeMap<Pid, SchedEntity>,

    rr: VecDeque<Pid>,
    prio: [VecDeque<Pid>; NPRIO],
    cfs: CfsQueue,

    /// Sleeping tasks keyed by wakeup tick.
    sleepers: BTreeMap<u64, Vec<Pid>>,

    current: Option<Pid>,
}

impl Scheduler {
    pub fn new(policy: SchedPolicy) -> Self {
        Self {
            policy,
            entities: BTreeMap::new(),
            rr: VecDeque::new(),
            prio: array_macro::array![_ => VecDeque::new(); NPRIO],
            cfs: CfsQueue::new(),
            sleepers: BTreeMap::new(),
            current: None,
        }
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn entity(&self, pid: Pid) -> Option<&SchedEntity> {
        self.entities.get(&pid)
    }

    /// Runnable tasks, counting the one on the CPU.
    pub fn runnable_count(&self) -> usize {
        let queued = match self.policy {
            SchedPolicy::RoundRobin => self.rr.len(),
            SchedPolicy::Priority => self.prio.iter().map(|q| q.len()).sum(),
            SchedPolicy::Cfs => self.cfs.len(),
        };
        queued + self.current.is_some() as usize
    }

    /// Register a task and place it on the READY queue.
    pub fn add_task(&mut self, pid: Pid, nice: i8, priority: u8) {
        let entity = SchedEntity {
            nice,
            priority: priority.min(NPRIO as u8 - 1),
            ..SchedEntity::default()
        };
        let _ = self.entities.insert(pid, entity);
        self.enqueue(pid);
    }

    /// Forget a task entirely (exit or kill).
    pub fn remove_task(&mut self, pid: Pid) {
        if self.current == Some(pid) {
            self.current = None;
        }
        if let Some(e) = self.entities.remove(&pid) {
            self.rr.retain(|&p| p != pid);
            for q in self.prio.iter_mut() {
                q.retain(|&p| p != pid);
            }
            let _ = self.cfs.remove(pid, e.vruntime);
        }
        for v in self.sleepers.values_mut() {
            v.retain(|&p| p != pid);
        }
    }

    /// Put a runnable task on its policy's READY structure.
    pub fn enqueue(&mut self, pid: Pid) {
        let entity = match self.entities.get_mut(&pid) {
            Some(e) => e,
            None => return,
        };
        match self.policy {
            SchedPolicy::RoundRobin => self.rr.push_back(pid),
            SchedPolicy::Priority => self.prio[entity.priority as usize].push_back(pid),
            SchedPolicy::Cfs => {
                entity.vruntime = self.cfs.enqueue(pid, entity.vruntime);
            }
        }
    }

    /// The time slice a freshly picked task gets.
    fn slice_for(&self, _pid: Pid) -> u64 {
        match self.policy {
            SchedPolicy::RoundRobin | SchedPolicy::Priority => QUANTUM,
            SchedPolicy::Cfs => {
                let n = self.runnable_count().max(1) as u64;
                (CFS_PERIOD / n).max(CFS_MIN_GRANULARITY)
            }
        }
    }

    /// Select the next task to run and make it current. `None` when no
    /// task is runnable (the caller idles).
    pub fn pick_next(&mut self) -> Option<Pid> {
        debug_assert!(self.current.is_none(), "pick_next with a current task");
        let pid = match self.policy {
            SchedPolicy::RoundRobin => self.rr.pop_front()?,
            SchedPolicy::Priority => {
                let q = self.prio.iter_mut().find(|q| !q.is_empty())?;
                q.pop_front()?
            }
            SchedPolicy::Cfs => self.cfs.pop_leftmost()?.0,
        };
        let slice = self.slice_for(pid);
        if let Some(e) = self.entities.get_mut(&pid) {
            e.slice_used = 0;
            e.slice = slice;
        }
        self.current = Some(pid);
        Some(pid)
    }

    /// Voluntary preemption: current goes to the tail of its queue.
    pub fn yield_current(&mut self) -> Option<Pid> {
        let pid = self.current.take()?;
        self.enqueue(pid);
        Some(pid)
    }

    /// Current task stops being runnable (sleep with a deadline, or a
    /// plain block when `wake_tick` is `None`).
    pub fn suspend_current(&mut self, wake_tick: Option<u64>) -> Option<Pid> {
        let pid = self.current.take()?;
        if let Some(at) = wake_tick {
            self.sleepers.entry(at).or_insert_with(Vec::new).push(pid);
        }
        Some(pid)
    }

    /// A blocked/sleeping task becomes runnable (wakeup or signal).
    pub fn wake(&mut self, pid: Pid) {
        for v in self.sleepers.values_mut() {
            v.retain(|&p| p != pid);
        }
        self.enqueue(pid);
    }

    /// One timer tick at time `now`: charge the current task, release
    /// due sleepers, and decide about preemption.
    pub fn tick(&mut self, now: u64) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        // Wake sleepers whose deadline has passed.
        let due: Vec<u64> = self
            .sleepers
            .range(..=now)
            .map(|(&t, _)| t)
            .collect();
        for t in due {
            if let Some(pids) = self.sleepers.remove(&t) {
                for pid in pids {
                    self.enqueue(pid);
                    outcome.woken.push(pid);
                }
            }
        }

        if let Some(pid) = self.current {
            let policy = self.policy;
            if let Some(e) = self.entities.get_mut(&pid) {
                e.run_ticks += 1;
                e.slice_used += 1;
                if policy == SchedPolicy::Cfs {
                    e.vruntime += cfs::vruntime_delta(1, e.nice);
                }
                outcome.preempt = e.slice_used >= e.slice;
            }
            // A higher-priority arrival preempts immediately.
            if policy == SchedPolicy::Priority {
                if let Some(e) = self.entities.get(&pid) {
                    let higher = self.prio[..e.priority as usize]
                        .iter()
                        .any(|q| !q.is_empty());
                    outcome.preempt = outcome.preempt || higher;
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the scheduler alone for `total` ticks, switching whenever
    /// it asks to.
    fn simulate(sched: &mut Scheduler, total: u64) {
        let mut now = 0;
        if sched.current().is_none() {
            let _ = sched.pick_next();
        }
        for _ in 0..total {
            now += 1;
            let out = sched.tick(now);
            if out.preempt {
                let _ = sched.yield_current();
                let _ = sched.pick_next();
            }
            if sched.current().is_none() {
                let _ = sched.pick_next();
            }
        }
    }

    #[test]
    fn round_robin_rotates_evenly() {
        let mut s = Scheduler::new(SchedPolicy::RoundRobin);
        for pid in 1..=3 {
            s.add_task(pid, 0, 0);
        }
        simulate(&mut s, 3 * QUANTUM * 10);
        let ticks: Vec<u64> = (1..=3).map(|p| s.entity(p).unwrap().run_ticks).collect();
        let (min, max) = (ticks.iter().min().unwrap(), ticks.iter().max().unwrap());
        assert!(max - min <= QUANTUM, "uneven rotation: {:?}", ticks);
    }

    #[test]
    fn priority_starves_lower_levels() {
        let mut s = Scheduler::new(SchedPolicy::Priority);
        s.add_task(1, 0, 0);
        s.add_task(2, 0, 3);
        simulate(&mut s, 200);
        assert_eq!(s.entity(2).unwrap().run_ticks, 0);
        assert!(s.entity(1).unwrap().run_ticks >= 199);
    }

    #[test]
    fn priority_ties_round_robin() {
        let mut s = Scheduler::new(SchedPolicy::Priority);
        s.add_task(1, 0, 2);
        s.add_task(2, 0, 2);
        simulate(&mut s, QUANTUM * 8);
        let a = s.entity(1).unwrap().run_ticks;
        let b = s.entity(2).unwrap().run_ticks;
        assert!(a > 0 && b > 0);
        assert!(a.abs_diff(b) <= QUANTUM);
    }

    #[test]
    fn cfs_fairness_bound() {
        let mut s = Scheduler::new(SchedPolicy::Cfs);
        for pid in 1..=3 {
            s.add_task(pid, 0, 0);
        }
        let slice = (CFS_PERIOD / 3).max(CFS_MIN_GRANULARITY);
        simulate(&mut s, 3000);
        let ticks: Vec<u64> = (1..=3).map(|p| s.entity(p).unwrap().run_ticks).collect();
        let (min, max) = (*ticks.iter().min().unwrap(), *ticks.iter().max().unwrap());
        assert!(
            max - min <= slice + 1,
            "consumed ticks spread too far: {:?} (slice {})",
            ticks,
            slice
        );
    }

    #[test]
    fn cfs_nice_biases_share() {
        let mut s = Scheduler::new(SchedPolicy::Cfs);
        s.add_task(1, 0, 0);
        s.add_task(2, 10, 0);
        simulate(&mut s, 4000);
        let favored = s.entity(1).unwrap().run_ticks;
        let niced = s.entity(2).unwrap().run_ticks;
        assert!(
            favored > niced * 3,
            "nice 10 should run far less: {} vs {}",
            favored,
            niced
        );
    }

    #[test]
    fn sleepers_wake_at_deadline() {
        let mut s = Scheduler::new(SchedPolicy::RoundRobin);
        s.add_task(1, 0, 0);
        s.add_task(2, 0, 0);
        assert_eq!(s.pick_next(), Some(1));
        let slept = s.suspend_current(Some(10)).unwrap();
        assert_eq!(slept, 1);
        assert_eq!(s.pick_next(), Some(2));

        let out = s.tick(9);
        assert!(out.woken.is_empty());
        let out = s.tick(10);
        assert_eq!(out.woken, alloc::vec![1]);
    }

    #[test]
    fn removed_tasks_never_resurface() {
        let mut s = Scheduler::new(SchedPolicy::Cfs);
        s.add_task(1, 0, 0);
        s.add_task(2, 0, 0);
        s.remove_task(1);
        assert_eq!(s.pick_next(), Some(2));
        let _ = s.suspend_current(Some(5));
        assert_eq!(s.pick_next(), None);
        let out = s.tick(6);
        assert_eq!(out.woken, alloc::vec![2]);
        assert_eq!(s.pick_next(), Some(2));
    }

    #[test]
    fn new_task_cannot_replay_old_vruntime() {
        let mut s = Scheduler::new(SchedPolicy::Cfs);
        s.add_task(1, 0, 0);
        simulate(&mut s, 500);
        // A newcomer starts at the queue floor, not at zero.
        s.add_task(2, 0, 0);
        simulate(&mut s, 100);
        let old = s.entity(1).unwrap().run_ticks;
        let new = s.entity(2).unwrap().run_ticks;
        assert!(old > new, "newcomer {} overtook incumbent {}", new, old);
        assert!(new >= 30, "newcomer starved: {}", new);
    }
}
