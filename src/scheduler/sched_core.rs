/*
 * Scheduler core - mechanism layer
 *
 * `SchedulerCore` holds the active policy, the per-CPU runtime state, and the
 * system load average as three disjoint fields. Every method that needs to
 * hand a `SchedContext` to the policy takes the thread table as a separate
 * `&mut Scheduler` argument (borrowed from a different global lock by the
 * caller) and builds the context from `&mut self.percpu` / `&mut
 * self.load_avg` — distinct fields of `self`, so `self.policy.pick_next(&mut
 * ctx, cpu)` borrows `self.policy` while `ctx` is still holding onto the
 * other two. That's what lets this compile without an `Option<&Self>`
 * back-reference.
 *
 * Free functions at the bottom (`handle_tick`, `reschedule_from_interrupt`)
 * are the entry points `timer.rs`/`switch.rs` call; they take the global
 * scheduler locks themselves so those callers don't need to know this type
 * exists.
 */

use alloc::boxed::Box;

use super::context::SchedContext;
use super::events::SchedEvent;
use super::scheduler::Scheduler as ThreadTable;
use super::traits::Scheduler as Policy;
use super::types::{BlockReason, CpuId, Priority, ThreadId};
use crate::fixed_point::Fixed;

#[derive(Debug)]
pub struct PerCpuSchedState {
    pub cpu_id: CpuId,
    pub current_thread: Option<ThreadId>,
    pub need_resched: bool,
    pub total_ticks: u64,
    pub context_switches: u64,
    /// Ticks elapsed since the currently running thread was last switched
    /// onto this CPU. Reset on every actual switch (`reschedule`, when the
    /// decision differs from what was running) and whenever it reaches the
    /// time slice, so each thread is owed a full, contiguous quantum from
    /// when it starts running rather than being cut short by an unrelated
    /// global tick boundary.
    pub thread_ticks: u32,
}

impl PerCpuSchedState {
    pub fn new(cpu_id: CpuId) -> Self {
        PerCpuSchedState {
            cpu_id,
            current_thread: None,
            need_resched: false,
            total_ticks: 0,
            context_switches: 0,
            thread_ticks: 0,
        }
    }
}

pub struct SchedulerCore {
    policy: Box<dyn Policy>,
    percpu: PerCpuSchedState,
    load_avg: Fixed,
}

impl SchedulerCore {
    pub fn new(policy: Box<dyn Policy>) -> Self {
        log::info!("scheduler core initialized with policy: {}", policy.name());
        SchedulerCore { policy, percpu: PerCpuSchedState::new(CpuId::BSP), load_avg: Fixed::ZERO }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    fn notify(&mut self, threads: &mut ThreadTable, cpu: CpuId, event: SchedEvent) {
        let immediate = event.should_reschedule_immediately();
        let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
        self.policy.on_event(&mut ctx, event);
        if immediate {
            self.percpu.need_resched = true;
        }
    }

    pub fn thread_created(&mut self, threads: &mut ThreadTable, cpu: CpuId, tid: ThreadId, priority: Priority) {
        self.notify(threads, cpu, SchedEvent::ThreadCreated { tid, priority });
    }

    pub fn thread_woke(&mut self, threads: &mut ThreadTable, cpu: CpuId, tid: ThreadId, reason: BlockReason) {
        self.notify(threads, cpu, SchedEvent::ThreadWoke { tid, was_blocked_on: reason });
    }

    pub fn thread_yielded(&mut self, threads: &mut ThreadTable, cpu: CpuId, tid: ThreadId) {
        let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
        self.policy.on_event(&mut ctx, SchedEvent::ThreadYielded { tid });
        self.percpu.need_resched = true;
    }

    pub fn thread_blocked(&mut self, threads: &mut ThreadTable, cpu: CpuId, tid: ThreadId, reason: BlockReason) {
        let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
        self.policy.on_event(&mut ctx, SchedEvent::ThreadBlocked { tid, reason });
        if Some(tid) == self.percpu.current_thread {
            self.percpu.need_resched = true;
        }
    }

    pub fn thread_exited(&mut self, threads: &mut ThreadTable, cpu: CpuId, tid: ThreadId) {
        let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
        self.policy.on_event(&mut ctx, SchedEvent::ThreadExited { tid });
        if Some(tid) == self.percpu.current_thread {
            self.percpu.need_resched = true;
        }
    }

    pub fn thread_priority_changed(&mut self, threads: &mut ThreadTable, cpu: CpuId, tid: ThreadId, old: Priority, new: Priority) {
        self.notify(threads, cpu, SchedEvent::PriorityChanged { tid, old, new });
    }

    pub fn on_tick(&mut self, threads: &mut ThreadTable, cpu: CpuId, ticks: u64) -> bool {
        self.percpu.total_ticks += 1;
        self.percpu.thread_ticks += 1;
        {
            let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
            self.policy.periodic_recompute(&mut ctx, ticks);
        }
        {
            let current = self.percpu.current_thread;
            let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
            self.policy.on_event(&mut ctx, SchedEvent::Tick { cpu, current });
        }

        let slice_expired = self.percpu.thread_ticks >= super::types::TimeSliceTicks::DEFAULT.0;
        if slice_expired {
            // The running thread has used up its quantum; it's owed a fresh
            // one the next time something actually schedules it in, whether
            // that's this dispatch or a later one.
            self.percpu.thread_ticks = 0;
        }
        self.percpu.need_resched || slice_expired
    }

    pub fn reschedule(&mut self, threads: &mut ThreadTable, cpu: CpuId) -> Option<ThreadId> {
        self.percpu.need_resched = false;
        let prev = self.percpu.current_thread;

        let decision = {
            let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
            self.policy.pick_next(&mut ctx, cpu)
        };
        self.percpu.current_thread = decision.next;

        if prev != decision.next {
            self.percpu.context_switches += 1;
            self.percpu.thread_ticks = 0;
            let mut ctx = SchedContext::new(threads, &mut self.percpu, &mut self.load_avg, cpu);
            self.policy.on_switched(&mut ctx, cpu, prev, decision.next);
        }
        decision.next
    }

    pub fn current_thread(&self, cpu: CpuId) -> Option<ThreadId> {
        debug_assert_eq!(cpu, self.percpu.cpu_id);
        self.percpu.current_thread
    }

    pub fn total_ticks(&self) -> u64 {
        self.percpu.total_ticks
    }

    pub fn context_switch_count(&self) -> u64 {
        self.percpu.context_switches
    }

    pub fn load_avg(&self) -> Fixed {
        self.load_avg
    }
}

/// System-wide load average as last computed by `periodic_recompute`.
/// MLFQS-only; reads as zero before the first 100-tick recompute.
pub fn current_load_avg() -> Fixed {
    super::with_scheduler_and_core(|_threads, core| core.load_avg())
}

impl core::fmt::Debug for SchedulerCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchedulerCore")
            .field("policy", &self.policy.name())
            .field("percpu", &self.percpu)
            .field("load_avg", &self.load_avg.to_int_round())
            .finish()
    }
}

/// Called from the timer tick body every PIT interrupt. Decides whether a
/// reschedule is due and, if so, performs the actual `switch_threads` call.
pub fn handle_tick() {
    let ticks = super::timer::ticks();
    let should_switch = super::with_scheduler_and_core(|threads, core| core.on_tick(threads, CpuId::BSP, ticks));

    if should_switch {
        dispatch(CpuId::BSP);
    }
}

/// Entry point for the voluntary-yield interrupt body.
pub fn reschedule_from_interrupt(cpu: CpuId) {
    dispatch(cpu);
}

/// Asks the policy for the next thread and, if it differs from the one
/// currently running, performs the low-level stack switch. Always called
/// with interrupts disabled (we're either in an interrupt handler or inside
/// `without_interrupts`).
fn dispatch(cpu: CpuId) {
    let current = super::current_thread_id();

    let next = super::with_scheduler_and_core(|threads, core| {
        let still_runnable = if let Some(t) = threads.get_thread_mut(current) {
            if t.state == super::types::ThreadState::Running {
                t.state = super::types::ThreadState::Ready;
                true
            } else {
                false
            }
        } else {
            false
        };

        if still_runnable {
            core.thread_yielded(threads, cpu, current);
        }
        core.reschedule(threads, cpu)
    });

    let next = match next {
        Some(tid) if tid != current => tid,
        _ => return,
    };

    super::switch_to(current, next);
}
