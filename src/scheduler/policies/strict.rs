/*
 * Strict-priority scheduler
 *
 * Always runs the highest effective-priority runnable thread; ties broken
 * round-robin among threads at the same priority. Priority donation through
 * locks (see `scheduler::sync::Lock`) is what keeps this from starving a
 * high-priority thread behind a low-priority lock holder — this policy only
 * has to read `effective_priority`, not compute donation itself.
 */

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::scheduler::events::SchedEvent;
use crate::scheduler::traits::{KernelSchedCtx, Scheduler};
use crate::scheduler::types::{CpuId, DispatchDecision, Priority, ThreadId};

pub struct StrictPriorityPolicy {
    ready: VecDeque<ThreadId>,
}

impl StrictPriorityPolicy {
    pub fn new() -> Self {
        StrictPriorityPolicy { ready: VecDeque::new() }
    }

    fn enqueue(&mut self, tid: ThreadId) {
        if !self.ready.contains(&tid) {
            self.ready.push_back(tid);
        }
    }

    fn pop_highest(&mut self, ctx: &dyn KernelSchedCtx) -> Option<ThreadId> {
        if self.ready.is_empty() {
            return None;
        }
        let best_priority = self
            .ready
            .iter()
            .filter_map(|&tid| ctx.effective_priority(tid))
            .max()
            .unwrap_or(Priority::MIN);

        let pos = self
            .ready
            .iter()
            .position(|&tid| ctx.effective_priority(tid) == Some(best_priority))?;

        self.ready.remove(pos)
    }
}

impl Scheduler for StrictPriorityPolicy {
    fn on_event(&mut self, ctx: &mut dyn KernelSchedCtx, event: SchedEvent) {
        match event {
            SchedEvent::ThreadCreated { tid, .. } => self.enqueue(tid),
            SchedEvent::ThreadWoke { tid, .. } => self.enqueue(tid),
            SchedEvent::ThreadYielded { tid } => self.enqueue(tid),
            SchedEvent::ThreadBlocked { tid, .. } => {
                self.ready.retain(|&t| t != tid);
            }
            SchedEvent::ThreadExited { tid } => {
                self.ready.retain(|&t| t != tid);
            }
            SchedEvent::PriorityChanged { tid, new, .. } => {
                ctx.set_effective_priority(tid, new);
            }
            SchedEvent::Tick { .. } => {}
        }
    }

    fn pick_next(&mut self, ctx: &mut dyn KernelSchedCtx, _cpu: CpuId) -> DispatchDecision {
        match self.pop_highest(ctx) {
            Some(tid) => DispatchDecision::run_thread(tid),
            None => DispatchDecision::idle(),
        }
    }

    fn on_switched(
        &mut self,
        _ctx: &mut dyn KernelSchedCtx,
        _cpu: CpuId,
        prev: Option<ThreadId>,
        _next: Option<ThreadId>,
    ) {
        // A preempted-but-still-runnable previous thread is re-enqueued by
        // the core's own ThreadYielded/Tick event before pick_next runs
        // again, not here — on_switched only observes the completed switch.
        let _ = prev;
    }

    fn periodic_recompute(&mut self, _ctx: &mut dyn KernelSchedCtx, _ticks: u64) {
        // Strict priority has nothing to recompute on a schedule.
    }

    fn name(&self) -> &'static str {
        "strict-priority"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;

    struct FakeCtx {
        priorities: BTreeMap<ThreadId, Priority>,
    }

    impl KernelSchedCtx for FakeCtx {
        fn thread_state(&self, _tid: ThreadId) -> Option<crate::scheduler::types::ThreadState> {
            None
        }
        fn is_idle(&self, _tid: ThreadId) -> bool {
            false
        }
        fn current_thread(&self, _cpu: CpuId) -> Option<ThreadId> {
            None
        }
        fn all_threads(&self) -> Vec<ThreadId> {
            self.priorities.keys().copied().collect()
        }
        fn ready_count(&self) -> usize {
            self.priorities.len()
        }
        fn base_priority(&self, tid: ThreadId) -> Option<Priority> {
            self.priorities.get(&tid).copied()
        }
        fn effective_priority(&self, tid: ThreadId) -> Option<Priority> {
            self.priorities.get(&tid).copied()
        }
        fn set_effective_priority(&mut self, tid: ThreadId, priority: Priority) {
            self.priorities.insert(tid, priority);
        }
        fn nice(&self, _tid: ThreadId) -> Option<crate::scheduler::types::Nice> {
            None
        }
        fn recent_cpu(&self, _tid: ThreadId) -> Option<crate::fixed_point::Fixed> {
            None
        }
        fn set_recent_cpu(&mut self, _tid: ThreadId, _value: crate::fixed_point::Fixed) {}
        fn load_avg(&self) -> crate::fixed_point::Fixed {
            crate::fixed_point::Fixed::ZERO
        }
        fn set_load_avg(&mut self, _value: crate::fixed_point::Fixed) {}
        fn make_runnable(&mut self, _tid: ThreadId) {}
        fn request_reschedule(&mut self, _cpu: CpuId) {}
        fn log(&self, _level: log::Level, _message: &str) {}
    }

    #[test]
    fn picks_highest_priority_first() {
        let mut ctx = FakeCtx { priorities: BTreeMap::new() };
        ctx.priorities.insert(ThreadId(1), Priority(10));
        ctx.priorities.insert(ThreadId(2), Priority(30));
        ctx.priorities.insert(ThreadId(3), Priority(20));

        let mut policy = StrictPriorityPolicy::new();
        policy.on_event(&mut ctx, SchedEvent::ThreadCreated { tid: ThreadId(1), priority: Priority(10) });
        policy.on_event(&mut ctx, SchedEvent::ThreadCreated { tid: ThreadId(2), priority: Priority(30) });
        policy.on_event(&mut ctx, SchedEvent::ThreadCreated { tid: ThreadId(3), priority: Priority(20) });

        let decision = policy.pick_next(&mut ctx, CpuId::BSP);
        assert_eq!(decision.next, Some(ThreadId(2)));
    }

    #[test]
    fn donation_raises_effective_priority_past_peers() {
        let mut ctx = FakeCtx { priorities: BTreeMap::new() };
        ctx.priorities.insert(ThreadId(1), Priority(10));
        ctx.priorities.insert(ThreadId(2), Priority(20));

        let mut policy = StrictPriorityPolicy::new();
        policy.on_event(&mut ctx, SchedEvent::ThreadCreated { tid: ThreadId(1), priority: Priority(10) });
        policy.on_event(&mut ctx, SchedEvent::ThreadCreated { tid: ThreadId(2), priority: Priority(20) });

        policy.on_event(
            &mut ctx,
            SchedEvent::PriorityChanged { tid: ThreadId(1), old: Priority(10), new: Priority(30) },
        );

        let decision = policy.pick_next(&mut ctx, CpuId::BSP);
        assert_eq!(decision.next, Some(ThreadId(1)));
    }

    #[test]
    fn idles_when_nothing_ready() {
        let mut ctx = FakeCtx { priorities: BTreeMap::new() };
        let mut policy = StrictPriorityPolicy::new();
        let decision = policy.pick_next(&mut ctx, CpuId::BSP);
        assert_eq!(decision.next, None);
    }
}
