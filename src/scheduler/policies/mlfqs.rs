/*
 * 4.4BSD multi-level feedback queue scheduler
 *
 * Priority is derived, not assigned: every 4 ticks each thread's priority is
 * recomputed from its `recent_cpu` and `nice`, and every 100 ticks (one
 * second at this kernel's 100Hz tick rate) `recent_cpu` and the system
 * `load_avg` are recomputed from each other. `nice` is the only thing a
 * thread (or test) sets directly; everything else the policy keeps current
 * in response to `Tick` events via `periodic_recompute`.
 *
 * Ready threads are kept in `RQ_LEVELS` per-priority FIFO queues (one per
 * integer priority) so `pick_next` is an O(levels) scan rather than a scan
 * of every ready thread.
 */

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::fixed_point::Fixed;
use crate::scheduler::events::SchedEvent;
use crate::scheduler::traits::{KernelSchedCtx, Scheduler};
use crate::scheduler::types::{CpuId, DispatchDecision, Priority, ThreadId};

const RQ_LEVELS: usize = (Priority::MAX.0 - Priority::MIN.0 + 1) as usize;
const RECOMPUTE_PRIORITY_PERIOD: u64 = 4;
const RECOMPUTE_LOAD_PERIOD: u64 = 100;

pub struct MlfqsPolicy {
    queues: [VecDeque<ThreadId>; RQ_LEVELS],
}

impl MlfqsPolicy {
    pub fn new() -> Self {
        MlfqsPolicy { queues: core::array::from_fn(|_| VecDeque::new()) }
    }

    fn level_of(priority: Priority) -> usize {
        (priority.clamp().0 - Priority::MIN.0) as usize
    }

    fn enqueue(&mut self, ctx: &dyn KernelSchedCtx, tid: ThreadId) {
        let priority = ctx.effective_priority(tid).unwrap_or(Priority::DEFAULT);
        let level = Self::level_of(priority);
        if !self.queues[level].contains(&tid) {
            self.queues[level].push_back(tid);
        }
    }

    fn remove_everywhere(&mut self, tid: ThreadId) {
        for q in self.queues.iter_mut() {
            q.retain(|&t| t != tid);
        }
    }

    fn pop_highest(&mut self) -> Option<ThreadId> {
        for level in (0..RQ_LEVELS).rev() {
            if let Some(tid) = self.queues[level].pop_front() {
                return Some(tid);
            }
        }
        None
    }

    /// `priority = PRI_MAX - (recent_cpu / 4) - (nice * 2)`, clamped into
    /// range. Recomputed for every thread every `RECOMPUTE_PRIORITY_PERIOD`
    /// ticks.
    fn recompute_priority(recent_cpu: Fixed, nice: i32) -> Priority {
        let term = recent_cpu.div_int(4).to_int_round();
        let raw = Priority::MAX.0 - term - nice * 2;
        Priority(raw).clamp()
    }

    /// `recent_cpu = (2*load_avg)/(2*load_avg + 1) * recent_cpu + nice`,
    /// recomputed for every thread every `RECOMPUTE_LOAD_PERIOD` ticks,
    /// right after `load_avg` itself is refreshed.
    fn recompute_recent_cpu(recent_cpu: Fixed, load_avg: Fixed, nice: i32) -> Fixed {
        let two_load = load_avg.mul_int(2);
        let coeff = two_load.div(two_load + Fixed::from_int(1));
        coeff.mul(recent_cpu) + Fixed::from_int(nice)
    }

    /// `load_avg = (59/60)*load_avg + (1/60)*ready_threads`, where
    /// `ready_threads` includes the running thread but not the idle thread.
    fn recompute_load_avg(load_avg: Fixed, ready_threads: i32) -> Fixed {
        let fifty_nine_sixtieths = Fixed::from_int(59).div_int(60);
        let one_sixtieth = Fixed::from_int(1).div_int(60);
        fifty_nine_sixtieths.mul(load_avg) + one_sixtieth.mul_int(ready_threads)
    }
}

impl Scheduler for MlfqsPolicy {
    fn on_event(&mut self, ctx: &mut dyn KernelSchedCtx, event: SchedEvent) {
        match event {
            SchedEvent::ThreadCreated { tid, .. } => self.enqueue(ctx, tid),
            SchedEvent::ThreadWoke { tid, .. } => self.enqueue(ctx, tid),
            SchedEvent::ThreadYielded { tid } => self.enqueue(ctx, tid),
            SchedEvent::ThreadBlocked { tid, .. } => self.remove_everywhere(tid),
            SchedEvent::ThreadExited { tid } => self.remove_everywhere(tid),
            SchedEvent::PriorityChanged { tid, new, .. } => {
                self.remove_everywhere(tid);
                ctx.set_effective_priority(tid, new);
                self.enqueue(ctx, tid);
            }
            SchedEvent::Tick { cpu: _, current } => {
                if let Some(tid) = current {
                    if !ctx.is_idle(tid) {
                        if let Some(rc) = ctx.recent_cpu(tid) {
                            ctx.set_recent_cpu(tid, rc + Fixed::from_int(1));
                        }
                    }
                }
            }
        }
    }

    fn pick_next(&mut self, _ctx: &mut dyn KernelSchedCtx, _cpu: CpuId) -> DispatchDecision {
        match self.pop_highest() {
            Some(tid) => DispatchDecision::run_thread(tid),
            None => DispatchDecision::idle(),
        }
    }

    fn on_switched(
        &mut self,
        _ctx: &mut dyn KernelSchedCtx,
        _cpu: CpuId,
        _prev: Option<ThreadId>,
        _next: Option<ThreadId>,
    ) {
    }

    fn periodic_recompute(&mut self, ctx: &mut dyn KernelSchedCtx, ticks: u64) {
        if ticks % RECOMPUTE_LOAD_PERIOD == 0 {
            let ready = ctx.ready_count() as i32
                + ctx
                    .current_thread(CpuId::BSP)
                    .filter(|&tid| !ctx.is_idle(tid))
                    .map_or(0, |_| 1);
            let new_load_avg = Self::recompute_load_avg(ctx.load_avg(), ready);
            ctx.set_load_avg(new_load_avg);

            let threads: Vec<ThreadId> = ctx.all_threads();
            for tid in threads {
                if let (Some(rc), Some(nice)) = (ctx.recent_cpu(tid), ctx.nice(tid)) {
                    let updated = Self::recompute_recent_cpu(rc, new_load_avg, nice.0);
                    ctx.set_recent_cpu(tid, updated);
                }
            }
        }

        if ticks % RECOMPUTE_PRIORITY_PERIOD == 0 {
            let threads: Vec<ThreadId> = ctx.all_threads();
            for tid in threads {
                if let (Some(rc), Some(nice)) = (ctx.recent_cpu(tid), ctx.nice(tid)) {
                    let priority = Self::recompute_priority(rc, nice.0);
                    if ctx.effective_priority(tid) != Some(priority) {
                        self.remove_everywhere(tid);
                        ctx.set_effective_priority(tid, priority);
                        if ctx.current_thread(CpuId::BSP) != Some(tid) {
                            self.enqueue(ctx, tid);
                        }
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "mlfqs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_avg_with_one_ready_thread_converges_toward_one() {
        let mut load_avg = Fixed::ZERO;
        for _ in 0..2000 {
            load_avg = MlfqsPolicy::recompute_load_avg(load_avg, 1);
        }
        assert_eq!(load_avg.to_int_round(), 1);
    }

    #[test]
    fn priority_decreases_as_recent_cpu_increases() {
        let low_cpu = MlfqsPolicy::recompute_priority(Fixed::from_int(0), 0);
        let high_cpu = MlfqsPolicy::recompute_priority(Fixed::from_int(100), 0);
        assert!(high_cpu.0 < low_cpu.0);
    }

    #[test]
    fn higher_nice_lowers_priority() {
        let nice_zero = MlfqsPolicy::recompute_priority(Fixed::ZERO, 0);
        let nice_high = MlfqsPolicy::recompute_priority(Fixed::ZERO, 10);
        assert!(nice_high.0 < nice_zero.0);
    }
}
