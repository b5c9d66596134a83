/*
 * SchedContext - the KernelSchedCtx implementation
 *
 * Borrows the thread table and the mechanism's per-CPU state as two
 * independent `&mut` references, obtained by the caller from two separate
 * global locks (see `with_scheduler_and_core` in `mod.rs`). Because they are
 * genuinely disjoint memory, `SchedulerCore` can hold `&mut self.percpu` in
 * here while still calling `self.policy.pick_next(&mut ctx, cpu)` in the same
 * statement — two different fields of `self`, not one field aliased through
 * an `Option<&SchedulerCore>` back-reference.
 */

use alloc::vec::Vec;

use super::sched_core::PerCpuSchedState;
use super::scheduler::Scheduler;
use super::types::{CpuId, Nice, Priority, ThreadId, ThreadState};
use super::traits::KernelSchedCtx;
use crate::fixed_point::Fixed;

pub struct SchedContext<'a> {
    threads: &'a mut Scheduler,
    percpu: &'a mut PerCpuSchedState,
    cpu: CpuId,
    load_avg: &'a mut Fixed,
}

impl<'a> SchedContext<'a> {
    pub fn new(
        threads: &'a mut Scheduler,
        percpu: &'a mut PerCpuSchedState,
        load_avg: &'a mut Fixed,
        cpu: CpuId,
    ) -> Self {
        SchedContext { threads, percpu, cpu, load_avg }
    }
}

impl<'a> KernelSchedCtx for SchedContext<'a> {
    fn thread_state(&self, tid: ThreadId) -> Option<ThreadState> {
        self.threads.get_thread(tid).map(|t| t.state)
    }

    fn is_idle(&self, tid: ThreadId) -> bool {
        tid == ThreadId(0)
    }

    fn current_thread(&self, cpu: CpuId) -> Option<ThreadId> {
        debug_assert_eq!(cpu, self.cpu);
        self.percpu.current_thread
    }

    fn all_threads(&self) -> Vec<ThreadId> {
        self.threads.all_thread_ids()
    }

    fn ready_count(&self) -> usize {
        self.threads.ready_count()
    }

    fn base_priority(&self, tid: ThreadId) -> Option<Priority> {
        self.threads.get_thread(tid).map(|t| t.base_priority)
    }

    fn effective_priority(&self, tid: ThreadId) -> Option<Priority> {
        self.threads.get_thread(tid).map(|t| t.effective_priority)
    }

    fn set_effective_priority(&mut self, tid: ThreadId, priority: Priority) {
        if let Some(t) = self.threads.get_thread_mut(tid) {
            t.effective_priority = priority;
        }
    }

    fn nice(&self, tid: ThreadId) -> Option<Nice> {
        self.threads.get_thread(tid).map(|t| t.nice)
    }

    fn recent_cpu(&self, tid: ThreadId) -> Option<Fixed> {
        self.threads.get_thread(tid).map(|t| t.recent_cpu)
    }

    fn set_recent_cpu(&mut self, tid: ThreadId, value: Fixed) {
        if let Some(t) = self.threads.get_thread_mut(tid) {
            t.recent_cpu = value;
        }
    }

    fn load_avg(&self) -> Fixed {
        *self.load_avg
    }

    fn set_load_avg(&mut self, value: Fixed) {
        *self.load_avg = value;
    }

    fn make_runnable(&mut self, tid: ThreadId) {
        if let Some(t) = self.threads.get_thread_mut(tid) {
            if t.state == ThreadState::Blocked {
                t.state = ThreadState::Ready;
            }
        }
    }

    fn request_reschedule(&mut self, cpu: CpuId) {
        debug_assert_eq!(cpu, self.cpu);
        self.percpu.need_resched = true;
    }

    fn log(&self, level: log::Level, message: &str) {
        match level {
            log::Level::Error => log::error!("[sched] {}", message),
            log::Level::Warn => log::warn!("[sched] {}", message),
            log::Level::Info => log::info!("[sched] {}", message),
            log::Level::Debug => log::debug!("[sched] {}", message),
            log::Level::Trace => log::trace!("[sched] {}", message),
        }
    }
}

impl<'a> core::fmt::Debug for SchedContext<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchedContext")
            .field("cpu", &self.cpu)
            .field("current_thread", &self.percpu.current_thread)
            .finish()
    }
}
