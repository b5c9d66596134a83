/*
 * Scheduler trait definitions
 *
 * `Scheduler` is the policy interface: strict-priority donation and MLFQS
 * both implement it, and `SchedulerCore` holds exactly one as
 * `Box<dyn Scheduler>`, chosen once at boot from `config::BootConfig`.
 *
 * `KernelSchedCtx` is the only door a policy has into thread bookkeeping.
 * It never sees `Thread` directly, which keeps policies testable against a
 * fake context and keeps the mechanism free to change thread layout without
 * touching policy code.
 */

use alloc::vec::Vec;

use super::types::{CpuId, DispatchDecision, Priority, ThreadId, ThreadState};
use super::events::SchedEvent;
use crate::fixed_point::Fixed;

pub trait Scheduler: Send {
    /// React to a state transition the mechanism just applied.
    fn on_event(&mut self, ctx: &mut dyn KernelSchedCtx, event: SchedEvent);

    /// Choose the next thread to run on `cpu`. Called whenever the core
    /// decides a dispatch is due (tick expiry, a wake, an exit, ...).
    fn pick_next(&mut self, ctx: &mut dyn KernelSchedCtx, cpu: CpuId) -> DispatchDecision;

    /// Called once the core has actually switched from `prev` to `next`.
    fn on_switched(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        cpu: CpuId,
        prev: Option<ThreadId>,
        next: Option<ThreadId>,
    );

    /// Recompute whatever the policy recomputes on a fixed cadence
    /// (load average, recent_cpu, priority). `ticks` is the running tick
    /// count so the policy can test its own cadence against it. Strict
    /// priority has nothing to recompute and no-ops this.
    fn periodic_recompute(&mut self, ctx: &mut dyn KernelSchedCtx, ticks: u64);

    fn name(&self) -> &'static str;
}

pub trait KernelSchedCtx {
    // ---- queries ----

    fn thread_state(&self, tid: ThreadId) -> Option<ThreadState>;
    fn is_idle(&self, tid: ThreadId) -> bool;
    fn current_thread(&self, cpu: CpuId) -> Option<ThreadId>;
    fn all_threads(&self) -> Vec<ThreadId>;
    fn ready_count(&self) -> usize;

    fn base_priority(&self, tid: ThreadId) -> Option<Priority>;
    fn effective_priority(&self, tid: ThreadId) -> Option<Priority>;
    fn set_effective_priority(&mut self, tid: ThreadId, priority: Priority);

    fn nice(&self, tid: ThreadId) -> Option<crate::scheduler::types::Nice>;
    fn recent_cpu(&self, tid: ThreadId) -> Option<Fixed>;
    fn set_recent_cpu(&mut self, tid: ThreadId, value: Fixed);
    fn load_avg(&self) -> Fixed;
    fn set_load_avg(&mut self, value: Fixed);

    // ---- mutation ----

    fn make_runnable(&mut self, tid: ThreadId);
    fn request_reschedule(&mut self, cpu: CpuId);

    // ---- diagnostics ----

    fn log(&self, level: log::Level, message: &str);
}
