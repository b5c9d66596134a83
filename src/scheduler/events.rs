/*
 * Scheduler events
 *
 * The mechanism layer (`SchedulerCore`) turns every state transition it
 * observes into one of these and forwards it to the active policy's
 * `on_event`. Policies never call back into thread bookkeeping directly —
 * everything they need to react to arrives here or through `KernelSchedCtx`.
 */

use super::types::{BlockReason, CpuId, Priority, ThreadId};

#[derive(Debug, Clone, Copy)]
pub enum SchedEvent {
    ThreadCreated { tid: ThreadId, priority: Priority },
    ThreadWoke { tid: ThreadId, was_blocked_on: BlockReason },
    ThreadYielded { tid: ThreadId },
    ThreadBlocked { tid: ThreadId, reason: BlockReason },
    ThreadExited { tid: ThreadId },
    PriorityChanged { tid: ThreadId, old: Priority, new: Priority },
    Tick { cpu: CpuId, current: Option<ThreadId> },
}

impl SchedEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SchedEvent::ThreadCreated { .. } => "thread_created",
            SchedEvent::ThreadWoke { .. } => "thread_woke",
            SchedEvent::ThreadYielded { .. } => "thread_yielded",
            SchedEvent::ThreadBlocked { .. } => "thread_blocked",
            SchedEvent::ThreadExited { .. } => "thread_exited",
            SchedEvent::PriorityChanged { .. } => "priority_changed",
            SchedEvent::Tick { .. } => "tick",
        }
    }

    /// Whether the core should poll `pick_next` right after delivering this
    /// event, rather than waiting for the next tick or voluntary yield.
    pub fn should_reschedule_immediately(&self) -> bool {
        matches!(
            self,
            SchedEvent::ThreadCreated { .. }
                | SchedEvent::ThreadWoke { .. }
                | SchedEvent::ThreadYielded { .. }
                | SchedEvent::PriorityChanged { .. }
        )
    }
}
