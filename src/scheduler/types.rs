/*
 * Scheduler Type Definitions
 *
 * Lightweight, Copy-able value types shared between the policy layer
 * (`Scheduler` implementors) and the mechanism layer (`SchedulerCore`).
 */

use core::fmt;

/// CPU identifier. Single-processor only in this design (SPEC non-goal),
/// kept as a type rather than assumed away so the mechanism/policy split
/// reads the same as a multi-CPU design would.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl CpuId {
    pub const BSP: CpuId = CpuId(0);
}

/// Thread identifier. Monotonically increasing; `ThreadId::ERROR` is the
/// reserved sentinel returned by a failed `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId {
    pub const ERROR: ThreadId = ThreadId(u64::MAX);

    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// Base or effective priority. [0, 63]; higher runs first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const MIN: Priority = Priority(0);
    pub const DEFAULT: Priority = Priority(31);
    pub const MAX: Priority = Priority(63);

    pub fn clamp(self) -> Priority {
        Priority(self.0.clamp(Self::MIN.0, Self::MAX.0))
    }
}

/// Niceness, MLFQS mode only. [-20, 20]; higher nice lowers priority.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nice(pub i32);

impl Nice {
    pub const MIN: Nice = Nice(-20);
    pub const DEFAULT: Nice = Nice(0);
    pub const MAX: Nice = Nice(20);

    pub fn clamp(self) -> Nice {
        Nice(self.0.clamp(Self::MIN.0, Self::MAX.0))
    }
}

/// Time slice duration in timer ticks. MLFQS uses the fixed 4-tick slice
/// from the spec; strict mode has no slice expiry beyond that same tick
/// quantum (preemption there is priority-driven, not slice-driven, but the
/// core still needs *a* quantum to decide when to re-poll the ready set).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeSliceTicks(pub u32);

impl TimeSliceTicks {
    pub const DEFAULT: TimeSliceTicks = TimeSliceTicks(4);
}

/// What a policy's `pick_next` decided.
#[derive(Debug, Clone)]
pub struct DispatchDecision {
    /// `None` means run the idle thread.
    pub next: Option<ThreadId>,
    pub timeslice: TimeSliceTicks,
}

impl DispatchDecision {
    pub fn run_thread(tid: ThreadId) -> Self {
        Self { next: Some(tid), timeslice: TimeSliceTicks::DEFAULT }
    }

    pub fn idle() -> Self {
        Self { next: None, timeslice: TimeSliceTicks::DEFAULT }
    }
}

/// What a Blocked thread is waiting on. Purely descriptive — the wait list
/// a blocked thread actually sits on is owned by the primitive it blocked
/// in, not derived from this.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Lock,
    Semaphore,
    Condvar,
    Sleep,
}

/// A thread's execution state. Ready and Blocked are mutually exclusive and
/// each implies reachability from exactly one structure (the ready
/// structure, or a single waiter list) — never both, never neither outside
/// Running/Dying.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// The two mutually exclusive scheduling policies. Fixed for the whole run
/// by the boot configuration (`config::BootConfig`); there is no runtime
/// switch between them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedMode {
    StrictPriority,
    Mlfqs,
}
