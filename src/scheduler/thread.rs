/*
 * Thread control block
 *
 * One `Thread` per schedulable kernel thread, including the bootstrap thread
 * that `thread_init` wraps around whatever was executing before the
 * scheduler existed. `ThreadManager` is the namespaced entry point the rest
 * of the kernel calls; the TCB table itself lives in `scheduler::Scheduler`
 * (see `scheduler.rs`) and is only ever touched with interrupts disabled.
 */

use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;

use super::sync::Lock;
use super::types::{CpuId, Nice, Priority, ThreadId, ThreadState};
use crate::fixed_point::Fixed;
use crate::memory::tcb_pool::StackHandle;

/// Donation slots per thread. A thread can be blocked on at most one lock at
/// a time, but can itself hold several locks, each with several waiters
/// donating to it, so this is sized well above the single-hop case.
pub const MAX_DONATIONS: usize = 8;

/// Thread control block.
///
/// `stack` is `None` only for the bootstrap thread (the one `thread_init`
/// promotes the current execution context into) — every other thread owns a
/// page-pool stack and is freed back to the pool when it exits.
pub struct Thread {
    pub id: ThreadId,
    name: [u8; 16],
    pub state: ThreadState,

    stack: Option<StackHandle>,
    /// Saved top-of-stack pointer; valid only while this thread is not
    /// Running. `switch_threads` reads/writes this directly.
    pub saved_rsp: u64,

    pub base_priority: Priority,
    pub effective_priority: Priority,
    /// Priorities donated to this thread by lower-priority threads it is
    /// blocking, most recent push last. Strict-priority mode only.
    pub donations: Vec<Priority>,
    /// The lock this thread is blocked trying to acquire, if any. Used to
    /// walk the donation chain past a single hop.
    pub blocked_on_lock: Option<NonNull<Lock>>,

    pub nice: Nice,
    pub recent_cpu: Fixed,
}

unsafe impl Send for Thread {}

impl Thread {
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }

    fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let n = bytes.len().min(self.name.len());
        self.name = [0u8; 16];
        self.name[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn new(id: ThreadId, name: &str, priority: Priority, stack: Option<StackHandle>) -> Self {
        let mut t = Thread {
            id,
            name: [0u8; 16],
            state: ThreadState::Ready,
            stack,
            saved_rsp: 0,
            base_priority: priority,
            effective_priority: priority,
            donations: Vec::with_capacity(MAX_DONATIONS),
            blocked_on_lock: None,
            nice: Nice::DEFAULT,
            recent_cpu: Fixed::ZERO,
        };
        t.set_name(name);
        t
    }

    pub fn stack_top(&self) -> Option<u64> {
        self.stack.as_ref().map(|s| s.top() as u64)
    }

    pub fn check_stack_overflow(&self) -> bool {
        self.stack.as_ref().map(|s| !s.check_magic()).unwrap_or(false)
    }

    /// Recomputes `effective_priority` from `base_priority` and whatever is
    /// currently in `donations` (the max of both, or base alone if empty).
    pub fn recompute_effective_priority(&mut self) {
        let donated_max = self.donations.iter().copied().max();
        self.effective_priority = match donated_max {
            Some(d) if d > self.base_priority => d,
            _ => self.base_priority,
        };
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state)
            .field("base_priority", &self.base_priority)
            .field("effective_priority", &self.effective_priority)
            .finish()
    }
}

/// Thread lifecycle management. Namespaced free functions over the global
/// scheduler singleton; a ZST so call sites read `ThreadManager::spawn(...)`
/// without implying any per-instance state.
pub struct ThreadManager;

impl ThreadManager {
    /// Spawns a new kernel thread at `base_priority`, returns its id, or
    /// `ThreadId::ERROR` if the stack pool or thread table is exhausted. The
    /// new thread is placed Ready immediately; if it outranks the creator's
    /// current effective priority, the creator yields before returning so
    /// the higher-priority thread actually gets the CPU right away rather
    /// than waiting for the next tick.
    pub fn spawn(entry: fn(usize), arg: usize, name: &str, base_priority: Priority) -> ThreadId {
        let creator = Self::current_id();
        let tid = crate::arch::x86_64::interrupts::without_interrupts(|| {
            let tid = super::with_scheduler_mut(|s| s.create_thread(entry, arg, name, base_priority));
            if !tid.is_error() {
                super::with_scheduler_and_core(|threads, core| {
                    core.thread_created(threads, CpuId::BSP, tid, base_priority);
                });
            }
            tid
        });

        if !tid.is_error() {
            let creator_priority =
                super::with_scheduler(|s| s.get_thread(creator).map(|t| t.effective_priority)).unwrap_or(Priority::MIN);
            if base_priority > creator_priority {
                super::scheduler_manager::SchedulerManager::yield_now();
            }
        }

        tid
    }

    pub fn current_id() -> ThreadId {
        super::current_thread_id()
    }

    pub fn with_current<F, R>(f: F) -> Option<R>
    where
        F: FnOnce(&Thread) -> R,
    {
        let id = Self::current_id();
        super::with_scheduler(|s| s.get_thread(id).map(f))
    }

    /// Changes the calling thread's base priority and notifies the policy.
    /// Lowering below the current effective priority does not itself cause a
    /// reschedule — the caller must `yield_now()` if it wants to observe the
    /// preemption immediately rather than at the next tick.
    pub fn set_priority(new: Priority) {
        let id = Self::current_id();
        crate::arch::x86_64::interrupts::without_interrupts(|| {
            let old = super::with_scheduler_mut(|s| {
                s.get_thread_mut(id).map(|t| {
                    let old = t.effective_priority;
                    t.base_priority = new;
                    t.recompute_effective_priority();
                    old
                })
            });
            if let Some(old) = old {
                let new_effective =
                    super::with_scheduler(|s| s.get_thread(id).map(|t| t.effective_priority)).unwrap_or(new);
                super::with_scheduler_and_core(|threads, core| {
                    core.thread_priority_changed(threads, CpuId::BSP, id, old, new_effective);
                });
            }
        });
    }

    /// Changes the calling thread's `nice` value (MLFQS only; has no effect
    /// on thread scheduling order under strict priority).
    pub fn set_nice(new: Nice) {
        let id = Self::current_id();
        crate::arch::x86_64::interrupts::without_interrupts(|| {
            super::with_scheduler_mut(|s| {
                if let Some(t) = s.get_thread_mut(id) {
                    t.nice = new;
                }
            });
        });
    }

    /// Terminates the calling thread. Never returns.
    pub fn exit() -> ! {
        let current = Self::current_id();
        crate::arch::x86_64::interrupts::without_interrupts(|| {
            super::with_scheduler_mut(|s| {
                if let Some(t) = s.get_thread_mut(current) {
                    t.state = ThreadState::Dying;
                }
            });
            super::with_scheduler_and_core(|threads, core| {
                core.thread_exited(threads, CpuId::BSP, current);
            });
        });
        super::scheduler_manager::SchedulerManager::yield_now();
        unreachable!("exited thread was scheduled again")
    }
}
