/*
 * Scheduler subsystem
 *
 * Two independent scheduling policies sit behind the `Scheduler` trait in
 * `traits.rs` — strict-priority with donation (`policies::strict`) and
 * 4.4BSD MLFQS (`policies::mlfqs`) — chosen once at boot by
 * `scheduler_manager::init()` from `config::get().mlfqs` and never switched
 * at runtime. Everything above that split (threads, locks, semaphores,
 * condvars, timer sleep) is policy-agnostic and lives in the sibling modules.
 *
 * This file is deliberately thin: module wiring, the two global locks
 * (`SCHEDULER` for the thread table, `SCHEDULER_CORE` for the mechanism
 * layer — kept as two separate `Mutex`es, not one struct, so a caller can
 * hold one without the other and `SchedContext` can borrow both
 * independently), and the handful of free functions every other module in
 * this tree calls through `super::`.
 */

pub mod context;
pub mod events;
pub mod policies;
pub mod sched_core;
pub mod scheduler;
pub mod scheduler_manager;
pub mod switch;
pub mod sync;
pub mod thread;
pub mod timer;
pub mod traits;
pub mod types;

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use scheduler::Scheduler as ThreadTable;
use sched_core::SchedulerCore;
use types::{BlockReason, ThreadId, ThreadState};

pub use scheduler_manager::SchedulerManager;
pub use thread::ThreadManager;

/// Timer ticks per second. The PIT is programmed for this rate during boot;
/// everything in `timer.rs` that converts wall-clock units to ticks assumes
/// this value.
pub const TICKS_PER_SECOND: u64 = 100;

static SCHEDULER: spin::Mutex<Option<ThreadTable>> = spin::Mutex::new(None);
static SCHEDULER_CORE: spin::Mutex<Option<SchedulerCore>> = spin::Mutex::new(None);
static CURRENT_THREAD_ID: AtomicU64 = AtomicU64::new(0);
static SCHEDULER_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&ThreadTable) -> R,
{
    let guard = SCHEDULER.lock();
    f(guard.as_ref().expect("scheduler accessed before init"))
}

pub fn with_scheduler_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut ThreadTable) -> R,
{
    let mut guard = SCHEDULER.lock();
    f(guard.as_mut().expect("scheduler accessed before init"))
}

/// Locks both globals and hands the closure independent `&mut` references
/// to the thread table and the scheduler core — two distinct `MutexGuard`s,
/// not one struct, which is what lets `SchedContext` borrow both without an
/// aliasing conflict (see `context.rs`).
pub fn with_scheduler_and_core<F, R>(f: F) -> R
where
    F: FnOnce(&mut ThreadTable, &mut SchedulerCore) -> R,
{
    let mut sched_guard = SCHEDULER.lock();
    let mut core_guard = SCHEDULER_CORE.lock();
    let threads = sched_guard.as_mut().expect("scheduler accessed before init");
    let core = core_guard.as_mut().expect("scheduler core accessed before init");
    f(threads, core)
}

pub fn current_thread_id() -> ThreadId {
    ThreadId(CURRENT_THREAD_ID.load(Ordering::Relaxed))
}

pub fn is_enabled() -> bool {
    SCHEDULER_ENABLED.load(Ordering::SeqCst)
}

/// Marks the calling thread `Blocked` and notifies the active policy. The
/// caller is responsible for arranging a matching `wake` — there is no
/// timeout here, that's what `timer::timer_sleep` is for.
pub fn block_current(reason: BlockReason) {
    let current = current_thread_id();
    crate::arch::x86_64::interrupts::without_interrupts(|| {
        with_scheduler_mut(|s| {
            if let Some(t) = s.get_thread_mut(current) {
                t.state = ThreadState::Blocked;
            }
        });
        with_scheduler_and_core(|threads, core| {
            core.thread_blocked(threads, types::CpuId::BSP, current, reason);
        });
    });
}

/// Moves `tid` from `Blocked` back to `Ready` and notifies the policy. A
/// no-op if the thread was not actually blocked (a lost race between `up`
/// and a concurrent `wake` on the same thread is harmless, just redundant).
/// `reason` should be the reason this thread actually blocked for (the
/// waking primitive knows this; see `sync::Semaphore`), not assumed.
pub fn wake(tid: ThreadId, reason: BlockReason) {
    crate::arch::x86_64::interrupts::without_interrupts(|| {
        let was_blocked = with_scheduler_mut(|s| {
            s.get_thread_mut(tid)
                .map(|t| {
                    if t.state == ThreadState::Blocked {
                        t.state = ThreadState::Ready;
                        true
                    } else {
                        false
                    }
                })
                .unwrap_or(false)
        });
        if was_blocked {
            with_scheduler_and_core(|threads, core| {
                core.thread_woke(threads, types::CpuId::BSP, tid, reason);
            });
        }
    });
}

/// Performs the actual stack switch from `current` to `next` and reaps
/// `current` afterward if it was the thread that exited. Always called with
/// interrupts disabled. Note that the thread resumed by the eventual
/// `switch_threads` return is not necessarily `current` resuming `next` —
/// it's whatever thread this function's caller's stack belongs to, which is
/// why `schedule_tail` uses the register-returned outgoing id rather than
/// anything captured here.
pub fn switch_to(current: ThreadId, next: ThreadId) {
    let save_rsp_ptr: *mut u64 = with_scheduler_mut(|s| {
        s.get_thread_mut(current).map(|t| &mut t.saved_rsp as *mut u64)
    })
    .expect("switch_to: current thread missing from table");

    let next_rsp = with_scheduler(|s| s.get_thread(next).map(|t| t.saved_rsp))
        .expect("switch_to: next thread missing from table");

    CURRENT_THREAD_ID.store(next.0, Ordering::Relaxed);

    // SAFETY: both threads' saved stack pointers were produced either by a
    // prior `switch_threads` call or by `prepare_initial_stack`, and
    // interrupts are disabled for the whole call per this function's
    // contract.
    let outgoing_tid = unsafe { switch::switch_threads(save_rsp_ptr, next_rsp, current.0) };

    switch::schedule_tail(ThreadId(outgoing_tid));
}
