/*
 * Blocking synchronization primitives
 *
 * Layered the way Pintos layers them: `Semaphore` is the primitive blocking
 * mechanism, `Lock` is a binary semaphore plus ownership and priority
 * donation, and `Condvar` is built entirely on top of `Lock` and a private,
 * stack-local semaphore per waiter. None of the three touch thread internals
 * directly — they go through `scheduler::` free functions the same way any
 * other caller would.
 *
 * Every operation here that touches its own wait list runs with interrupts
 * disabled for the duration of the list manipulation. All three types hold
 * their mutable state behind `UnsafeCell` and expose `&self` methods rather
 * than `&mut self`: a kernel thread only ever touches the state of a lock it
 * shares with other threads inside a `without_interrupts` section, so on a
 * single CPU that section is already mutual exclusion, and the `'static`
 * statics scenarios are built against need a shared reference to begin with.
 */

use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::ptr::NonNull;

use super::types::{BlockReason, Priority, ThreadId};
use crate::arch::x86_64::interrupts::without_interrupts;

/// Maximum hops `propagate_donation` will walk before giving up. A teaching
/// kernel's lock graphs are shallow; a deeper chain than this means a bug
/// (most likely a cycle), not a legitimate nested-lock pattern.
pub const MAX_DONATION_DEPTH: usize = 8;

fn effective_priority_of(tid: ThreadId) -> Priority {
    super::with_scheduler(|s| s.get_thread(tid).map(|t| t.effective_priority))
        .unwrap_or(Priority::MIN)
}

/// Compares `woken`'s effective priority against the caller's and yields
/// synchronously if `woken` now outranks it, per the "wake a higher-priority
/// thread, yield immediately" rule. A no-op from interrupt context (the tick
/// handler's own `handle_tick` dispatch already consumes `need_resched`
/// before that interrupt returns, and `yield_now` would be unsafe to call
/// with interrupts disabled anyway).
fn yield_if_outranked_by(woken: ThreadId) {
    if super::switch::in_interrupt_context() {
        return;
    }
    let woken_priority = effective_priority_of(woken);
    let current_priority = effective_priority_of(super::current_thread_id());
    if woken_priority > current_priority {
        super::scheduler_manager::SchedulerManager::yield_now();
    }
}

/// Classic counting semaphore. `up` always increments and, if anyone is
/// waiting, wakes whichever waiter currently has the highest effective
/// priority — it does not hand the permit to them directly, they re-check
/// `value` themselves once scheduled, exactly as `down`'s loop expects.
///
/// Carries the `BlockReason` it reports to the scheduler core on `down`/`up`
/// so that a `Lock`'s or `Condvar`'s internal semaphore shows up as blocked
/// on `Lock`/`Condvar`, not generically on `Semaphore`.
pub struct Semaphore {
    inner: UnsafeCell<SemaphoreState>,
    reason: BlockReason,
}

struct SemaphoreState {
    value: usize,
    waiters: Vec<ThreadId>,
}

impl Semaphore {
    pub const fn new(value: usize) -> Self {
        Self::with_reason(value, BlockReason::Semaphore)
    }

    pub(crate) const fn with_reason(value: usize, reason: BlockReason) -> Self {
        Semaphore { inner: UnsafeCell::new(SemaphoreState { value, waiters: Vec::new() }), reason }
    }

    pub fn down(&self) {
        loop {
            let should_block = without_interrupts(|| {
                // SAFETY: interrupts are disabled, so no other thread can be
                // running on this single CPU while we hold this reference.
                let state = unsafe { &mut *self.inner.get() };
                if state.value == 0 {
                    let me = super::current_thread_id();
                    if !state.waiters.contains(&me) {
                        state.waiters.push(me);
                    }
                    super::block_current(self.reason);
                    true
                } else {
                    state.value -= 1;
                    false
                }
            });
            if !should_block {
                return;
            }
            super::scheduler_manager::SchedulerManager::yield_now();
        }
    }

    pub fn try_down(&self) -> bool {
        without_interrupts(|| {
            let state = unsafe { &mut *self.inner.get() };
            if state.value == 0 {
                false
            } else {
                state.value -= 1;
                true
            }
        })
    }

    pub fn up(&self) {
        let woken = without_interrupts(|| {
            let state = unsafe { &mut *self.inner.get() };
            state.value += 1;
            state
                .waiters
                .iter()
                .enumerate()
                .max_by_key(|&(_, &tid)| effective_priority_of(tid))
                .map(|(i, _)| i)
                .map(|pos| state.waiters.remove(pos))
        });
        if let Some(tid) = woken {
            super::wake(tid, self.reason);
            yield_if_outranked_by(tid);
        }
    }
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

/// A lock record tracking priorities donated to the holder by blocked
/// waiters. Keyed by waiter identity so `release` can remove exactly the
/// donations that came from this lock when it changes hands.
pub struct Lock {
    sema: Semaphore,
    inner: UnsafeCell<LockState>,
}

struct LockState {
    holder: Option<ThreadId>,
    donations: Vec<(ThreadId, Priority)>,
}

impl Lock {
    pub const fn new() -> Self {
        Lock {
            sema: Semaphore::with_reason(1, BlockReason::Lock),
            inner: UnsafeCell::new(LockState { holder: None, donations: Vec::new() }),
        }
    }

    pub fn is_held_by_current(&self) -> bool {
        let state = unsafe { &*self.inner.get() };
        state.holder == Some(super::current_thread_id())
    }

    pub fn acquire(&self) {
        let me = super::current_thread_id();

        without_interrupts(|| {
            // SAFETY: interrupts disabled, single CPU, no concurrent access.
            let state = unsafe { &mut *self.inner.get() };
            if let Some(holder) = state.holder {
                if holder != me {
                    let my_priority = effective_priority_of(me);
                    state.donations.push((me, my_priority));
                    super::with_scheduler_mut(|s| {
                        if let Some(t) = s.get_thread_mut(me) {
                            t.blocked_on_lock = Some(NonNull::from(self));
                        }
                    });
                    propagate_donation(holder, my_priority);
                }
            }
        });

        self.sema.down();

        without_interrupts(|| {
            super::with_scheduler_mut(|s| {
                if let Some(t) = s.get_thread_mut(me) {
                    t.blocked_on_lock = None;
                }
            });
            let state = unsafe { &mut *self.inner.get() };
            // Inherit whatever donations are still pending against this lock
            // (waiters that arrived while we were acquiring) into our own
            // thread-level donation set, then drop the ones that were ours.
            state.donations.retain(|&(tid, _)| tid != me);
            let inherited: Vec<Priority> = state.donations.iter().map(|&(_, p)| p).collect();
            super::with_scheduler_mut(|s| {
                if let Some(t) = s.get_thread_mut(me) {
                    t.donations.extend(inherited);
                    t.recompute_effective_priority();
                }
            });
            state.holder = Some(me);
        });
    }

    pub fn try_acquire(&self) -> bool {
        without_interrupts(|| {
            if self.sema.try_down() {
                let state = unsafe { &mut *self.inner.get() };
                state.holder = Some(super::current_thread_id());
                true
            } else {
                false
            }
        })
    }

    pub fn release(&self) {
        without_interrupts(|| {
            let state = unsafe { &mut *self.inner.get() };
            let me = state.holder.take().expect("release of unheld lock");

            let owed: Vec<Priority> = state.donations.iter().map(|&(_, p)| p).collect();
            super::with_scheduler_mut(|s| {
                if let Some(t) = s.get_thread_mut(me) {
                    for p in owed {
                        if let Some(pos) = t.donations.iter().position(|&d| d == p) {
                            t.donations.remove(pos);
                        }
                    }
                    t.recompute_effective_priority();
                }
            });
        });
        self.sema.up();
    }
}

unsafe impl Send for Lock {}
unsafe impl Sync for Lock {}

/// Walks holder -> blocked_on_lock -> holder chains, raising each link's
/// effective priority to at least `priority` as long as that actually raises
/// it. Bounded by `MAX_DONATION_DEPTH`; a chain that deep indicates a cycle,
/// which is a programming error in a teaching kernel, not a case to recover
/// from silently.
///
/// Pushes `priority` into the holder's own `donations` set at every hop
/// rather than only touching `effective_priority` directly — `Lock::release`
/// removes from a thread's `donations` just the entries it recognizes as
/// owed to the lock being released, then recomputes `effective_priority`
/// from whatever is left. A hop that skipped `donations` would leave nothing
/// there for a later, unrelated lock's release to find, so releasing any one
/// of several held locks would wipe out donations that arrived through the
/// others.
fn propagate_donation(mut holder: ThreadId, priority: Priority) {
    for _ in 0..MAX_DONATION_DEPTH {
        let (raised, next_lock) = super::with_scheduler_mut(|s| {
            let t = match s.get_thread_mut(holder) {
                Some(t) => t,
                None => return (false, None),
            };
            if priority > t.effective_priority {
                t.donations.push(priority);
                t.recompute_effective_priority();
                (true, t.blocked_on_lock)
            } else {
                (false, None)
            }
        });

        if !raised {
            return;
        }

        let next_lock = match next_lock {
            Some(l) => l,
            None => return,
        };

        // SAFETY: `blocked_on_lock` only ever points at a `Lock` owned by a
        // live caller of `acquire`, which cannot return (and thus cannot
        // drop its stack frame) while this thread is parked waiting on it.
        let lock = unsafe { next_lock.as_ref() };
        let lock_state = unsafe { &*lock.inner.get() };
        match lock_state.holder {
            Some(next_holder) if next_holder != holder => holder = next_holder,
            _ => return,
        }
    }
    panic!("donation chain exceeded MAX_DONATION_DEPTH; likely a lock cycle");
}

struct Waiter {
    tid: ThreadId,
    sema: NonNull<Semaphore>,
}

unsafe impl Send for Waiter {}

/// Monitor-style condition variable. Always used together with the `Lock`
/// passed to `wait`; `signal`/`broadcast` must themselves be called with
/// that same lock held.
pub struct Condvar {
    waiters: UnsafeCell<Vec<Waiter>>,
}

impl Condvar {
    pub const fn new() -> Self {
        Condvar { waiters: UnsafeCell::new(Vec::new()) }
    }

    pub fn wait(&self, lock: &Lock) {
        let local_sema = Semaphore::with_reason(0, BlockReason::Condvar);
        let tid = super::current_thread_id();

        without_interrupts(|| {
            let waiters = unsafe { &mut *self.waiters.get() };
            waiters.push(Waiter { tid, sema: NonNull::from(&local_sema) });
        });

        lock.release();
        local_sema.down();
        lock.acquire();
    }

    pub fn signal(&self, _lock: &Lock) {
        // The actual `up()` call happens outside this critical section.
        // `Semaphore::up` may call `yield_now()`, which refuses to fire
        // while interrupts are disabled — calling it nested inside this
        // function's own `without_interrupts` would silently turn every
        // condvar-driven wakeup into a no-op yield, even when the caller
        // itself holds no critical section at all.
        let waiter = without_interrupts(|| {
            let waiters = unsafe { &mut *self.waiters.get() };
            waiters
                .iter()
                .enumerate()
                .max_by_key(|(_, w)| effective_priority_of(w.tid))
                .map(|(i, _)| i)
                .map(|pos| waiters.remove(pos))
        });
        if let Some(mut waiter) = waiter {
            // SAFETY: the waiter's semaphore is a stack local owned by its
            // `wait` call, which is blocked on it and cannot return (and so
            // cannot drop that local) until this `up` wakes it.
            unsafe { waiter.sema.as_mut().up() };
        }
    }

    pub fn broadcast(&self, lock: &Lock) {
        loop {
            let empty = unsafe { (*self.waiters.get()).is_empty() };
            if empty {
                return;
            }
            self.signal(lock);
        }
    }
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}
