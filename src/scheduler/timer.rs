/*
 * Timer tick source and blocking sleep
 *
 * Owns the global tick counter and the list of threads parked in
 * `timer_sleep`. `on_tick_hook` is called from the timer interrupt's Rust
 * body (see `switch.rs`) before anything scheduling-related happens, so the
 * tick count and sleeper wakeups stay accurate even in strict-priority mode
 * where most ticks don't trigger a reschedule.
 *
 * The busy-wait delay functions are for short, sub-tick pauses during device
 * initialization and deliberately never touch the scheduler.
 */

use alloc::vec::Vec;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

use super::sync::Semaphore;
use super::types::{BlockReason, ThreadId};
use crate::arch::x86_64::interrupts::without_interrupts;

static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

struct Sleeper {
    tid: ThreadId,
    wake_at: u64,
    sema: NonNull<Semaphore>,
}

unsafe impl Send for Sleeper {}

static SLEEPERS: spin::Mutex<Vec<Sleeper>> = spin::Mutex::new(Vec::new());

/// Blocks the calling thread until at least `ticks` timer ticks have
/// elapsed. Does nothing in interrupt context or before the scheduler is up
/// — callers there must use one of the busy-delay variants instead.
pub fn timer_sleep(duration_ticks: u64) {
    if duration_ticks == 0 {
        return;
    }
    let mut local_sema = Semaphore::with_reason(0, BlockReason::Sleep);
    let wake_at = ticks() + duration_ticks;
    let tid = super::current_thread_id();

    without_interrupts(|| {
        SLEEPERS.lock().push(Sleeper { tid, wake_at, sema: NonNull::from(&local_sema) });
    });

    local_sema.down();
}

pub fn msleep(ms: u64) {
    timer_sleep(ms * crate::scheduler::TICKS_PER_SECOND / 1000);
}

pub fn usleep(us: u64) {
    timer_sleep((us * crate::scheduler::TICKS_PER_SECOND) / 1_000_000);
}

pub fn nsleep(ns: u64) {
    timer_sleep((ns * crate::scheduler::TICKS_PER_SECOND) / 1_000_000_000);
}

/// Busy-waits without blocking or touching the scheduler. Used for PIC/PIT
/// setup sequences where no thread context exists yet.
pub fn mdelay(ms: u64) {
    udelay(ms * 1000);
}

pub fn udelay(us: u64) {
    ndelay(us * 1000);
}

pub fn ndelay(ns: u64) {
    // Calibration-free spin; good enough for the short delays device
    // bring-up needs, not for anything timing-sensitive.
    let iterations = ns / 100 + 1;
    for _ in 0..iterations {
        core::hint::spin_loop();
    }
}

/// Called from the timer interrupt body on every tick. Wakes any sleepers
/// whose time has come, then hands off to the scheduler core.
pub fn on_tick_hook() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    let now = ticks();

    let due: Vec<NonNull<Semaphore>> = {
        let mut sleepers = SLEEPERS.lock();
        let mut due = Vec::new();
        sleepers.retain(|s| {
            if now >= s.wake_at {
                due.push(s.sema);
                false
            } else {
                true
            }
        });
        due
    };
    for mut sema in due {
        // SAFETY: each sleeper's semaphore is a stack local owned by its
        // `timer_sleep` call, parked on `down()` until this `up()` fires, so
        // the local cannot have been dropped yet.
        unsafe { sema.as_mut().up() };
    }

    super::sched_core::handle_tick();
}
