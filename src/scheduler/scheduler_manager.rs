/*
 * Scheduler Manager
 *
 * Public control surface over the scheduler singleton: picking the active
 * policy at boot, spawning the idle thread, flipping on preemption, and the
 * voluntary-yield/sleep entry points the rest of the kernel calls. The
 * blocking primitives in `sync.rs`/`timer.rs` go around this and call the
 * free functions in `mod.rs` (`block_current`, `wake`, `switch_to`) directly,
 * since they need no policy-selection logic.
 */

use alloc::boxed::Box;
use core::arch::asm;
use core::sync::atomic::Ordering;

use super::policies::{MlfqsPolicy, StrictPriorityPolicy};
use super::sched_core::SchedulerCore;
use super::traits::Scheduler as Policy;
use super::types::Priority;
use super::{SCHEDULER, SCHEDULER_CORE, SCHEDULER_ENABLED};

fn idle_thread_main(_arg: usize) {
    loop {
        if SCHEDULER_ENABLED.load(Ordering::SeqCst) {
            x86_64::instructions::interrupts::enable_and_hlt();
        } else {
            core::hint::spin_loop();
        }
    }
}

pub struct SchedulerManager;

impl SchedulerManager {
    /// Builds the thread table and the scheduler core with whichever policy
    /// `config::get().mlfqs` selected, wraps the currently-executing context
    /// as thread 0, and stores both behind the global locks. Must run before
    /// any interrupt that could touch the scheduler is unmasked.
    pub fn init() {
        let mlfqs = crate::config::get().mlfqs;

        let policy: Box<dyn Policy> = if mlfqs {
            Box::new(MlfqsPolicy::new())
        } else {
            Box::new(StrictPriorityPolicy::new())
        };
        log::info!("scheduler policy selected: {}", policy.name());

        let mut scheduler = super::scheduler::Scheduler::new();
        scheduler.bootstrap_current_thread("kernel", Priority::DEFAULT);
        let core = SchedulerCore::new(policy);

        crate::arch::x86_64::interrupts::without_interrupts(|| {
            *SCHEDULER.lock() = Some(scheduler);
            *SCHEDULER_CORE.lock() = Some(core);
        });

        log::info!("scheduler initialized");
    }

    /// Spawns the idle thread and flips on preemptive scheduling. Must be
    /// called after `init()` and before the boot thread starts relying on
    /// timer-driven context switches.
    pub fn enable() {
        super::thread::ThreadManager::spawn(idle_thread_main, 0, "idle", Priority::MIN);
        log::info!("idle thread spawned");
        SCHEDULER_ENABLED.store(true, Ordering::SeqCst);
        log::info!("preemptive scheduling enabled");
    }

    pub fn is_enabled() -> bool {
        SCHEDULER_ENABLED.load(Ordering::SeqCst)
    }

    /// Voluntarily gives up the CPU via the same interrupt-based context
    /// switch path the timer uses (`INT 0x81`), so a thread that calls this
    /// in a busy-wait loop behaves identically to one that gets preempted.
    pub fn yield_now() {
        if !SCHEDULER_ENABLED.load(Ordering::SeqCst) {
            return;
        }
        if !crate::arch::x86_64::interrupts::are_enabled() {
            log::warn!("yield_now called with interrupts disabled, ignoring");
            return;
        }
        unsafe {
            asm!("int 0x81", options(nostack));
        }
    }

    /// Blocking sleep for `ms` milliseconds, delegated to the timer's
    /// tick-based sleeper list. Falls back to a busy `hlt` loop before the
    /// scheduler is enabled, since there is no thread to block yet.
    pub fn sleep_ms(ms: u64) {
        if !SCHEDULER_ENABLED.load(Ordering::SeqCst) {
            let ticks_target = super::timer::ticks() + ms * super::TICKS_PER_SECOND / 1000;
            while super::timer::ticks() < ticks_target {
                x86_64::instructions::hlt();
            }
            return;
        }
        super::timer::msleep(ms);
    }
}
