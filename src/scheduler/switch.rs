/*
 * Context switch mechanism
 *
 * Unlike the interrupt-frame-copy scheme this replaces, switching threads
 * here means calling `switch_threads`: a naked function that saves the
 * callee-saved registers of the outgoing thread, swaps `rsp`, and `ret`s
 * into the incoming thread's last save point. A brand-new thread's "last
 * save point" is a synthetic stack built by `prepare_initial_stack` that
 * makes the first `ret` land in `thread_trampoline` instead.
 *
 * `yield_interrupt_entry`/`timer_interrupt_entry` are installed directly at
 * raw addresses in the IDT (see `arch::x86_64::idt`), bypassing the
 * `x86_64` crate's `extern "x86-interrupt"` prologue — they have to save and
 * restore the caller-saved registers themselves before running any Rust.
 */

use core::arch::naked_asm;
use core::sync::atomic::{AtomicBool, Ordering};

use super::types::{CpuId, ThreadId};

/// Set while a `switch_threads` call is in flight, purely so
/// `timer_tick_body` can tell the difference between "a thread got
/// preempted" and "the idle loop's hlt got interrupted" for accounting.
static IN_SWITCH: AtomicBool = AtomicBool::new(false);

/// Set for the duration of the timer interrupt's Rust body. `sync.rs` reads
/// this to decide whether a semaphore `up()` is waking someone from inside
/// the tick handler (where `handle_tick`'s own dispatch will consume
/// `need_resched` before this interrupt returns, so no synchronous yield is
/// needed or safe) or from ordinary thread context (where it has to yield
/// itself if it just woke a higher-priority thread).
static IN_INTERRUPT: AtomicBool = AtomicBool::new(false);

pub(crate) fn in_interrupt_context() -> bool {
    IN_INTERRUPT.load(Ordering::Relaxed)
}

/// Swaps the running stack from the thread owning `*save_rsp` to the thread
/// whose last saved stack pointer is `next_rsp`. Returns `outgoing_tid.0` in
/// `rax` so the caller can reap the thread it just switched away from
/// (Pintos's `schedule_tail` trick) without needing a second lookup.
///
/// # Safety
/// `next_rsp` must point into a stack previously saved by this same function
/// or built by `prepare_initial_stack`, with interrupts disabled for the
/// whole call.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_threads(save_rsp: *mut u64, next_rsp: u64, outgoing_tid: u64) -> u64 {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",

        "mov [rdi], rsp",
        "mov rsp, rsi",

        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",

        "mov rax, rdx",
        "ret",
    )
}

/// Lays out a synthetic stack for a brand-new thread so that the first
/// `switch_threads` into it "returns" into `thread_trampoline` with
/// `entry`/`arg` waiting just above the callee-saved register block.
///
/// Layout from `stack_top` downward: `[arg][entry][trampoline return addr]
/// [rbp][rbx][r12][r13][r14][r15]`, matching exactly what `switch_threads`'s
/// epilogue pops. Returns the initial `rsp` to store as the thread's
/// `saved_rsp`.
pub fn prepare_initial_stack(stack_top: u64, entry: fn(usize), arg: usize) -> u64 {
    unsafe {
        let mut sp = stack_top & !0xF;

        sp -= 8;
        *(sp as *mut u64) = arg as u64;
        sp -= 8;
        *(sp as *mut u64) = entry as usize as u64;

        sp -= 8;
        *(sp as *mut u64) = thread_trampoline as usize as u64;

        for _ in 0..6 {
            sp -= 8;
            *(sp as *mut u64) = 0;
        }

        sp
    }
}

/// First code a new thread ever runs. Pops `entry`/`arg` (pushed just above
/// the synthetic callee-saved block by `prepare_initial_stack`, so they sit
/// right after `switch_threads`'s `ret`) and calls into `thread_entry_rust`.
#[unsafe(naked)]
unsafe extern "C" fn thread_trampoline() -> ! {
    naked_asm!(
        "pop rdi",
        "pop rsi",
        "call {entry}",
        entry = sym thread_entry_rust,
    )
}

/// `rdi` = entry point address (passed as `fn(usize)` cast to `u64` by
/// `prepare_initial_stack`), `rsi` = arg. A new thread starts with
/// interrupts disabled (it was "switched to" under `without_interrupts`), so
/// the first thing it does is turn them back on.
extern "C" fn thread_entry_rust(entry: u64, arg: u64) -> ! {
    crate::arch::x86_64::interrupts::enable();
    let entry: fn(usize) = unsafe { core::mem::transmute(entry as usize) };
    entry(arg as usize);
    super::thread::ThreadManager::exit();
}

/// Body called from `yield_interrupt_entry`'s asm shell, with the saved
/// register frame already off to the side on the interrupted thread's
/// stack. Runs with interrupts disabled (we're in an interrupt handler).
#[unsafe(no_mangle)]
extern "C" fn yield_body() {
    super::sched_core::reschedule_from_interrupt(CpuId::BSP);
}

/// Body called from `timer_interrupt_entry`'s asm shell on every PIT tick.
#[unsafe(no_mangle)]
extern "C" fn timer_tick_body() {
    IN_SWITCH.store(false, Ordering::Relaxed);
    IN_INTERRUPT.store(true, Ordering::Relaxed);
    super::timer::on_tick_hook();
    IN_INTERRUPT.store(false, Ordering::Relaxed);
    unsafe { crate::arch::x86_64::idt::pic_eoi(0) };
}

/// Raw IDT target for `INT 0x81`, the voluntary-yield vector. Installed by
/// `set_handler_addr` + `transmute`, which skips the `x86_64` crate's
/// automatic register save/restore — this function is that save/restore,
/// by hand, around a call into `yield_body` followed by `iretq`.
#[unsafe(naked)]
pub unsafe extern "C" fn yield_interrupt_entry() {
    naked_asm!(
        "push rax",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",

        "call {body}",

        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rax",
        "iretq",

        body = sym yield_body,
    )
}

/// Raw IDT target for IRQ0 (PIT), vector 32. Same hand-written
/// save/restore shell as `yield_interrupt_entry`, around the timer tick
/// body and its EOI.
#[unsafe(naked)]
pub unsafe extern "C" fn timer_interrupt_entry() {
    naked_asm!(
        "push rax",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",

        "call {body}",

        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rax",
        "iretq",

        body = sym timer_tick_body,
    )
}

/// Reaps a thread that `reschedule_from_interrupt`/`yield_now` just switched
/// away from, if it was exiting. Called right after `switch_threads`
/// returns, on the *new* thread's stack, mirroring Pintos's
/// `schedule_tail`.
pub fn schedule_tail(outgoing: ThreadId) {
    super::with_scheduler_mut(|s| s.reap_if_dying(outgoing));
}
