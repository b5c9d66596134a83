/*
 * Thread table
 *
 * `Scheduler` (an unfortunate name shared with the `Scheduler` policy trait,
 * kept because it already reads that way throughout this module) owns every
 * `Thread` and the bookkeeping needed to create and reap them. It knows
 * nothing about scheduling policy — that's `SchedulerCore` and the
 * `policies::` implementations — only about thread identity, stacks, and
 * lifecycle.
 */

use alloc::vec::Vec;

use super::switch::prepare_initial_stack;
use super::thread::Thread;
use super::types::{Priority, ThreadId, ThreadState};
use crate::memory::tcb_pool::alloc_stack;

pub struct Scheduler {
    threads: Vec<Thread>,
    next_thread_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler { threads: Vec::new(), next_thread_id: 1 }
    }

    /// Wraps the execution context the kernel is already running on (the
    /// boot stack) as thread 0, the thread `thread_init` never explicitly
    /// switches away from until the first real `schedule()`.
    pub fn bootstrap_current_thread(&mut self, name: &str, priority: Priority) -> ThreadId {
        let id = ThreadId(0);
        let mut t = Thread::new(id, name, priority, None);
        t.state = ThreadState::Running;
        self.threads.push(t);
        id
    }

    /// Allocates a stack, builds its initial register frame, and registers
    /// a new Ready thread. Returns `ThreadId::ERROR` if the stack pool is
    /// exhausted.
    pub fn create_thread(&mut self, entry: fn(usize), arg: usize, name: &str, priority: Priority) -> ThreadId {
        let stack = match alloc_stack() {
            Some(s) => s,
            None => {
                log::error!("create_thread: stack pool exhausted");
                return ThreadId::ERROR;
            }
        };

        let stack_top = stack.top() as u64;
        let id = ThreadId(self.next_thread_id);
        self.next_thread_id += 1;

        let mut t = Thread::new(id, name, priority, Some(stack));
        t.saved_rsp = prepare_initial_stack(stack_top, entry, arg);
        self.threads.push(t);

        log::info!("created thread '{}' ({}) at priority {:?}", name, id, priority);
        id
    }

    pub fn get_thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == tid)
    }

    pub fn get_thread_mut(&mut self, tid: ThreadId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == tid)
    }

    pub fn all_thread_ids(&self) -> Vec<ThreadId> {
        self.threads.iter().map(|t| t.id).collect()
    }

    pub fn ready_count(&self) -> usize {
        self.threads.iter().filter(|t| t.state == ThreadState::Ready).count()
    }

    /// Frees a thread's stack back to the pool if it was marked `Dying`,
    /// called right after the context switch away from it completes so its
    /// own stack is never freed while still in use.
    pub fn reap_if_dying(&mut self, tid: ThreadId) {
        if tid == ThreadId(0) {
            return;
        }
        if let Some(pos) = self.threads.iter().position(|t| t.id == tid && t.state == ThreadState::Dying) {
            let t = self.threads.remove(pos);
            log::debug!("reaped thread {} ({})", tid, t.name());
        }
    }
}
