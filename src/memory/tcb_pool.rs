/*
 * Page-sized stack pool for thread control blocks
 *
 * Per the spec's relaxation of "TCB at page base, stack at page top"
 * (SPEC_FULL, design notes): the TCB itself is an ordinary heap-allocated
 * Rust struct, but each thread's kernel stack still comes from a fixed-size,
 * page-granular pool separate from the general heap, exactly as the
 * original design calls for a "page-sized allocator for thread control
 * blocks". A magic sentinel word is written at the low end of each stack at
 * allocation time and checked by `thread::current()` to detect overflow.
 *
 * The pool is a plain free-list bitmap over a static array; it is sized for
 * a teaching kernel's thread count, not for general-purpose use.
 */

use spin::Mutex;

pub const STACK_SIZE: usize = 4096 * 4; // 16 KiB per thread stack
pub const POOL_CAPACITY: usize = 256;
pub const MAGIC: u32 = 0xC0FF_EE42;

#[repr(align(4096))]
struct Slot([u8; STACK_SIZE]);

struct Pool {
    slots: [Slot; POOL_CAPACITY],
    free: [bool; POOL_CAPACITY],
}

static POOL: Mutex<Pool> = Mutex::new(Pool {
    slots: [const { Slot([0u8; STACK_SIZE]) }; POOL_CAPACITY],
    free: [true; POOL_CAPACITY],
});

/// A single thread's stack allocation. `base` is the lowest address
/// (where the magic sentinel lives); the stack itself grows down from
/// `base + STACK_SIZE`.
pub struct StackHandle {
    index: usize,
    base: *mut u8,
}

unsafe impl Send for StackHandle {}

impl StackHandle {
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.add(STACK_SIZE) }
    }

    /// Reads the sentinel at the base of the stack. A mismatch means the
    /// stack has overflowed into the TCB's bookkeeping region.
    pub fn check_magic(&self) -> bool {
        unsafe { core::ptr::read_unaligned(self.base as *const u32) == MAGIC }
    }
}

impl Drop for StackHandle {
    fn drop(&mut self) {
        POOL.lock().free[self.index] = true;
    }
}

/// Number of stacks currently unallocated. Used by self-tests to verify that
/// exiting threads actually return their stack to the pool.
pub fn free_count() -> usize {
    POOL.lock().free.iter().filter(|&&f| f).count()
}

/// Allocates one page-backed stack. Returns `None` if the pool is exhausted
/// — the caller (thread creation) must surface this as the reserved error
/// tid, not panic.
pub fn alloc_stack() -> Option<StackHandle> {
    let mut pool = POOL.lock();
    let index = pool.free.iter().position(|&f| f)?;
    pool.free[index] = false;
    let base = pool.slots[index].0.as_mut_ptr();
    unsafe {
        core::ptr::write_unaligned(base as *mut u32, MAGIC);
    }
    Some(StackHandle { index, base })
}
