/*
 * Kernel entry point
 *
 * Boots on a single core via `bootloader_api`'s `entry_point!`, brings up
 * the GDT/IDT, maps the kernel heap, picks a scheduling policy from boot
 * config, spawns the self-test threads, and enables preemption. Everything
 * after `SchedulerManager::enable()` runs as scheduled kernel threads; the
 * BSP itself becomes the idle thread's fallback `hlt` loop.
 */

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![feature(abi_x86_interrupt)]

extern crate alloc;

mod arch;
mod config;
mod drivers;
mod fixed_point;
mod logging;
mod memory;
mod scheduler;
mod selftest;

#[cfg(not(test))]
use core::panic::PanicInfo;

#[cfg(not(test))]
use bootloader_api::config::{BootloaderConfig, Mapping};
#[cfg(not(test))]
use bootloader_api::{BootInfo, entry_point};
#[cfg(not(test))]
use x86_64::VirtAddr;

#[cfg(not(test))]
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

#[cfg(not(test))]
entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

#[cfg(not(test))]
fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    drivers::serial::init();
    logging::init(log::LevelFilter::Info);
    log::info!("scheduling core kernel starting");

    arch::x86_64::gdt::init();
    arch::x86_64::idt::init();

    let phys_mem_offset = VirtAddr::new(
        boot_info
            .physical_memory_offset
            .into_option()
            .expect("bootloader did not map physical memory"),
    );
    let mut mapper = unsafe { memory::init(phys_mem_offset) };
    let mut frame_allocator = unsafe { memory::BootInfoFrameAllocator::init(&boot_info.memory_regions) };
    memory::heap::init_heap(&mut mapper, &mut frame_allocator).expect("heap initialization failed");
    log::info!("heap mapped at {:#x}, {} KiB", memory::heap::HEAP_START, memory::heap::HEAP_SIZE / 1024);

    // thread_init equivalent: freeze the boot configuration and bring up the
    // thread table before any interrupt that could touch it is unmasked.
    config::set(config::BootConfig::default());
    scheduler::SchedulerManager::init();

    selftest::spawn_all();

    // thread_start equivalent: spawn idle and flip on preemption. No thread
    // other than the bootstrap thread has run before this point.
    scheduler::SchedulerManager::enable();
    x86_64::instructions::interrupts::enable();
    log::info!("preemption enabled, entering idle loop");

    loop {
        x86_64::instructions::hlt();
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    if let Some(location) = info.location() {
        log::error!("PANIC at {}:{}: {}", location.file(), location.line(), info.message());
    } else {
        log::error!("PANIC: {}", info.message());
    }

    loop {
        x86_64::instructions::hlt();
    }
}
