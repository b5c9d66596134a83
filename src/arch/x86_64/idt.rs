/*
 * Interrupt Descriptor Table (IDT) Implementation
 *
 * Entries 0-31 are CPU exceptions; everything below here outside
 * double-fault is treated as fatal and halts, per the halt-on-precondition-
 * violation policy the scheduler core also follows. IRQ0 (the timer, vector
 * 32) and the software yield vector (0x81) are wired to the naked-asm
 * trampolines in `scheduler::switch` rather than to `extern "x86-interrupt"`
 * handlers, because those trampolines perform the actual context switch and
 * must control the full register save/restore sequence themselves.
 */

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};

/// Sends End of Interrupt to the PIC. IRQs 8-15 are routed through the slave
/// PIC and need an EOI there too before the master's.
pub(crate) unsafe fn pic_eoi(irq: u8) {
    use x86_64::instructions::port::Port;

    if irq >= 8 {
        unsafe { Port::<u8>::new(0xA0).write(0x20) };
    }
    unsafe { Port::<u8>::new(0x20).write(0x20) };
}

/// Remaps the 8259 PIC so IRQs 0-15 land on vectors 32-47, clear of the
/// CPU-exception range.
fn remap_pic() {
    use x86_64::instructions::port::Port;

    unsafe {
        let mut master_cmd = Port::<u8>::new(0x20);
        let mut master_data = Port::<u8>::new(0x21);
        let mut slave_cmd = Port::<u8>::new(0xA0);
        let mut slave_data = Port::<u8>::new(0xA1);

        let master_mask = master_data.read();
        let slave_mask = slave_data.read();

        master_cmd.write(0x11u8);
        slave_cmd.write(0x11u8);
        master_data.write(32u8); // master PIC vector offset
        slave_data.write(40u8); // slave PIC vector offset
        master_data.write(4u8); // tell master about slave at IRQ2
        slave_data.write(2u8);
        master_cmd.write(0x01u8);
        slave_cmd.write(0x01u8);

        master_data.write(master_mask);
        slave_data.write(slave_mask);
    }
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.debug.set_handler_fn(debug_handler);
        idt.non_maskable_interrupt.set_handler_fn(nmi_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(overflow_handler);
        idt.bound_range_exceeded.set_handler_fn(bound_range_exceeded_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.device_not_available.set_handler_fn(device_not_available_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(invalid_tss_handler);
        idt.segment_not_present.set_handler_fn(segment_not_present_handler);
        idt.stack_segment_fault.set_handler_fn(stack_segment_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.x87_floating_point.set_handler_fn(x87_floating_point_handler);
        idt.alignment_check.set_handler_fn(alignment_check_handler);
        idt.machine_check.set_handler_fn(machine_check_handler);
        idt.simd_floating_point.set_handler_fn(simd_floating_point_handler);
        idt.virtualization.set_handler_fn(virtualization_handler);
        idt.security_exception.set_handler_fn(security_exception_handler);

        // Software interrupt for voluntary yield: `int 0x81` from yield_now().
        unsafe {
            idt[0x81].set_handler_addr(
                core::mem::transmute::<*const (), x86_64::VirtAddr>(
                    crate::scheduler::switch::yield_interrupt_entry as *const (),
                ),
            );
        }

        // IRQ0 -> vector 32: the preemptive timer tick.
        unsafe {
            idt[32].set_handler_addr(
                core::mem::transmute::<*const (), x86_64::VirtAddr>(
                    crate::scheduler::switch::timer_interrupt_entry as *const (),
                ),
            );
        }

        idt
    };
}

/// Sets up the IDT and remaps the PIC. Must run before interrupts are enabled.
pub fn init() {
    log::info!("Remapping PIC...");
    remap_pic();
    log::info!("Loading IDT...");
    IDT.load();
    log::info!("IDT initialized");
}

extern "x86-interrupt" fn divide_error_handler(frame: InterruptStackFrame) {
    fatal_exception("DIVIDE_ERROR", &frame);
}

extern "x86-interrupt" fn debug_handler(_frame: InterruptStackFrame) {
    log::trace!("debug exception");
}

extern "x86-interrupt" fn nmi_handler(frame: InterruptStackFrame) {
    fatal_exception("NMI", &frame);
}

extern "x86-interrupt" fn breakpoint_handler(frame: InterruptStackFrame) {
    log::warn!("breakpoint at {:?}", frame.instruction_pointer);
}

extern "x86-interrupt" fn overflow_handler(frame: InterruptStackFrame) {
    fatal_exception("OVERFLOW", &frame);
}

extern "x86-interrupt" fn bound_range_exceeded_handler(frame: InterruptStackFrame) {
    fatal_exception("BOUND_RANGE_EXCEEDED", &frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(frame: InterruptStackFrame) {
    fatal_exception("INVALID_OPCODE", &frame);
}

extern "x86-interrupt" fn device_not_available_handler(frame: InterruptStackFrame) {
    fatal_exception("DEVICE_NOT_AVAILABLE", &frame);
}

extern "x86-interrupt" fn double_fault_handler(frame: InterruptStackFrame, _error_code: u64) -> ! {
    log::error!("DOUBLE_FAULT at {:?}", frame.instruction_pointer);
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn invalid_tss_handler(frame: InterruptStackFrame, _error_code: u64) {
    fatal_exception("INVALID_TSS", &frame);
}

extern "x86-interrupt" fn segment_not_present_handler(frame: InterruptStackFrame, _error_code: u64) {
    fatal_exception("SEGMENT_NOT_PRESENT", &frame);
}

extern "x86-interrupt" fn stack_segment_fault_handler(frame: InterruptStackFrame, _error_code: u64) {
    fatal_exception("STACK_SEGMENT_FAULT", &frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(frame: InterruptStackFrame, _error_code: u64) {
    fatal_exception("GENERAL_PROTECTION_FAULT", &frame);
}

extern "x86-interrupt" fn page_fault_handler(
    frame: InterruptStackFrame,
    error_code: x86_64::structures::idt::PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;
    let fault_addr = Cr2::read();
    log::error!("PAGE_FAULT at {:?}, addr {:?}, code {:?}", frame.instruction_pointer, fault_addr, error_code);
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn x87_floating_point_handler(frame: InterruptStackFrame) {
    fatal_exception("X87_FP_EXCEPTION", &frame);
}

extern "x86-interrupt" fn alignment_check_handler(frame: InterruptStackFrame, _error_code: u64) {
    fatal_exception("ALIGNMENT_CHECK", &frame);
}

extern "x86-interrupt" fn machine_check_handler(frame: InterruptStackFrame) -> ! {
    log::error!("MACHINE_CHECK at {:?}", frame.instruction_pointer);
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn simd_floating_point_handler(frame: InterruptStackFrame) {
    fatal_exception("SIMD_FP_EXCEPTION", &frame);
}

extern "x86-interrupt" fn virtualization_handler(frame: InterruptStackFrame) {
    fatal_exception("VIRTUALIZATION_EXCEPTION", &frame);
}

extern "x86-interrupt" fn security_exception_handler(frame: InterruptStackFrame, _error_code: u64) {
    fatal_exception("SECURITY_EXCEPTION", &frame);
}

fn fatal_exception(name: &str, frame: &InterruptStackFrame) -> ! {
    log::error!("{} at {:?}", name, frame.instruction_pointer);
    loop {
        x86_64::instructions::hlt();
    }
}
