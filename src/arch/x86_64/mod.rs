/*
 * x86_64 Architecture Support Module
 *
 * Encapsulates everything CPU- and platform-specific: segment/descriptor
 * tables, the interrupt descriptor table, interrupt-enable control, and
 * raw port I/O. Generic kernel code (the scheduler, the sync primitives)
 * never reaches below this module.
 *
 * Submodules:
 * - gdt: Global Descriptor Table and TSS setup
 * - idt: Interrupt Descriptor Table, PIC remap, exception handling
 * - interrupts: interrupt enable/disable control, the scoped RAII guard
 * - pio: port-mapped I/O primitives used by the serial driver
 */

pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod pio;
