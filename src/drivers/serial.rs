/*
 * 16550 UART serial port driver
 *
 * The only console this kernel has: every `log` record goes out over COM1.
 * Built on the port-I/O primitives in `arch::x86_64::pio` rather than a
 * crate, since the register layout is five bytes and not worth a dependency.
 */

use crate::arch::x86_64::pio::{Io, Pio, ReadOnly};
use bitflags::bitflags;

bitflags! {
    struct LineStsFlags: u8 {
        const INPUT_FULL = 1;
        const OUTPUT_EMPTY = 1 << 5;
    }
}

const COM1_BASE: u16 = 0x3F8;

pub struct SerialPort {
    data: Pio<u8>,
    int_en: Pio<u8>,
    fifo_ctrl: Pio<u8>,
    line_ctrl: Pio<u8>,
    modem_ctrl: Pio<u8>,
    line_sts: ReadOnly<Pio<u8>>,
}

impl SerialPort {
    const fn new(base: u16) -> SerialPort {
        SerialPort {
            data: Pio::new(base),
            int_en: Pio::new(base + 1),
            fifo_ctrl: Pio::new(base + 2),
            line_ctrl: Pio::new(base + 3),
            modem_ctrl: Pio::new(base + 4),
            line_sts: ReadOnly::new(Pio::new(base + 5)),
        }
    }

    pub fn init(&mut self) {
        self.int_en.write(0x00); // disable interrupts while configuring
        self.line_ctrl.write(0x80); // enable DLAB to set baud divisor
        self.data.write(0x01); // divisor low byte: 115200 baud
        self.int_en.write(0x00); // divisor high byte
        self.line_ctrl.write(0x03); // 8 bits, no parity, one stop bit
        self.fifo_ctrl.write(0xC7); // enable FIFO, clear, 14-byte threshold
        self.modem_ctrl.write(0x0B); // assert DTR, RTS, OUT2
        self.int_en.write(0x01); // enable data-available interrupt
    }

    fn line_sts(&self) -> LineStsFlags {
        LineStsFlags::from_bits_truncate(self.line_sts.read())
    }

    fn send(&mut self, byte: u8) {
        while !self.line_sts().contains(LineStsFlags::OUTPUT_EMPTY) {}
        self.data.write(byte);
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            8 | 0x7F => {
                self.send(8);
                self.send(b' ');
                self.send(8);
            }
            b'\n' => {
                self.send(b'\r');
                self.send(b'\n');
            }
            _ => self.send(byte),
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

pub static COM1: spin::Mutex<SerialPort> = spin::Mutex::new(SerialPort::new(COM1_BASE));

pub fn init() {
    COM1.lock().init();
}
