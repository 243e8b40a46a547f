//! BIOS services reached through software interrupts.
//!
//! Only the video service (INT 0x10) exists, and of that only teletype
//! output (AH = 0x0E). Characters are sent to the console port wrapped in an
//! ANSI colour escape.

use crate::cpu::registers::{AH, AL, BL};
use crate::cpu::Cpu;
use crate::io::{PortIo, COM1};

/// Interrupt vector of the video service.
pub const VIDEO_INTERRUPT: u8 = 0x10;

/// Video function: write a character as a teletype.
pub const TELETYPE_OUTPUT: u8 = 0x0E;

/// BIOS colour (low three bits) to ANSI foreground colour.
const BIOS_TO_TERMINAL: [u8; 8] = [30, 34, 32, 36, 31, 35, 33, 37];

/// Handle INT 0x10. Unknown functions are reported and skipped.
pub fn video(cpu: &Cpu, io: &mut dyn PortIo) {
    let function = cpu.regs.get8(AH);
    match function {
        TELETYPE_OUTPUT => teletype(cpu, io),
        _ => tracing::warn!("not implemented BIOS video function: {function:#04x}"),
    }
}

fn teletype(cpu: &Cpu, io: &mut dyn PortIo) {
    let color = cpu.regs.get8(BL) & 0x0F;
    let ch = cpu.regs.get8(AL);

    for byte in styled_char(ch, color).bytes() {
        io.write_byte(COM1, byte);
    }
}

/// Render one character with a 4-bit BIOS colour as an ANSI sequence.
pub fn styled_char(ch: u8, color: u8) -> String {
    let terminal_color = BIOS_TO_TERMINAL[usize::from(color & 0x07)];
    let bright = u8::from(color & 0x08 != 0);
    format!("\x1b[{bright};{terminal_color}m{}\x1b[m", char::from(ch))
}
