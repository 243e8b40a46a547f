//! Port I/O devices reachable through `in` and `out`.
//!
//! Only the first serial port (COM1, 0x3F8) does anything: reads pull one
//! byte from the input stream, writes push one byte to the output stream.
//! Every other port reads as zero and ignores writes.

use std::collections::VecDeque;
use std::io::{Read, Write};

/// I/O port of the console serial line.
pub const COM1: u16 = 0x03F8;

/// Byte-wide port access used by the CPU.
pub trait PortIo {
    fn read_byte(&mut self, port: u16) -> u8;
    fn write_byte(&mut self, port: u16, value: u8);
}

/// Console bound to a byte reader and writer (stdin/stdout in the CLI).
pub struct ConsolePorts<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> ConsolePorts<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the underlying streams.
    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl ConsolePorts<std::io::Stdin, std::io::Stdout> {
    /// Console wired to the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin(), std::io::stdout())
    }
}

impl<R: Read, W: Write> PortIo for ConsolePorts<R, W> {
    fn read_byte(&mut self, port: u16) -> u8 {
        if port != COM1 {
            return 0;
        }

        let mut buf = [0u8; 1];
        match self.input.read(&mut buf) {
            Ok(1) => buf[0],
            Ok(_) => 0,
            Err(e) => {
                tracing::warn!(port, "console read failed: {e}");
                0
            }
        }
    }

    fn write_byte(&mut self, port: u16, value: u8) {
        if port != COM1 {
            return;
        }

        let result = self.output.write_all(&[value]).and_then(|()| self.output.flush());
        if let Err(e) = result {
            tracing::warn!(port, "console write failed: {e}");
        }
    }
}

/// In-memory console: input is a queue, output accumulates in a buffer.
///
/// Used by the debugger, the wasm bindings and tests.
#[derive(Debug, Clone, Default)]
pub struct BufferedPorts {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferedPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be read from COM1.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Everything written to COM1 so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Take the output buffer, leaving it empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
    }
}

impl PortIo for BufferedPorts {
    fn read_byte(&mut self, port: u16) -> u8 {
        if port == COM1 {
            self.input.pop_front().unwrap_or(0)
        } else {
            0
        }
    }

    fn write_byte(&mut self, port: u16, value: u8) {
        if port == COM1 {
            self.output.push(value);
        }
    }
}

/// Ports with nothing attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPorts;

impl PortIo for NullPorts {
    fn read_byte(&mut self, _port: u16) -> u8 {
        0
    }

    fn write_byte(&mut self, _port: u16, _value: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_ports_use_com1_only() {
        let mut ports = ConsolePorts::new(&b"hi"[..], Vec::new());

        assert_eq!(ports.read_byte(0x60), 0);
        assert_eq!(ports.read_byte(COM1), b'h');
        assert_eq!(ports.read_byte(COM1), b'i');
        assert_eq!(ports.read_byte(COM1), 0);

        ports.write_byte(COM1, b'A');
        ports.write_byte(0x80, b'B');

        let (_, output) = ports.into_inner();
        assert_eq!(output, b"A");
    }

    #[test]
    fn test_buffered_ports() {
        let mut ports = BufferedPorts::new();
        ports.push_input(b"x");

        assert_eq!(ports.read_byte(COM1), b'x');
        assert_eq!(ports.read_byte(COM1), 0);

        ports.write_byte(COM1, b'o');
        ports.write_byte(COM1, b'k');
        ports.write_byte(0x3F9, b'!');
        assert_eq!(ports.output(), b"ok");
        assert_eq!(ports.take_output(), b"ok".to_vec());
        assert!(ports.output().is_empty());
    }
}
