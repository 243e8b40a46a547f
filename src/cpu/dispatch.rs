//! Opcode dispatch table.
//!
//! One slot per first opcode byte. The table is filled once, on first use,
//! and never changes afterwards.

use std::sync::OnceLock;
use crate::cpu::{instructions, Cpu, CpuError};
use crate::io::PortIo;

/// An instruction handler. It starts with EIP on the opcode byte.
pub type Handler = fn(&mut Cpu, &mut dyn PortIo) -> Result<(), CpuError>;

/// Mapping from opcode byte to handler.
pub struct DispatchTable {
    handlers: [Option<Handler>; 256],
}

impl DispatchTable {
    /// A table with no handlers registered.
    pub fn empty() -> Self {
        Self { handlers: [None; 256] }
    }

    /// The process-wide table with every supported instruction.
    pub fn global() -> &'static DispatchTable {
        static TABLE: OnceLock<DispatchTable> = OnceLock::new();
        TABLE.get_or_init(instructions::build_table)
    }

    pub fn register(&mut self, opcode: u8, handler: Handler) {
        self.handlers[usize::from(opcode)] = Some(handler);
    }

    /// Register `handler` for the eight opcodes `base..base + 8` that encode
    /// a register in their low three bits.
    pub fn register_per_register(&mut self, base: u8, handler: Handler) {
        for reg in 0..8 {
            self.register(base + reg, handler);
        }
    }

    #[inline]
    pub fn get(&self, opcode: u8) -> Option<Handler> {
        self.handlers[usize::from(opcode)]
    }

    /// Opcodes with a registered handler, ascending.
    pub fn opcodes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|op| self.get(*op).is_some())
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("registered", &self.opcodes().count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table() {
        let table = DispatchTable::empty();
        assert!(table.get(0x90).is_none());
        assert_eq!(table.opcodes().count(), 0);
    }

    #[test]
    fn test_global_table_contents() {
        let table = DispatchTable::global();

        for op in 0xB8..=0xBF {
            assert!(table.get(op).is_some(), "mov r32, imm32 {op:#04x}");
        }
        for op in [0x01, 0x3B, 0x83, 0x89, 0x8B, 0xC3, 0xC9, 0xCD, 0xE8, 0xFF] {
            assert!(table.get(op).is_some(), "opcode {op:#04x}");
        }
        for op in [0x00, 0x0F, 0x90, 0xF4, 0x7A, 0x7D] {
            assert!(table.get(op).is_none(), "opcode {op:#04x}");
        }
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(DispatchTable::global(), DispatchTable::global()));
    }
}
