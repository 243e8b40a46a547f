//! CPU emulation for a flat 32-bit x86 subset.
//!
//! This module implements:
//! - 1 MiB of flat, unsegmented memory
//! - 8 general-purpose registers with AL/AH style byte views
//! - carry, zero, sign and overflow flags
//! - ModRM operand decoding (no SIB)
//! - a 256-entry opcode dispatch table driving the fetch-decode-execute loop

pub mod memory;
pub mod registers;
pub mod flags;
pub mod modrm;
pub mod dispatch;
pub mod instructions;
pub mod execute;

pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use registers::Registers;
pub use flags::{Condition, Eflags};
pub use modrm::{Displacement, ModRm};
pub use dispatch::{DispatchTable, Handler};
pub use execute::{Cpu, CpuError, CpuState};
