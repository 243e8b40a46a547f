//! General-purpose register file.
//!
//! Eight 32-bit registers in encoding order:
//! - 0-3: EAX, ECX, EDX, EBX (each with AL/AH style byte views)
//! - 4-7: ESP, EBP, ESI, EDI
//!
//! The 8-bit registers are not separate storage. Byte index 0-3 selects the
//! low byte of registers 0-3 and byte index 4-7 selects bits 8-15 of the
//! same four registers.

use serde::{Serialize, Deserialize};

pub const EAX: usize = 0;
pub const ECX: usize = 1;
pub const EDX: usize = 2;
pub const EBX: usize = 3;
pub const ESP: usize = 4;
pub const EBP: usize = 5;
pub const ESI: usize = 6;
pub const EDI: usize = 7;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 8;

pub const AL: u8 = 0;
pub const CL: u8 = 1;
pub const DL: u8 = 2;
pub const BL: u8 = 3;
pub const AH: u8 = 4;
pub const CH: u8 = 5;
pub const DH: u8 = 6;
pub const BH: u8 = 7;

/// Names of the 32-bit registers, in encoding order.
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] =
    ["EAX", "ECX", "EDX", "EBX", "ESP", "EBP", "ESI", "EDI"];

/// Names of the 8-bit registers, in encoding order.
pub const BYTE_REGISTER_NAMES: [&str; REGISTER_COUNT] =
    ["AL", "CL", "DL", "BL", "AH", "CH", "DH", "BH"];

/// The x86 register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    slots: [u32; REGISTER_COUNT],
}

impl Registers {
    /// Create a register file with every register zeroed.
    pub fn new() -> Self {
        Self { slots: [0; REGISTER_COUNT] }
    }

    /// Zero every register.
    pub fn reset(&mut self) {
        self.slots = [0; REGISTER_COUNT];
    }

    #[inline]
    pub fn get32(&self, index: usize) -> u32 {
        self.slots[index]
    }

    #[inline]
    pub fn set32(&mut self, index: usize, value: u32) {
        self.slots[index] = value;
    }

    /// Read an 8-bit register (AL..BH encoding).
    #[inline]
    pub fn get8(&self, index: u8) -> u8 {
        let (slot, shift) = byte_slot(index);
        (self.slots[slot] >> shift) as u8
    }

    /// Write an 8-bit register, leaving the other three bytes of the
    /// backing register untouched.
    #[inline]
    pub fn set8(&mut self, index: u8, value: u8) {
        let (slot, shift) = byte_slot(index);
        let mask = !(0xFF_u32 << shift);
        self.slots[slot] = (self.slots[slot] & mask) | (u32::from(value) << shift);
    }

    /// All eight registers in encoding order.
    pub fn as_array(&self) -> [u32; REGISTER_COUNT] {
        self.slots
    }
}

/// Resolve a byte register index to (backing register, bit shift).
#[inline]
fn byte_slot(index: u8) -> (usize, u32) {
    let index = usize::from(index & 7);
    if index < 4 {
        (index, 0)
    } else {
        (index - 4, 8)
    }
}
