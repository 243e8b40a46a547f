//! The EFLAGS subset modelled by the emulator.
//!
//! Only carry, zero, sign and overflow exist. They sit at their
//! architectural bit positions so the raw word matches real EFLAGS.

use bitflags::bitflags;
use serde::{Serialize, Deserialize};

bitflags! {
    /// Status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Eflags: u32 {
        const CARRY = 1;
        const ZERO = 1 << 6;
        const SIGN = 1 << 7;
        const OVERFLOW = 1 << 11;
    }
}

impl Eflags {
    #[inline]
    pub fn carry(self) -> bool {
        self.contains(Self::CARRY)
    }

    #[inline]
    pub fn zero(self) -> bool {
        self.contains(Self::ZERO)
    }

    #[inline]
    pub fn sign(self) -> bool {
        self.contains(Self::SIGN)
    }

    #[inline]
    pub fn overflow(self) -> bool {
        self.contains(Self::OVERFLOW)
    }

    /// Update every flag from the subtraction `lhs - rhs`.
    ///
    /// `wide` is the subtraction carried out in 64 bits on the zero-extended
    /// operands, so a borrow out of bit 31 shows up in bit 32.
    pub fn update_sub(&mut self, lhs: u32, rhs: u32, wide: u64) {
        let result = wide as u32;
        let sign_lhs = lhs >> 31;
        let sign_rhs = rhs >> 31;
        let sign_res = result >> 31;

        self.set(Self::CARRY, (wide >> 32) & 1 == 1);
        self.set(Self::ZERO, result == 0);
        self.set(Self::SIGN, sign_res == 1);
        self.set(Self::OVERFLOW, sign_lhs != sign_rhs && sign_lhs != sign_res);
    }

    /// Compute the flags for `lhs - rhs` and return the truncated result.
    pub fn sub(&mut self, lhs: u32, rhs: u32) -> u32 {
        let wide = u64::from(lhs).wrapping_sub(u64::from(rhs));
        self.update_sub(lhs, rhs, wide);
        wide as u32
    }
}

/// Branch conditions of the short conditional jumps (0x70-0x7F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Overflow,
    NoOverflow,
    Carry,
    NoCarry,
    Zero,
    NotZero,
    Sign,
    NoSign,
    Less,
    LessOrEqual,
}

impl Condition {
    /// Condition encoded by a `jcc rel8` opcode, if it is one we model.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        let cond = match opcode {
            0x70 => Condition::Overflow,
            0x71 => Condition::NoOverflow,
            0x72 => Condition::Carry,
            0x73 => Condition::NoCarry,
            0x74 => Condition::Zero,
            0x75 => Condition::NotZero,
            0x78 => Condition::Sign,
            0x79 => Condition::NoSign,
            0x7C => Condition::Less,
            0x7E => Condition::LessOrEqual,
            _ => return None,
        };
        Some(cond)
    }

    /// Evaluate against the current flags.
    pub fn holds(self, flags: Eflags) -> bool {
        match self {
            Condition::Overflow => flags.overflow(),
            Condition::NoOverflow => !flags.overflow(),
            Condition::Carry => flags.carry(),
            Condition::NoCarry => !flags.carry(),
            Condition::Zero => flags.zero(),
            Condition::NotZero => !flags.zero(),
            Condition::Sign => flags.sign(),
            Condition::NoSign => !flags.sign(),
            Condition::Less => flags.sign() != flags.overflow(),
            Condition::LessOrEqual => flags.zero() || flags.sign() != flags.overflow(),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Condition::Overflow => "jo",
            Condition::NoOverflow => "jno",
            Condition::Carry => "jc",
            Condition::NoCarry => "jnc",
            Condition::Zero => "jz",
            Condition::NotZero => "jnz",
            Condition::Sign => "js",
            Condition::NoSign => "jns",
            Condition::Less => "jl",
            Condition::LessOrEqual => "jle",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_condition_opcodes() {
        assert_eq!(Condition::from_opcode(0x74), Some(Condition::Zero));
        assert_eq!(Condition::from_opcode(0x7E), Some(Condition::LessOrEqual));
        assert_eq!(Condition::from_opcode(0x7A), None);
        assert_eq!(Condition::from_opcode(0xEB), None);
    }

    #[test]
    fn test_signed_conditions() {
        let mut flags = Eflags::empty();

        flags.sub(-3i32 as u32, 2);
        assert!(Condition::Less.holds(flags));
        assert!(Condition::LessOrEqual.holds(flags));

        flags.sub(2, 2);
        assert!(!Condition::Less.holds(flags));
        assert!(Condition::LessOrEqual.holds(flags));

        // overflowing compare: i32::MIN < 1 even though the result is positive
        flags.sub(0x8000_0000, 1);
        assert!(flags.overflow());
        assert!(Condition::Less.holds(flags));

        flags.sub(7, -1i32 as u32);
        assert!(!Condition::LessOrEqual.holds(flags));
    }

    #[test]
    fn test_borrow_sets_carry() {
        let mut flags = Eflags::empty();
        let result = flags.sub(0, 1);
        assert_eq!(result, 0xFFFF_FFFF);
        assert!(flags.carry());
        assert!(flags.sign());
        assert!(!flags.zero());
        assert!(!flags.overflow());
    }

    #[test]
    fn test_signed_overflow() {
        let mut flags = Eflags::empty();
        flags.sub(0x7FFF_FFFF, 0xFFFF_FFFF);
        assert!(flags.overflow());
        assert!(flags.carry());
        assert!(flags.sign());
    }

    #[test]
    fn test_equal_operands() {
        let mut flags = Eflags::CARRY | Eflags::OVERFLOW | Eflags::SIGN;
        flags.sub(5, 5);
        assert!(flags.zero());
        assert!(!flags.carry());
        assert!(!flags.overflow());
        assert!(!flags.sign());
    }

    #[test]
    fn test_bit_positions() {
        assert_eq!(Eflags::CARRY.bits(), 0x001);
        assert_eq!(Eflags::ZERO.bits(), 0x040);
        assert_eq!(Eflags::SIGN.bits(), 0x080);
        assert_eq!(Eflags::OVERFLOW.bits(), 0x800);
    }

    proptest! {
        #[test]
        fn prop_sub_flags(a: u32, b: u32) {
            let mut flags = Eflags::empty();
            let result = flags.sub(a, b);
            prop_assert_eq!(result, a.wrapping_sub(b));
            prop_assert_eq!(flags.zero(), a == b);
            prop_assert_eq!(flags.carry(), a < b);
            prop_assert_eq!(flags.sign(), result >> 31 == 1);
            prop_assert_eq!(flags.overflow(), (a as i32).checked_sub(b as i32).is_none());
        }
    }
}
