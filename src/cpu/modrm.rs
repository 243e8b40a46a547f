//! ModRM decoding and operand resolution.
//!
//! The ModRM byte follows many opcodes and splits into three fields:
//! - mod (bits 7-6): 0 = memory, 1 = memory + disp8, 2 = memory + disp32,
//!   3 = register direct
//! - reg (bits 5-3): register operand or group sub-opcode
//! - rm  (bits 2-0): register or base register operand
//!
//! SIB addressing (rm = 4 with a memory mod) is consumed but not supported.

use serde::{Serialize, Deserialize};
use crate::cpu::{Cpu, CpuError};

/// Displacement carried by a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Displacement {
    None,
    Byte(i8),
    Dword(u32),
}

/// A decoded ModRM byte plus its trailing SIB and displacement bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModRm {
    pub mode: u8,
    pub reg: u8,
    pub rm: u8,
    pub sib: Option<u8>,
    pub disp: Displacement,
}

impl ModRm {
    /// Split a ModRM byte into its fields. SIB and displacement are left empty.
    pub fn from_byte(code: u8) -> Self {
        Self {
            mode: (code & 0xC0) >> 6,
            reg: (code & 0x38) >> 3,
            rm: code & 0x07,
            sib: None,
            disp: Displacement::None,
        }
    }

    /// Operand lives in a register rather than memory.
    #[inline]
    pub fn is_register(&self) -> bool {
        self.mode == 3
    }

    /// A SIB byte follows the ModRM byte.
    #[inline]
    pub fn has_sib(&self) -> bool {
        self.mode != 3 && self.rm == 4
    }

    /// Width of the displacement that follows, in bytes.
    pub fn displacement_len(&self) -> u32 {
        match (self.mode, self.rm) {
            (0, 5) | (2, _) => 4,
            (1, _) => 1,
            _ => 0,
        }
    }

    /// Total bytes taken by ModRM, SIB and displacement.
    pub fn encoded_len(&self) -> u32 {
        1 + u32::from(self.has_sib()) + self.displacement_len()
    }
}

impl std::fmt::Display for ModRm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mod = {}, reg = {}, rm = {}", self.mode, self.reg, self.rm)
    }
}

impl Cpu {
    /// Consume the ModRM byte at EIP along with any SIB and displacement
    /// bytes, leaving EIP on the first byte after them.
    pub fn decode_modrm(&mut self) -> Result<ModRm, CpuError> {
        let mut modrm = ModRm::from_byte(self.read_code8(0)?);
        self.eip = self.eip.wrapping_add(1);

        if modrm.has_sib() {
            modrm.sib = Some(self.read_code8(0)?);
            self.eip = self.eip.wrapping_add(1);
        }

        match modrm.displacement_len() {
            4 => {
                modrm.disp = Displacement::Dword(self.read_code32(0)?);
                self.eip = self.eip.wrapping_add(4);
            }
            1 => {
                modrm.disp = Displacement::Byte(self.read_code_i8(0)?);
                self.eip = self.eip.wrapping_add(1);
            }
            _ => {}
        }

        Ok(modrm)
    }

    /// Compute the memory address a non-register operand refers to.
    ///
    /// mod 0 with rm 5 is the bare 32-bit displacement with no base register.
    pub fn effective_address(&self, modrm: &ModRm) -> Result<u32, CpuError> {
        if modrm.is_register() || modrm.rm == 4 {
            return Err(CpuError::UnimplementedAddressing {
                opcode: self.opcode,
                modrm: *modrm,
            });
        }

        let base = self.regs.get32(usize::from(modrm.rm));
        let addr = match (modrm.mode, modrm.disp) {
            (0, Displacement::Dword(disp)) => disp,
            (0, _) => base,
            (1, Displacement::Byte(disp)) => base.wrapping_add(disp as i32 as u32),
            (2, Displacement::Dword(disp)) => base.wrapping_add(disp),
            _ => {
                return Err(CpuError::UnimplementedAddressing {
                    opcode: self.opcode,
                    modrm: *modrm,
                })
            }
        };

        Ok(addr)
    }

    pub fn read_rm8(&self, modrm: &ModRm) -> Result<u8, CpuError> {
        if modrm.is_register() {
            Ok(self.regs.get8(modrm.rm))
        } else {
            let addr = self.effective_address(modrm)?;
            Ok(self.mem.read8(addr)?)
        }
    }

    pub fn write_rm8(&mut self, modrm: &ModRm, value: u8) -> Result<(), CpuError> {
        if modrm.is_register() {
            self.regs.set8(modrm.rm, value);
        } else {
            let addr = self.effective_address(modrm)?;
            self.mem.write8(addr, value)?;
        }
        Ok(())
    }

    pub fn read_rm32(&self, modrm: &ModRm) -> Result<u32, CpuError> {
        if modrm.is_register() {
            Ok(self.regs.get32(usize::from(modrm.rm)))
        } else {
            let addr = self.effective_address(modrm)?;
            Ok(self.mem.read32(addr)?)
        }
    }

    pub fn write_rm32(&mut self, modrm: &ModRm, value: u32) -> Result<(), CpuError> {
        if modrm.is_register() {
            self.regs.set32(usize::from(modrm.rm), value);
        } else {
            let addr = self.effective_address(modrm)?;
            self.mem.write32(addr, value)?;
        }
        Ok(())
    }

    #[inline]
    pub fn read_r8(&self, modrm: &ModRm) -> u8 {
        self.regs.get8(modrm.reg)
    }

    #[inline]
    pub fn write_r8(&mut self, modrm: &ModRm, value: u8) {
        self.regs.set8(modrm.reg, value);
    }

    #[inline]
    pub fn read_r32(&self, modrm: &ModRm) -> u32 {
        self.regs.get32(usize::from(modrm.reg))
    }

    #[inline]
    pub fn write_r32(&mut self, modrm: &ModRm, value: u32) {
        self.regs.set32(usize::from(modrm.reg), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::{EAX, EBP, EBX, ECX};

    fn cpu_with_code(code: &[u8]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.mem.load(0x100, code).unwrap();
        cpu.eip = 0x100;
        cpu
    }

    #[test]
    fn test_split_fields() {
        let modrm = ModRm::from_byte(0b11_011_000);
        assert_eq!(modrm.mode, 3);
        assert_eq!(modrm.reg, 3);
        assert_eq!(modrm.rm, 0);
        assert!(modrm.is_register());
    }

    #[test]
    fn test_decode_register_direct() {
        let mut cpu = cpu_with_code(&[0xD8]);
        let modrm = cpu.decode_modrm().unwrap();

        assert_eq!(modrm.disp, Displacement::None);
        assert_eq!(cpu.eip, 0x101);
    }

    #[test]
    fn test_decode_disp8() {
        // [ebp-4]
        let mut cpu = cpu_with_code(&[0x45, 0xFC]);
        cpu.regs.set32(EBP, 0x1000);
        let modrm = cpu.decode_modrm().unwrap();

        assert_eq!(modrm.disp, Displacement::Byte(-4));
        assert_eq!(cpu.eip, 0x102);
        assert_eq!(cpu.effective_address(&modrm).unwrap(), 0x0FFC);
    }

    #[test]
    fn test_decode_disp32() {
        // [ecx+0x00002000]
        let mut cpu = cpu_with_code(&[0x81, 0x00, 0x20, 0x00, 0x00]);
        cpu.regs.set32(ECX, 0x10);
        let modrm = cpu.decode_modrm().unwrap();

        assert_eq!(modrm.disp, Displacement::Dword(0x2000));
        assert_eq!(cpu.eip, 0x105);
        assert_eq!(cpu.effective_address(&modrm).unwrap(), 0x2010);
    }

    #[test]
    fn test_displacement_only_has_no_base() {
        let mut cpu = cpu_with_code(&[0x05, 0x00, 0x7C, 0x00, 0x00]);
        cpu.regs.set32(EBP, 0xFFFF);
        let modrm = cpu.decode_modrm().unwrap();

        assert_eq!(cpu.eip, 0x105);
        assert_eq!(cpu.effective_address(&modrm).unwrap(), 0x7C00);
    }

    #[test]
    fn test_register_indirect() {
        let mut cpu = cpu_with_code(&[0x03]);
        cpu.regs.set32(EBX, 0x4000);
        let modrm = cpu.decode_modrm().unwrap();

        assert_eq!(cpu.effective_address(&modrm).unwrap(), 0x4000);
    }

    #[test]
    fn test_sib_is_consumed_but_rejected() {
        let mut cpu = cpu_with_code(&[0x44, 0x24, 0x08]);
        let modrm = cpu.decode_modrm().unwrap();

        assert_eq!(modrm.sib, Some(0x24));
        assert_eq!(cpu.eip, 0x103);
        assert!(matches!(
            cpu.effective_address(&modrm),
            Err(CpuError::UnimplementedAddressing { .. })
        ));
    }

    #[test]
    fn test_register_direct_has_no_address() {
        let cpu = Cpu::new();
        let modrm = ModRm::from_byte(0xC0);
        assert!(cpu.effective_address(&modrm).is_err());
    }

    #[test]
    fn test_rm_operands() {
        let mut cpu = cpu_with_code(&[0x03]);
        cpu.regs.set32(EBX, 0x4000);
        let modrm = cpu.decode_modrm().unwrap();

        cpu.write_rm32(&modrm, 0xCAFE_F00D).unwrap();
        assert_eq!(cpu.mem.read32(0x4000).unwrap(), 0xCAFE_F00D);
        assert_eq!(cpu.read_rm8(&modrm).unwrap(), 0x0D);

        let direct = ModRm::from_byte(0xC0);
        cpu.write_rm8(&direct, 0x5A).unwrap();
        assert_eq!(cpu.regs.get32(EAX) & 0xFF, 0x5A);
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(ModRm::from_byte(0xC0).encoded_len(), 1);
        assert_eq!(ModRm::from_byte(0x45).encoded_len(), 2);
        assert_eq!(ModRm::from_byte(0x05).encoded_len(), 5);
        assert_eq!(ModRm::from_byte(0x84).encoded_len(), 6);
    }
}
