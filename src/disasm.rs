//! Disassembler for the supported instruction subset.
//!
//! Produces Intel-syntax text for trace output, the `disasm` command and the
//! debugger. Bytes that do not start a supported instruction come out as
//! `db 0xNN`.

use crate::cpu::flags::Condition;
use crate::cpu::registers::{BYTE_REGISTER_NAMES, REGISTER_NAMES};
use crate::cpu::{Memory, ModRm};

/// Longest encoding we decode: opcode + ModRM + SIB + disp32 + imm32.
const MAX_INSTRUCTION_LEN: usize = 11;

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub addr: u32,
    pub len: u32,
    pub text: String,
}

/// Disassemble the instruction at `addr` in memory.
pub fn disassemble_instruction(mem: &Memory, addr: u32) -> Line {
    decode_line(mem.slice(addr, MAX_INSTRUCTION_LEN), addr)
}

/// Disassemble `count` consecutive instructions starting at `addr`.
pub fn disassemble_range(mem: &Memory, addr: u32, count: usize) -> Vec<Line> {
    let mut lines = Vec::with_capacity(count);
    let mut addr = addr;
    for _ in 0..count {
        if addr as usize >= mem.len() {
            break;
        }
        let line = disassemble_instruction(mem, addr);
        addr = addr.wrapping_add(line.len);
        lines.push(line);
    }
    lines
}

/// Disassemble a whole image as if loaded at `origin`.
pub fn disassemble(image: &[u8], origin: u32) -> String {
    let mut output = String::new();
    output.push_str("; x86 disassembly\n");
    output.push_str("; ---------------\n\n");

    let mut offset = 0usize;
    while offset < image.len() {
        let addr = origin.wrapping_add(offset as u32);
        let line = decode_line(&image[offset..], addr);
        let end = (offset + line.len as usize).min(image.len());
        let hex: Vec<String> = image[offset..end].iter().map(|b| format!("{b:02x}")).collect();
        output.push_str(&format!("{:08x}: {:<24} {}\n", addr, hex.join(" "), line.text));
        offset = end;
    }

    output
}

/// Decode the instruction at the start of `code`.
pub fn decode_line(code: &[u8], addr: u32) -> Line {
    let mut cursor = Cursor { code, pos: 0 };
    match decode(&mut cursor, addr) {
        Some(text) => Line { addr, len: cursor.pos as u32, text },
        None => Line {
            addr,
            len: 1,
            text: code.first().map_or_else(|| "??".to_string(), |b| format!("db {b:#04x}")),
        },
    }
}

struct Cursor<'a> {
    code: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> Option<u8> {
        let byte = *self.code.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn i8(&mut self) -> Option<i8> {
        self.u8().map(|b| b as i8)
    }

    fn u32(&mut self) -> Option<u32> {
        let bytes = self.code.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// ModRM operand: (decoded byte, r/m text for the given register width).
    fn modrm(&mut self, byte_regs: bool) -> Option<(ModRm, String)> {
        let modrm = ModRm::from_byte(self.u8()?);
        if modrm.has_sib() {
            self.u8()?;
        }

        let names = if byte_regs { &BYTE_REGISTER_NAMES } else { &REGISTER_NAMES };
        let base = REGISTER_NAMES[usize::from(modrm.rm)].to_lowercase();
        let operand = match (modrm.mode, modrm.rm) {
            (3, rm) => names[usize::from(rm)].to_lowercase(),
            (0, 4) | (1, 4) | (2, 4) => {
                if modrm.displacement_len() == 4 {
                    self.u32()?;
                } else if modrm.displacement_len() == 1 {
                    self.i8()?;
                }
                "[sib]".to_string()
            }
            (0, 5) => format!("[{:#x}]", self.u32()?),
            (0, _) => format!("[{base}]"),
            (1, _) => format!("[{base}{}]", signed_offset(i32::from(self.i8()?))),
            (_, _) => format!("[{base}+{:#x}]", self.u32()?),
        };
        Some((modrm, operand))
    }
}

fn reg32(index: u8) -> String {
    REGISTER_NAMES[usize::from(index & 7)].to_lowercase()
}

fn reg8(index: u8) -> String {
    BYTE_REGISTER_NAMES[usize::from(index & 7)].to_lowercase()
}

fn signed_offset(value: i32) -> String {
    if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("+{value:#x}")
    }
}

fn signed_imm(value: i32) -> String {
    if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("{value:#x}")
    }
}

fn sized(modrm: &ModRm, size: &str, operand: String) -> String {
    if modrm.is_register() {
        operand
    } else {
        format!("{size} {operand}")
    }
}

fn decode(c: &mut Cursor<'_>, addr: u32) -> Option<String> {
    let opcode = c.u8()?;

    let text = match opcode {
        0x01 => {
            let (modrm, rm) = c.modrm(false)?;
            format!("add {rm}, {}", reg32(modrm.reg))
        }
        0x3B => {
            let (modrm, rm) = c.modrm(false)?;
            format!("cmp {}, {rm}", reg32(modrm.reg))
        }
        0x3C => format!("cmp al, {:#x}", c.u8()?),
        0x3D => format!("cmp eax, {:#x}", c.u32()?),
        0x40..=0x47 => format!("inc {}", reg32(opcode)),
        0x50..=0x57 => format!("push {}", reg32(opcode)),
        0x58..=0x5F => format!("pop {}", reg32(opcode)),
        0x68 => format!("push {:#x}", c.u32()?),
        0x6A => format!("push {:#x}", c.u8()?),
        0x70..=0x7F => {
            let cond = Condition::from_opcode(opcode)?;
            let disp = i32::from(c.i8()?);
            let target = addr.wrapping_add(2).wrapping_add(disp as u32);
            format!("{} {target:#x}", cond.mnemonic())
        }
        0x83 => {
            let (modrm, rm) = c.modrm(false)?;
            let mnemonic = match modrm.reg {
                0 => "add",
                5 => "sub",
                7 => "cmp",
                _ => return None,
            };
            let imm = signed_imm(i32::from(c.i8()?));
            format!("{mnemonic} {}, {imm}", sized(&modrm, "dword", rm))
        }
        0x88 => {
            let (modrm, rm) = c.modrm(true)?;
            format!("mov {rm}, {}", reg8(modrm.reg))
        }
        0x89 => {
            let (modrm, rm) = c.modrm(false)?;
            format!("mov {rm}, {}", reg32(modrm.reg))
        }
        0x8A => {
            let (modrm, rm) = c.modrm(true)?;
            format!("mov {}, {rm}", reg8(modrm.reg))
        }
        0x8B => {
            let (modrm, rm) = c.modrm(false)?;
            format!("mov {}, {rm}", reg32(modrm.reg))
        }
        0xB0..=0xB7 => format!("mov {}, {:#x}", reg8(opcode), c.u8()?),
        0xB8..=0xBF => format!("mov {}, {:#x}", reg32(opcode), c.u32()?),
        0xC3 => "ret".to_string(),
        0xC7 => {
            let (modrm, rm) = c.modrm(false)?;
            format!("mov {}, {:#x}", sized(&modrm, "dword", rm), c.u32()?)
        }
        0xC9 => "leave".to_string(),
        0xCD => format!("int {:#x}", c.u8()?),
        0xE8 | 0xE9 => {
            let disp = c.u32()?;
            let target = addr.wrapping_add(5).wrapping_add(disp);
            let mnemonic = if opcode == 0xE8 { "call" } else { "jmp" };
            format!("{mnemonic} {target:#x}")
        }
        0xEB => {
            let disp = i32::from(c.i8()?);
            format!("jmp {:#x}", addr.wrapping_add(2).wrapping_add(disp as u32))
        }
        0xEC => "in al, dx".to_string(),
        0xEE => "out dx, al".to_string(),
        0xFF => {
            let (modrm, rm) = c.modrm(false)?;
            if modrm.reg != 0 {
                return None;
            }
            format!("inc {}", sized(&modrm, "dword", rm))
        }
        _ => return None,
    };

    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(code: &[u8]) -> String {
        decode_line(code, 0x7C00).text
    }

    #[test]
    fn test_register_forms() {
        assert_eq!(text(&[0xB8, 0x05, 0x00, 0x00, 0x00]), "mov eax, 0x5");
        assert_eq!(text(&[0xB4, 0x0E]), "mov ah, 0xe");
        assert_eq!(text(&[0x01, 0xD8]), "add eax, ebx");
        assert_eq!(text(&[0x55]), "push ebp");
        assert_eq!(text(&[0xEC]), "in al, dx");
        assert_eq!(text(&[0x6A, 0x80]), "push 0x80");
    }

    #[test]
    fn test_memory_operands() {
        assert_eq!(text(&[0x89, 0x45, 0xF8]), "mov [ebp-0x8], eax");
        assert_eq!(text(&[0x8B, 0x05, 0x00, 0x80, 0x00, 0x00]), "mov eax, [0x8000]");
        assert_eq!(text(&[0x83, 0x6D, 0x04, 0x01]), "sub dword [ebp+0x4], 0x1");
        assert_eq!(text(&[0x83, 0xF8, 0xFE]), "cmp eax, -0x2");
        assert_eq!(text(&[0x8A, 0x06]), "mov al, [esi]");
    }

    #[test]
    fn test_branch_targets() {
        assert_eq!(text(&[0xEB, 0xFE]), "jmp 0x7c00");
        assert_eq!(text(&[0x74, 0x10]), "jz 0x7c12");
        assert_eq!(text(&[0xE8, 0x00, 0x01, 0x00, 0x00]), "call 0x7d05");
        assert_eq!(text(&[0xE9, 0xFB, 0x83, 0xFF, 0xFF]), "jmp 0x0");
    }

    #[test]
    fn test_lengths() {
        assert_eq!(decode_line(&[0xC7, 0x45, 0x08, 1, 0, 0, 0], 0).len, 7);
        assert_eq!(decode_line(&[0x8B, 0x04, 0x24], 0).len, 3);
        assert_eq!(decode_line(&[0xCD, 0x10], 0).len, 2);
    }

    #[test]
    fn test_unknown_and_truncated() {
        assert_eq!(text(&[0x0F, 0x0B]), "db 0x0f");
        assert_eq!(decode_line(&[0xB8, 0x01], 0).len, 1);
        assert_eq!(text(&[0x83, 0xC8, 0x01]), "db 0x83");
        assert_eq!(text(&[]), "??");
    }

    #[test]
    fn test_listing() {
        let listing = disassemble(&[0xB8, 0x01, 0x00, 0x00, 0x00, 0xC3], 0x7C00);
        assert!(listing.contains("00007c00: b8 01 00 00 00"));
        assert!(listing.contains("mov eax, 0x1"));
        assert!(listing.contains("00007c05: c3"));
        assert!(listing.contains("ret"));
    }

    #[test]
    fn test_range_from_memory() {
        let mut mem = Memory::with_size(0x100);
        mem.load(0x10, &[0x40, 0x41, 0xC3]).unwrap();

        let lines = disassemble_range(&mem, 0x10, 3);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["inc eax", "inc ecx", "ret"]);
        assert_eq!(lines[2].addr, 0x12);
    }
}
