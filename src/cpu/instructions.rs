//! Instruction semantics.
//!
//! Every handler is entered with EIP on its opcode byte and leaves EIP on
//! the next instruction, or on the branch target for control transfers.
//! Only subtraction and compare touch the flags.

use crate::bios;
use crate::cpu::dispatch::DispatchTable;
use crate::cpu::flags::Condition;
use crate::cpu::modrm::ModRm;
use crate::cpu::registers::{AL, EAX, EBP, EDX, ESP};
use crate::cpu::{Cpu, CpuError};
use crate::io::PortIo;

/// Build the table of every supported opcode.
pub(crate) fn build_table() -> DispatchTable {
    let mut table = DispatchTable::empty();

    table.register(0x01, add_rm32_r32);
    table.register(0x3B, cmp_r32_rm32);
    table.register(0x3C, cmp_al_imm8);
    table.register(0x3D, cmp_eax_imm32);
    table.register_per_register(0x40, inc_r32);
    table.register_per_register(0x50, push_r32);
    table.register_per_register(0x58, pop_r32);
    table.register(0x68, push_imm32);
    table.register(0x6A, push_imm8);
    for opcode in 0x70..=0x7F {
        if Condition::from_opcode(opcode).is_some() {
            table.register(opcode, jcc_rel8);
        }
    }
    table.register(0x83, code_83);
    table.register(0x88, mov_rm8_r8);
    table.register(0x89, mov_rm32_r32);
    table.register(0x8A, mov_r8_rm8);
    table.register(0x8B, mov_r32_rm32);
    table.register_per_register(0xB0, mov_r8_imm8);
    table.register_per_register(0xB8, mov_r32_imm32);
    table.register(0xC3, ret);
    table.register(0xC7, mov_rm32_imm32);
    table.register(0xC9, leave);
    table.register(0xCD, int_imm8);
    table.register(0xE8, call_rel32);
    table.register(0xE9, jmp_rel32);
    table.register(0xEB, jmp_rel8);
    table.register(0xEC, in_al_dx);
    table.register(0xEE, out_dx_al);
    table.register(0xFF, code_ff);

    table
}

#[inline]
fn advance(cpu: &mut Cpu, len: u32) {
    cpu.eip = cpu.eip.wrapping_add(len);
}

/// Skip the opcode byte and decode the ModRM operand that follows it.
fn fetch_modrm(cpu: &mut Cpu) -> Result<ModRm, CpuError> {
    advance(cpu, 1);
    cpu.decode_modrm()
}

/// Set EIP to `origin + len + disp`, where `len` is the branch's own length.
#[inline]
fn branch(cpu: &mut Cpu, len: u32, disp: i32) {
    cpu.eip = cpu.eip.wrapping_add(len).wrapping_add(disp as u32);
}

/// Register index encoded in the low three bits of a one-byte opcode.
fn opcode_register(cpu: &Cpu) -> Result<usize, CpuError> {
    Ok(usize::from(cpu.read_code8(0)? & 0x07))
}

// ==================== Data movement ====================

fn mov_r8_imm8(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let reg = cpu.read_code8(0)? & 0x07;
    let value = cpu.read_code8(1)?;
    cpu.regs.set8(reg, value);
    advance(cpu, 2);
    Ok(())
}

fn mov_r32_imm32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let reg = opcode_register(cpu)?;
    let value = cpu.read_code32(1)?;
    cpu.regs.set32(reg, value);
    advance(cpu, 5);
    Ok(())
}

fn mov_rm32_imm32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;
    let value = cpu.read_code32(0)?;
    advance(cpu, 4);
    cpu.write_rm32(&modrm, value)
}

fn mov_rm8_r8(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;
    let value = cpu.read_r8(&modrm);
    cpu.write_rm8(&modrm, value)
}

fn mov_rm32_r32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;
    let value = cpu.read_r32(&modrm);
    cpu.write_rm32(&modrm, value)
}

fn mov_r8_rm8(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;
    let value = cpu.read_rm8(&modrm)?;
    cpu.write_r8(&modrm, value);
    Ok(())
}

fn mov_r32_rm32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;
    let value = cpu.read_rm32(&modrm)?;
    cpu.write_r32(&modrm, value);
    Ok(())
}

// ==================== Arithmetic and compare ====================

fn add_rm32_r32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;
    let r32 = cpu.read_r32(&modrm);
    let rm32 = cpu.read_rm32(&modrm)?;
    cpu.write_rm32(&modrm, rm32.wrapping_add(r32))
}

fn cmp_r32_rm32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;
    let r32 = cpu.read_r32(&modrm);
    let rm32 = cpu.read_rm32(&modrm)?;
    cpu.eflags.sub(r32, rm32);
    Ok(())
}

fn cmp_al_imm8(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let value = u32::from(cpu.read_code8(1)?);
    let al = u32::from(cpu.regs.get8(AL));
    cpu.eflags.sub(al, value);
    advance(cpu, 2);
    Ok(())
}

fn cmp_eax_imm32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let value = cpu.read_code32(1)?;
    let eax = cpu.regs.get32(EAX);
    cpu.eflags.sub(eax, value);
    advance(cpu, 5);
    Ok(())
}

fn inc_r32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let reg = opcode_register(cpu)?;
    let value = cpu.regs.get32(reg);
    cpu.regs.set32(reg, value.wrapping_add(1));
    advance(cpu, 1);
    Ok(())
}

/// Sign-extended 8-bit immediate at EIP; EIP moves past it.
fn fetch_simm8(cpu: &mut Cpu) -> Result<u32, CpuError> {
    let imm = cpu.read_code_i8(0)? as i32 as u32;
    advance(cpu, 1);
    Ok(imm)
}

fn add_rm32_imm8(cpu: &mut Cpu, modrm: &ModRm) -> Result<(), CpuError> {
    let rm32 = cpu.read_rm32(modrm)?;
    let imm = fetch_simm8(cpu)?;
    cpu.write_rm32(modrm, rm32.wrapping_add(imm))
}

fn sub_rm32_imm8(cpu: &mut Cpu, modrm: &ModRm) -> Result<(), CpuError> {
    let rm32 = cpu.read_rm32(modrm)?;
    let imm = fetch_simm8(cpu)?;
    let result = rm32.wrapping_sub(imm);
    cpu.write_rm32(modrm, result)?;
    cpu.eflags.sub(rm32, imm);
    Ok(())
}

fn cmp_rm32_imm8(cpu: &mut Cpu, modrm: &ModRm) -> Result<(), CpuError> {
    let rm32 = cpu.read_rm32(modrm)?;
    let imm = fetch_simm8(cpu)?;
    cpu.eflags.sub(rm32, imm);
    Ok(())
}

fn inc_rm32(cpu: &mut Cpu, modrm: &ModRm) -> Result<(), CpuError> {
    let value = cpu.read_rm32(modrm)?;
    cpu.write_rm32(modrm, value.wrapping_add(1))
}

/// Group 1: add/sub/cmp r/m32, imm8.
fn code_83(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;

    match modrm.reg {
        0 => add_rm32_imm8(cpu, &modrm),
        5 => sub_rm32_imm8(cpu, &modrm),
        7 => cmp_rm32_imm8(cpu, &modrm),
        reg => Err(CpuError::UnimplementedGroup { opcode: 0x83, reg }),
    }
}

/// Group 5: inc r/m32.
fn code_ff(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let modrm = fetch_modrm(cpu)?;

    match modrm.reg {
        0 => inc_rm32(cpu, &modrm),
        reg => Err(CpuError::UnimplementedGroup { opcode: 0xFF, reg }),
    }
}

// ==================== Stack ====================

fn push_r32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let reg = opcode_register(cpu)?;
    cpu.push32(cpu.regs.get32(reg))?;
    advance(cpu, 1);
    Ok(())
}

fn pop_r32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let reg = opcode_register(cpu)?;
    let value = cpu.pop32()?;
    cpu.regs.set32(reg, value);
    advance(cpu, 1);
    Ok(())
}

fn push_imm32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let value = cpu.read_code32(1)?;
    cpu.push32(value)?;
    advance(cpu, 5);
    Ok(())
}

fn push_imm8(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let value = u32::from(cpu.read_code8(1)?);
    cpu.push32(value)?;
    advance(cpu, 2);
    Ok(())
}

// ==================== Control transfer ====================

fn jmp_rel8(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let disp = cpu.read_code_i8(1)?;
    branch(cpu, 2, i32::from(disp));
    Ok(())
}

fn jmp_rel32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let disp = cpu.read_code_i32(1)?;
    branch(cpu, 5, disp);
    Ok(())
}

fn jcc_rel8(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let opcode = cpu.read_code8(0)?;
    let cond = Condition::from_opcode(opcode).ok_or(CpuError::UnimplementedOpcode {
        opcode,
        eip: cpu.eip,
    })?;

    let disp = if cond.holds(cpu.eflags) {
        i32::from(cpu.read_code_i8(1)?)
    } else {
        0
    };
    branch(cpu, 2, disp);
    Ok(())
}

fn call_rel32(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let disp = cpu.read_code_i32(1)?;
    cpu.push32(cpu.eip.wrapping_add(5))?;
    branch(cpu, 5, disp);
    Ok(())
}

fn ret(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    cpu.eip = cpu.pop32()?;
    Ok(())
}

fn leave(cpu: &mut Cpu, _io: &mut dyn PortIo) -> Result<(), CpuError> {
    let ebp = cpu.regs.get32(EBP);
    cpu.regs.set32(ESP, ebp);
    let saved = cpu.pop32()?;
    cpu.regs.set32(EBP, saved);
    advance(cpu, 1);
    Ok(())
}

// ==================== I/O and interrupts ====================

fn in_al_dx(cpu: &mut Cpu, io: &mut dyn PortIo) -> Result<(), CpuError> {
    let port = cpu.regs.get32(EDX) as u16;
    let value = io.read_byte(port);
    cpu.regs.set8(AL, value);
    advance(cpu, 1);
    Ok(())
}

fn out_dx_al(cpu: &mut Cpu, io: &mut dyn PortIo) -> Result<(), CpuError> {
    let port = cpu.regs.get32(EDX) as u16;
    let value = cpu.regs.get8(AL);
    io.write_byte(port, value);
    advance(cpu, 1);
    Ok(())
}

fn int_imm8(cpu: &mut Cpu, io: &mut dyn PortIo) -> Result<(), CpuError> {
    let vector = cpu.read_code8(1)?;
    advance(cpu, 2);

    match vector {
        bios::VIDEO_INTERRUPT => bios::video(cpu, io),
        _ => tracing::warn!(eip = cpu.eip, "unknown interrupt: {vector:#04x}"),
    }
    Ok(())
}
