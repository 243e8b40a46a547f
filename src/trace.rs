//! Execution tracing and register dumps.

use std::fmt::Write as _;
use std::io::Write;
use serde::{Serialize, Deserialize};
use crate::cpu::registers::{REGISTER_COUNT, REGISTER_NAMES};
use crate::cpu::{Cpu, CpuState};

/// Receives each instruction before it executes.
pub trait TraceSink {
    fn before_step(&mut self, eip: u32, opcode: u8);
}

/// Discards trace events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl TraceSink for NoTrace {
    fn before_step(&mut self, _eip: u32, _opcode: u8) {}
}

/// Writes `EIP = 7c00, Code = b8` lines.
pub struct WriterTrace<W> {
    out: W,
}

impl<W: Write> WriterTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceSink for WriterTrace<W> {
    fn before_step(&mut self, eip: u32, opcode: u8) {
        if let Err(e) = writeln!(self.out, "{}", trace_line(eip, opcode)) {
            tracing::warn!("trace write failed: {e}");
        }
    }
}

/// Format one trace line.
pub fn trace_line(eip: u32, opcode: u8) -> String {
    format!("EIP = {eip:x}, Code = {opcode:02x}")
}

/// Registers, EIP and flags at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub eip: u32,
    pub eflags: u32,
    pub carry: bool,
    pub zero: bool,
    pub sign: bool,
    pub overflow: bool,
    pub state: CpuState,
    pub cycles: u64,
}

impl RegisterSnapshot {
    pub fn capture(cpu: &Cpu) -> Self {
        let [eax, ecx, edx, ebx, esp, ebp, esi, edi] = cpu.regs.as_array();
        Self {
            eax,
            ecx,
            edx,
            ebx,
            esp,
            ebp,
            esi,
            edi,
            eip: cpu.eip,
            eflags: cpu.eflags.bits(),
            carry: cpu.eflags.carry(),
            zero: cpu.eflags.zero(),
            sign: cpu.eflags.sign(),
            overflow: cpu.eflags.overflow(),
            state: cpu.state,
            cycles: cpu.cycles,
        }
    }

    /// General-purpose registers in encoding order.
    pub fn registers(&self) -> [u32; REGISTER_COUNT] {
        [self.eax, self.ecx, self.edx, self.ebx, self.esp, self.ebp, self.esi, self.edi]
    }

    /// The `NAME = xxxxxxxx` dump: EAX through EDI, then EIP.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, value) in REGISTER_NAMES.iter().zip(self.registers()) {
            let _ = writeln!(out, "{name} = {value:08x}");
        }
        let _ = writeln!(out, "EIP = {:08x}", self.eip);
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
