//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle. Instruction behaviour lives in
//! [`crate::cpu::instructions`]; this module owns the machine state and the
//! loop that drives it.

use crate::config::EmulatorConfig;
use crate::cpu::dispatch::DispatchTable;
use crate::cpu::flags::Eflags;
use crate::cpu::memory::MemoryError;
use crate::cpu::modrm::ModRm;
use crate::cpu::registers::ESP;
use crate::cpu::{Memory, Registers};
use crate::io::PortIo;
use crate::trace::{NoTrace, RegisterSnapshot, TraceSink};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// EIP reached address zero: the program ended.
    Halted,
    /// An opcode or addressing form with no implementation was reached.
    Unimplemented,
    /// A memory access fell outside emulated memory.
    Faulted,
}

/// The emulated x86 processor and its memory.
#[derive(Clone)]
pub struct Cpu {
    /// General-purpose registers.
    pub regs: Registers,
    /// Status flags.
    pub eflags: Eflags,
    /// Instruction pointer.
    pub eip: u32,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instructions executed.
    pub cycles: u64,
    /// Opcode byte of the instruction being (or last) executed.
    pub opcode: u8,
    dispatch: &'static DispatchTable,
}

impl Cpu {
    /// Create a CPU with default-sized zeroed memory and EIP/ESP at zero.
    pub fn new() -> Self {
        Self::with_memory(Memory::new())
    }

    fn with_memory(mem: Memory) -> Self {
        Self {
            regs: Registers::new(),
            eflags: Eflags::empty(),
            eip: 0,
            mem,
            state: CpuState::Running,
            cycles: 0,
            opcode: 0,
            dispatch: DispatchTable::global(),
        }
    }

    /// Create a CPU laid out per `config`: memory size, EIP at the load
    /// address and ESP at the initial stack address.
    pub fn with_config(config: &EmulatorConfig) -> Self {
        let mut cpu = Self::with_memory(Memory::with_size(config.memory_size));
        cpu.eip = config.load_address;
        cpu.regs.set32(ESP, config.stack_pointer);
        cpu
    }

    /// Reset registers, flags and state; memory is cleared.
    pub fn reset(&mut self, config: &EmulatorConfig) {
        self.regs.reset();
        self.mem.clear();
        self.eflags = Eflags::empty();
        self.eip = config.load_address;
        self.regs.set32(ESP, config.stack_pointer);
        self.state = CpuState::Running;
        self.cycles = 0;
        self.opcode = 0;
    }

    /// Copy a boot image to the current EIP.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.mem.load(self.eip, image)
    }

    // ==================== Code stream ====================

    #[inline]
    pub fn read_code8(&self, offset: u32) -> Result<u8, MemoryError> {
        self.mem.read8(self.eip.wrapping_add(offset))
    }

    #[inline]
    pub fn read_code_i8(&self, offset: u32) -> Result<i8, MemoryError> {
        Ok(self.read_code8(offset)? as i8)
    }

    #[inline]
    pub fn read_code32(&self, offset: u32) -> Result<u32, MemoryError> {
        self.mem.read32(self.eip.wrapping_add(offset))
    }

    #[inline]
    pub fn read_code_i32(&self, offset: u32) -> Result<i32, MemoryError> {
        Ok(self.read_code32(offset)? as i32)
    }

    // ==================== Stack ====================

    /// Push a 32-bit value: ESP -= 4, then store.
    pub fn push32(&mut self, value: u32) -> Result<(), MemoryError> {
        let addr = self.regs.get32(ESP).wrapping_sub(4);
        self.mem.write32(addr, value)?;
        self.regs.set32(ESP, addr);
        Ok(())
    }

    /// Pop a 32-bit value: load, then ESP += 4.
    pub fn pop32(&mut self) -> Result<u32, MemoryError> {
        let addr = self.regs.get32(ESP);
        let value = self.mem.read32(addr)?;
        self.regs.set32(ESP, addr.wrapping_add(4));
        Ok(value)
    }

    // ==================== Execution ====================

    /// Execute a single instruction.
    ///
    /// Returns the opcode byte that was executed. On error the CPU moves
    /// to `Unimplemented` or `Faulted` and stays there.
    pub fn step(&mut self, io: &mut dyn PortIo) -> Result<u8, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let result = self.fetch_and_execute(io);
        match result {
            Ok(opcode) => {
                self.cycles += 1;
                if self.eip == 0 {
                    self.state = CpuState::Halted;
                }
                Ok(opcode)
            }
            Err(e) => {
                self.state = e.halt_state();
                Err(e)
            }
        }
    }

    fn fetch_and_execute(&mut self, io: &mut dyn PortIo) -> Result<u8, CpuError> {
        let opcode = self.read_code8(0)?;
        self.opcode = opcode;

        let handler = self.dispatch.get(opcode).ok_or(CpuError::UnimplementedOpcode {
            opcode,
            eip: self.eip,
        })?;
        handler(self, io)?;

        Ok(opcode)
    }

    /// Run until halt, error, or EIP leaves memory.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self, io: &mut dyn PortIo) -> Result<u64, CpuError> {
        self.run_traced(io, &mut NoTrace, None)
    }

    /// Run for at most `max_steps` instructions.
    pub fn run_limited(&mut self, io: &mut dyn PortIo, max_steps: u64) -> Result<u64, CpuError> {
        self.run_traced(io, &mut NoTrace, Some(max_steps))
    }

    /// Run with every instruction reported to `sink` before it executes.
    pub fn run_traced(
        &mut self,
        io: &mut dyn PortIo,
        sink: &mut dyn TraceSink,
        max_steps: Option<u64>,
    ) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = max_steps.map(|n| self.cycles.saturating_add(n));

        while self.is_running() && self.eip_in_memory() {
            if limit.is_some_and(|limit| self.cycles >= limit) {
                break;
            }
            if let Ok(opcode) = self.read_code8(0) {
                sink.before_step(self.eip, opcode);
            }
            self.step(io)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// EIP points inside emulated memory.
    #[inline]
    pub fn eip_in_memory(&self) -> bool {
        (self.eip as usize) < self.mem.len()
    }

    /// Check if the program ended normally.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Capture registers, EIP and flags.
    pub fn snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot::capture(self)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("eip", &format_args!("{:#010x}", self.eip))
            .field("eflags", &self.eflags)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("not implemented: opcode {opcode:#04x} at EIP {eip:#010x}")]
    UnimplementedOpcode { opcode: u8, eip: u32 },

    #[error("not implemented: opcode {opcode:#04x} with ModRM {modrm}")]
    UnimplementedAddressing { opcode: u8, modrm: ModRm },

    #[error("not implemented: {opcode:02X} /{reg}")]
    UnimplementedGroup { opcode: u8, reg: u8 },

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl CpuError {
    /// State the CPU is left in after this error.
    pub fn halt_state(&self) -> CpuState {
        match self {
            CpuError::NotRunning(state) => *state,
            CpuError::Memory(_) => CpuState::Faulted,
            _ => CpuState::Unimplemented,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::{EAX, EBX, ECX};
    use crate::io::NullPorts;

    fn boot(image: &[u8]) -> Cpu {
        let mut cpu = Cpu::with_config(&EmulatorConfig::default());
        cpu.load_image(image).unwrap();
        cpu
    }

    #[test]
    fn test_initial_state_from_config() {
        let cpu = boot(&[]);
        assert_eq!(cpu.eip, 0x7C00);
        assert_eq!(cpu.regs.get32(ESP), 0x7C00);
        assert_eq!(cpu.state, CpuState::Running);
    }

    #[test]
    fn test_mov_add_jump_to_zero() {
        let mut cpu = boot(&[
            0xB8, 0x05, 0x00, 0x00, 0x00, // mov eax, 5
            0xBB, 0x03, 0x00, 0x00, 0x00, // mov ebx, 3
            0x01, 0xD8, // add eax, ebx
            0xE9, 0xEF, 0x83, 0xFF, 0xFF, // jmp 0
        ]);

        let executed = cpu.run(&mut NullPorts).unwrap();

        assert_eq!(executed, 4);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.get32(EAX), 8);
        assert_eq!(cpu.regs.get32(EBX), 3);
        assert_eq!(cpu.eip, 0);
    }

    #[test]
    fn test_unimplemented_opcode_stops_without_side_effects() {
        let mut cpu = boot(&[
            0xB9, 0x2A, 0x00, 0x00, 0x00, // mov ecx, 42
            0x0F, 0x0B, // ud2
        ]);

        let err = cpu.run(&mut NullPorts).unwrap_err();

        assert_eq!(err, CpuError::UnimplementedOpcode { opcode: 0x0F, eip: 0x7C05 });
        assert_eq!(cpu.state, CpuState::Unimplemented);
        assert_eq!(cpu.cycles, 1);
        assert_eq!(cpu.eip, 0x7C05);
        assert_eq!(cpu.regs.get32(ECX), 42);
        assert_eq!(cpu.regs.get32(EAX), 0);
        assert_eq!(cpu.regs.get32(ESP), 0x7C00);
    }

    #[test]
    fn test_step_after_halt_is_rejected() {
        let mut cpu = boot(&[0xEB, 0x00]);
        cpu.state = CpuState::Halted;

        assert_eq!(
            cpu.step(&mut NullPorts),
            Err(CpuError::NotRunning(CpuState::Halted))
        );
    }

    #[test]
    fn test_run_limited() {
        // jmp $
        let mut cpu = boot(&[0xEB, 0xFE]);

        let executed = cpu.run_limited(&mut NullPorts, 100).unwrap();

        assert_eq!(executed, 100);
        assert!(cpu.is_running());
        assert_eq!(cpu.eip, 0x7C00);
    }

    #[test]
    fn test_out_of_bounds_fetch_faults() {
        let mut cpu = Cpu::with_config(&EmulatorConfig {
            memory_size: 0x10,
            load_address: 0x0C,
            stack_pointer: 0x10,
            ..EmulatorConfig::default()
        });
        // mov eax, imm32 runs off the end of memory
        cpu.load_image(&[0xB8, 0x01, 0x02, 0x03]).unwrap();

        let err = cpu.run(&mut NullPorts).unwrap_err();

        assert!(matches!(err, CpuError::Memory(MemoryError::OutOfBounds { .. })));
        assert_eq!(cpu.state, CpuState::Faulted);
    }

    #[test]
    fn test_run_stops_when_eip_leaves_memory() {
        let mut cpu = Cpu::with_config(&EmulatorConfig {
            memory_size: 0x100,
            load_address: 0x80,
            stack_pointer: 0x100,
            ..EmulatorConfig::default()
        });
        // jmp +0x7E lands at 0x100, one past the end
        cpu.load_image(&[0xEB, 0x7E]).unwrap();

        let executed = cpu.run(&mut NullPorts).unwrap();

        assert_eq!(executed, 1);
        assert_eq!(cpu.eip, 0x100);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_push_pop_adjust_esp_by_four() {
        let mut cpu = boot(&[]);

        cpu.push32(0xAABB_CCDD).unwrap();
        assert_eq!(cpu.regs.get32(ESP), 0x7BFC);
        assert_eq!(cpu.mem.read32(0x7BFC).unwrap(), 0xAABB_CCDD);

        assert_eq!(cpu.pop32().unwrap(), 0xAABB_CCDD);
        assert_eq!(cpu.regs.get32(ESP), 0x7C00);
    }

    #[test]
    fn test_reset() {
        let config = EmulatorConfig::default();
        let mut cpu = boot(&[0xB8, 0x01, 0x00, 0x00, 0x00]);
        cpu.step(&mut NullPorts).unwrap();

        cpu.reset(&config);

        assert_eq!(cpu.eip, config.load_address);
        assert_eq!(cpu.regs.get32(EAX), 0);
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.mem.read8(0x7C00).unwrap(), 0);
    }
}
