//! WebAssembly bindings for the x86 emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::cpu::registers::REGISTER_COUNT;
use crate::disasm::{decode_line, disassemble_instruction};
use crate::{BufferedPorts, Cpu, EmulatorConfig};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly emulator wrapper.
#[wasm_bindgen]
pub struct WasmEmulator {
    cpu: Cpu,
    config: EmulatorConfig,
    image: Vec<u8>,
    ports: BufferedPorts,
}

#[wasm_bindgen]
impl WasmEmulator {
    /// Create an emulator with the default boot-sector layout.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let config = EmulatorConfig::default();
        Self {
            cpu: Cpu::with_config(&config),
            config,
            image: Vec::new(),
            ports: BufferedPorts::new(),
        }
    }

    /// Load a raw image at the load address. Returns its length.
    #[wasm_bindgen]
    pub fn load_image(&mut self, image: &[u8]) -> Result<usize, JsError> {
        if image.is_empty() {
            return Err(JsError::new("image is empty"));
        }
        if image.len() > self.config.image_limit {
            return Err(JsError::new(&format!(
                "image is {} bytes, limit is {}",
                image.len(),
                self.config.image_limit
            )));
        }

        self.image = image.to_vec();
        self.cpu.reset(&self.config);
        self.ports.clear();
        self.cpu.load_image(&self.image)
            .map_err(|e| JsError::new(&e.to_string()))?;

        Ok(image.len())
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        if !self.cpu.is_running() {
            return Err(JsError::new("CPU is halted"));
        }

        let line = disassemble_instruction(&self.cpu.mem, self.cpu.eip);
        self.cpu.step(&mut self.ports)
            .map_err(|e| JsError::new(&e.to_string()))?;

        Ok(line.text)
    }

    /// Run until halt or max steps. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_steps: u32) -> Result<u64, JsError> {
        self.cpu.run_limited(&mut self.ports, max_steps as u64)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.cpu.cycles)
    }

    /// Reset CPU to initial state with loaded image.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.cpu.reset(&self.config);
        self.ports.clear();
        if !self.image.is_empty() {
            self.cpu.load_image(&self.image)
                .map_err(|e| JsError::new(&e.to_string()))?;
        }
        Ok(())
    }

    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    #[wasm_bindgen]
    pub fn eip(&self) -> u32 {
        self.cpu.eip
    }

    /// Get a general-purpose register by index (0 = EAX .. 7 = EDI).
    #[wasm_bindgen]
    pub fn register(&self, index: usize) -> Option<u32> {
        (index < REGISTER_COUNT).then(|| self.cpu.regs.get32(index))
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    /// Get registers, flags and state as a JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        self.cpu.snapshot().to_json()
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Copy of `len` bytes of memory starting at `addr`, clipped to memory size.
    #[wasm_bindgen]
    pub fn memory_slice(&self, addr: u32, len: usize) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.cpu.mem.slice(addr, len))
    }

    /// Drain console output written since the last call.
    #[wasm_bindgen]
    pub fn output(&mut self) -> String {
        String::from_utf8_lossy(&self.ports.take_output()).into_owned()
    }

    /// Queue bytes for `in al, dx` on COM1.
    #[wasm_bindgen]
    pub fn push_input(&mut self, input: &str) {
        self.ports.push_input(input.as_bytes());
    }
}

impl Default for WasmEmulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassemble the instruction at the start of `code`, as if placed at `addr`.
#[wasm_bindgen]
pub fn wasm_disassemble(code: &[u8], addr: u32) -> String {
    decode_line(code, addr).text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::EAX;

    #[test]
    fn test_reset_reloads_image() {
        let mut emu = WasmEmulator::new();
        emu.load_image(&[0x40, 0xEB, 0xFE]).unwrap();
        emu.run(10).unwrap();
        assert_eq!(emu.register(EAX), Some(1));

        emu.reset().unwrap();

        assert_eq!(emu.eip(), 0x7C00);
        assert_eq!(emu.register(EAX), Some(0));
        assert_eq!(emu.cycles(), 0);
        assert_eq!(emu.step().unwrap(), "inc eax");
    }
}
