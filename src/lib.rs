//! # x86emu
//!
//! A minimal 32-bit x86 emulator for boot-sector sized programs.
//!
//! A raw image is placed at 0x7C00 in 1 MiB of flat memory and executed one
//! instruction at a time until EIP reaches address zero. Registers, flags
//! and memory stay fully inspectable between steps, which makes it a
//! sandbox for bootloader and OS-course exercises.

pub mod cpu;
pub mod io;
pub mod bios;
pub mod config;
pub mod loader;
pub mod disasm;
pub mod trace;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, MemoryError, Registers, Eflags, ModRm};
pub use io::{PortIo, ConsolePorts, BufferedPorts, NullPorts};
pub use config::{EmulatorConfig, ConfigError};
pub use loader::{load_image, LoadError};
pub use trace::{RegisterSnapshot, TraceSink, WriterTrace};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
