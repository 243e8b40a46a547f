//! TUI debugger for the x86 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and flag view
//! - Hex memory view following the code or the stack
//! - Step/run/breakpoint controls
//! - Disassembly from the current EIP
//! - Captured console output

mod app;
mod ui;

pub use app::{DebuggerApp, MemoryView, run_debugger};
