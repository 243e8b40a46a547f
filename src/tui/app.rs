//! Debugger application state and logic.

use std::collections::HashSet;
use crate::cpu::registers::ESP;
use crate::disasm::{disassemble_instruction, disassemble_range, Line};
use crate::{BufferedPorts, Cpu, EmulatorConfig};

/// Bytes shown per memory row.
pub const MEMORY_ROW_BYTES: u32 = 16;

/// Which region the memory pane follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryView {
    /// Rows starting at the load address.
    Code,
    /// Rows starting at ESP.
    Stack,
}

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Machine layout the CPU was built from.
    pub config: EmulatorConfig,
    /// Original image for reset.
    pub image: Vec<u8>,
    /// Console the program reads and writes.
    pub ports: BufferedPorts,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u32>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in rows.
    pub mem_scroll: u32,
    /// Region the memory pane follows.
    pub mem_view: MemoryView,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded image.
    pub fn new(config: EmulatorConfig, image: Vec<u8>) -> Self {
        let mut app = Self {
            cpu: Cpu::with_config(&config),
            config,
            image,
            ports: BufferedPorts::new(),
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
            mem_view: MemoryView::Code,
        };
        if let Err(e) = app.cpu.load_image(&app.image) {
            app.status = format!("Error: {e}");
        }
        app
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let eip = self.cpu.eip;
        let line = disassemble_instruction(&self.cpu.mem, eip);
        match self.cpu.step(&mut self.ports) {
            Ok(_) => {
                self.status = format!("EIP={eip:08x}: {}", line.text);
            }
            Err(e) => {
                self.status = format!("Error: {e}");
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
        // Leave the breakpoint we are stopped on
        if self.breakpoints.contains(&self.cpu.eip) {
            self.step();
        }
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() || !self.cpu.eip_in_memory() {
            self.running = false;
            self.status = format!("Stopped after {} instructions: {:?}", self.cpu.cycles, self.cpu.state);
            return;
        }

        let eip = self.cpu.eip;
        if self.breakpoints.contains(&eip) {
            self.running = false;
            self.status = format!("Breakpoint at EIP={eip:08x}");
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at current EIP.
    pub fn toggle_breakpoint(&mut self) {
        let eip = self.cpu.eip;
        if self.breakpoints.remove(&eip) {
            self.status = format!("Removed breakpoint at EIP={eip:08x}");
        } else {
            self.breakpoints.insert(eip);
            self.status = format!("Set breakpoint at EIP={eip:08x}");
        }
    }

    /// Reset CPU to initial state and reload the image.
    pub fn reset(&mut self) {
        self.cpu.reset(&self.config);
        self.ports.clear();
        self.running = false;
        self.status = match self.cpu.load_image(&self.image) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Error: {e}"),
        };
    }

    /// Switch the memory pane between code and stack.
    pub fn toggle_memory_view(&mut self) {
        self.mem_view = match self.mem_view {
            MemoryView::Code => MemoryView::Stack,
            MemoryView::Stack => MemoryView::Code,
        };
        self.mem_scroll = 0;
    }

    pub fn scroll_up(&mut self) {
        self.mem_scroll = self.mem_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        let rows = self.cpu.mem.len() as u32 / MEMORY_ROW_BYTES;
        if self.mem_scroll + 1 < rows {
            self.mem_scroll += 1;
        }
    }

    /// First address shown in the memory pane.
    pub fn memory_base(&self) -> u32 {
        let anchor = match self.mem_view {
            MemoryView::Code => self.config.load_address,
            MemoryView::Stack => self.cpu.regs.get32(ESP),
        };
        (anchor & !(MEMORY_ROW_BYTES - 1)).wrapping_add(self.mem_scroll * MEMORY_ROW_BYTES)
    }

    /// Disassembly starting at the current EIP.
    pub fn get_disassembly(&self, lines: usize) -> Vec<Line> {
        disassemble_range(&self.cpu.mem, self.cpu.eip, lines)
    }

    /// Console output so far, with escape sequences removed.
    pub fn console_text(&self) -> String {
        strip_ansi(&String::from_utf8_lossy(self.ports.output()))
    }
}

/// Drop `ESC [ ... letter` sequences.
fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Run the debugger with an image.
pub fn run_debugger(config: EmulatorConfig, image: Vec<u8>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(config, image);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Char('m') => app.toggle_memory_view(),
                        KeyCode::Up => app.scroll_up(),
                        KeyCode::Down => app.scroll_down(),
                        _ => {}
                    }
                }
            }
        }

        // Up to 256 instructions per frame while running
        for _ in 0..256 {
            if !app.running {
                break;
            }
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::EAX;

    fn app(image: &[u8]) -> DebuggerApp {
        DebuggerApp::new(EmulatorConfig::default(), image.to_vec())
    }

    #[test]
    fn test_step_updates_status() {
        let mut app = app(&[0xB8, 0x2A, 0x00, 0x00, 0x00]);
        app.step();

        assert_eq!(app.cpu.regs.get32(EAX), 42);
        assert!(app.status.contains("mov eax, 0x2a"));
    }

    #[test]
    fn test_breakpoint_stops_run() {
        // inc eax; inc eax; jmp $
        let mut app = app(&[0x40, 0x40, 0xEB, 0xFE]);
        app.step();
        app.toggle_breakpoint();
        app.reset();
        assert!(app.breakpoints.contains(&0x7C01));

        app.run();
        for _ in 0..10 {
            app.tick();
        }

        assert!(!app.running);
        assert_eq!(app.cpu.eip, 0x7C01);
        assert_eq!(app.cpu.regs.get32(EAX), 1);
    }

    #[test]
    fn test_run_resumes_from_breakpoint() {
        // inc eax; inc eax; inc eax; jmp $
        let mut app = app(&[0x40, 0x40, 0x40, 0xEB, 0xFE]);
        app.breakpoints.insert(0x7C01);
        app.breakpoints.insert(0x7C02);

        app.run();
        for _ in 0..10 {
            app.tick();
        }
        assert_eq!(app.cpu.eip, 0x7C01);
        assert!(!app.running);

        app.run();
        for _ in 0..10 {
            app.tick();
        }
        assert_eq!(app.cpu.eip, 0x7C02);
        assert_eq!(app.cpu.regs.get32(EAX), 2);
        assert!(!app.running);
    }

    #[test]
    fn test_console_capture() {
        // mov ax, 0x0e41 via mov ah/al; int 0x10
        let mut app = app(&[0xB4, 0x0E, 0xB0, 0x41, 0xCD, 0x10]);
        for _ in 0..3 {
            app.step();
        }
        assert_eq!(app.console_text(), "A");
    }

    #[test]
    fn test_memory_view_follows_stack() {
        let mut app = app(&[0x50]);
        app.step();
        app.toggle_memory_view();
        assert_eq!(app.memory_base(), 0x7BF0);

        app.toggle_memory_view();
        app.scroll_down();
        assert_eq!(app.memory_base(), 0x7C10);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;37mH\x1b[mi"), "Hi");
    }
}
