//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::registers::REGISTER_NAMES;
use super::app::{DebuggerApp, MemoryView, MEMORY_ROW_BYTES};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Percentage(50),
        ])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(9),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, console and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_console(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly from the current EIP onwards.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|line| {
            let is_current = line.addr == app.cpu.eip;
            let has_bp = app.breakpoints.contains(&line.addr);
            let prefix = if is_current { "▶ " } else { "  " };
            let bp = if has_bp { "●" } else { " " };
            let text = format!("{}{:08x}: {}", prefix, line.addr, line.text);

            let style = if is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if has_bp {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw registers, EIP and flags.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = app.cpu.regs.as_array();
    let mut content: Vec<Line> = (0..4)
        .map(|row| {
            let left = row;
            let right = row + 4;
            Line::from(vec![
                Span::raw(format!("{}: ", REGISTER_NAMES[left])),
                Span::styled(format!("{:08x}", regs[left]), Style::default().fg(Color::White)),
                Span::raw(format!("   {}: ", REGISTER_NAMES[right])),
                Span::styled(format!("{:08x}", regs[right]), Style::default().fg(Color::White)),
            ])
        })
        .collect();

    let flags = app.cpu.eflags;
    content.push(Line::from(vec![
        Span::raw("EIP: "),
        Span::styled(format!("{:08x}", app.cpu.eip), Style::default().fg(Color::Yellow)),
        Span::raw("   Flags: "),
        flag_span("CF", flags.carry()),
        flag_span("ZF", flags.zero()),
        flag_span("SF", flags.sign()),
        flag_span("OF", flags.overflow()),
    ]));
    content.push(Line::from(vec![
        Span::raw("Cycles: "),
        Span::styled(format!("{}", app.cpu.cycles), Style::default().fg(Color::Cyan)),
        Span::raw("   State: "),
        Span::styled(format!("{:?}", app.cpu.state),
            if app.cpu.is_running() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Red)
            }),
    ]));

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw a hex dump of the selected memory region.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2) as u32;
    let base = app.memory_base();
    let esp = app.cpu.regs.get32(crate::cpu::registers::ESP);

    let items: Vec<ListItem> = (0..visible_rows)
        .map(|row| base.wrapping_add(row * MEMORY_ROW_BYTES))
        .filter(|addr| (*addr as usize) < app.cpu.mem.len())
        .map(|addr| {
            let bytes = app.cpu.mem.slice(addr, MEMORY_ROW_BYTES as usize);
            let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
            let text = format!("{:08x}: {}", addr, hex.join(" "));

            let row_holds = |target: u32| target >= addr && target < addr + MEMORY_ROW_BYTES;
            let style = if row_holds(app.cpu.eip) {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if row_holds(esp) {
                Style::default().fg(Color::Magenta)
            } else if bytes.iter().any(|b| *b != 0) {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let title = match app.mem_view {
        MemoryView::Code => " Memory (code) ",
        MemoryView::Stack => " Memory (stack) ",
    };
    let list = List::new(items)
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw console output captured from COM1.
fn draw_console(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let console = Paragraph::new(app.console_text())
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Console ")
            .borders(Borders::ALL));

    frame.render_widget(console, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  m: Code/stack  ↑↓: Scroll  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}

/// Flag name, highlighted when set.
fn flag_span(name: &'static str, set: bool) -> Span<'static> {
    let style = if set {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!("{name} "), style)
}
