//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::cpu::{CpuState, Register};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(60),
            Constraint::Percentage(40),
        ])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(8),
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
            Constraint::Min(8),
            Constraint::Length(10),
            Constraint::Length(5),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_console(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly view.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:04X}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
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

/// Draw registers, flags and run state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let snap = app.cpu.snapshot();
    let reg = |r: Register| {
        vec![
            Span::raw(format!("{:>2}: ", r.name())),
            Span::styled(format!("{:04X}", snap.registers[r.index()]), Style::default().fg(Color::White)),
            Span::raw(format!(" {:>6}   ", snap.registers[r.index()] as i16)),
        ]
    };
    let row = |regs: &[Register]| Line::from(regs.iter().flat_map(|r| reg(*r)).collect::<Vec<_>>());

    let state_style = match snap.state {
        CpuState::Running => Style::default().fg(Color::Green),
        CpuState::Paused => Style::default().fg(Color::Yellow),
        CpuState::Halted | CpuState::Faulted => Style::default().fg(Color::Red),
    };

    let mut content = vec![
        row(&[Register::A, Register::B, Register::C, Register::D]),
        row(&[Register::X, Register::Y, Register::Sp, Register::Bp]),
        Line::from(vec![
            Span::raw("ip: "),
            Span::styled(format!("{:04X}", snap.ip), Style::default().fg(Color::Yellow)),
            Span::raw("   flags: "),
            Span::styled(snap.status.to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("   line: "),
            Span::raw(snap.line.map_or("-".to_string(), |l| l.to_string())),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", snap.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", snap.state), state_style),
            Span::raw(format!("   Speed: {}/frame", app.steps_per_frame)),
        ]),
    ];
    if let Some(fault) = snap.fault {
        content.push(Line::from(Span::styled(
            format!("Fault: {}", fault),
            Style::default().fg(Color::Red),
        )));
    }

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let ip = app.cpu.regs.ip;
    let sp = app.cpu.regs.get(Register::Sp);

    let items: Vec<ListItem> = app
        .cpu
        .mem
        .dump(app.mem_scroll as u16, visible_rows.min(app.cpu.mem.size()))
        .into_iter()
        .map(|(addr, value)| {
            let marker = if addr == ip {
                "ip"
            } else if addr == sp {
                "sp"
            } else {
                "  "
            };
            let text = format!("{} {:04X}: {:04X} {:>6}", marker, addr, value, value as i16);

            let style = if addr == ip {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw the unit's console output, newest at the bottom.
fn draw_console(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = (area.height as usize).saturating_sub(2);
    let skip = app.console.len().saturating_sub(rows);
    let lines: Vec<Line> = app.console[skip..]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();

    let title = if app.input_mode {
        format!(" Console (input, {} keys queued) ", app.io.pending_keys())
    } else {
        " Console ".to_string()
    };
    let console = Paragraph::new(lines)
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)));

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
        Line::from("x: Reset  i: Keyboard  +/-: Speed"),
        Line::from("↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
