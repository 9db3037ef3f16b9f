//! Debugger application state and logic.

use crate::config::CpuConfig;
use crate::cpu::{Cpu, CpuState, MemoryError, UnitBuffers};
use crate::program::disasm::disassemble_range;
use crate::program::ProgramImage;
use std::collections::HashSet;

/// Console lines kept for display.
const CONSOLE_SCROLLBACK: usize = 200;

/// Instructions shown in the disassembly pane before it scrolls.
const DISASM_WINDOW: usize = 24;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Its keyboard and console.
    pub io: UnitBuffers,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u16>,
    /// Should we quit?
    pub should_quit: bool,
    /// Typed characters go to the unit's keyboard instead of the debugger.
    pub input_mode: bool,
    /// Status message to display.
    pub status: String,
    /// Console output seen so far.
    pub console: Vec<String>,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
    /// Instructions executed per frame while running.
    pub steps_per_frame: u32,
    /// First address of the disassembly pane.
    disasm_start: u16,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(config: &CpuConfig, image: ProgramImage) -> Result<Self, MemoryError> {
        let mut cpu = Cpu::new(config);
        cpu.load(image)?;
        let disasm_start = cpu.regs.ip;

        Ok(Self {
            cpu,
            io: UnitBuffers::new(config.keyboard_capacity, config.console_capacity),
            breakpoints: HashSet::new(),
            should_quit: false,
            input_mode: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            console: Vec::new(),
            mem_scroll: 0,
            steps_per_frame: 1,
            disasm_start,
        })
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        let ip = self.cpu.regs.ip;
        match self.cpu.step(&mut self.io) {
            Ok(state) => {
                self.status = match (state, self.cpu.last_instruction()) {
                    (CpuState::Faulted, _) => self.fault_message(),
                    (_, Some(instr)) => format!("ip={:04X}: {}", ip, instr),
                    (_, None) => format!("ip={:04X}", ip),
                };
            }
            Err(e) => self.status = format!("Error: {}", e),
        }
        self.after_execute();
    }

    /// Run until halt, fault, pause or breakpoint.
    pub fn run(&mut self) {
        // Leave a breakpoint we are sitting on
        if self.breakpoints.contains(&self.cpu.regs.ip) {
            self.step();
        }
        if self.cpu.state() != CpuState::Paused {
            return;
        }
        match self.cpu.resume() {
            Ok(()) => self.status = "Running...".into(),
            Err(e) => self.status = format!("Error: {}", e),
        }
    }

    pub fn pause(&mut self) {
        match self.cpu.pause() {
            Ok(()) => self.status = format!("Paused at ip={:04X}", self.cpu.regs.ip),
            Err(e) => self.status = format!("Error: {}", e),
        }
    }

    /// Run one frame of continuous execution.
    pub fn tick(&mut self) {
        if !self.cpu.is_running() {
            return;
        }

        for _ in 0..self.steps_per_frame {
            let ip = self.cpu.regs.ip;
            if self.breakpoints.contains(&ip) {
                let _ = self.cpu.pause();
                self.status = format!("Breakpoint at ip={:04X}", ip);
                break;
            }
            if self.cpu.run(1, &mut self.io).executed == 0 {
                break;
            }
        }

        match self.cpu.state() {
            CpuState::Halted => {
                self.status = format!("Halted after {} cycles", self.cpu.cycles)
            }
            CpuState::Faulted => self.status = self.fault_message(),
            _ => {}
        }
        self.after_execute();
    }

    /// Toggle breakpoint at current ip.
    pub fn toggle_breakpoint(&mut self) {
        let ip = self.cpu.regs.ip;
        if self.breakpoints.remove(&ip) {
            self.status = format!("Removed breakpoint at ip={:04X}", ip);
        } else {
            self.breakpoints.insert(ip);
            self.status = format!("Set breakpoint at ip={:04X}", ip);
        }
    }

    /// Reload the program.
    pub fn reset(&mut self) {
        self.cpu.reload();
        self.io.clear();
        self.console.clear();
        self.disasm_start = self.cpu.regs.ip;
        self.status = "Reset. Ready.".into();
    }

    /// Send a keypress to the unit.
    pub fn send_key(&mut self, key: u16) {
        if !self.io.push_key(key) {
            self.status = "Keyboard queue full".into();
        }
    }

    pub fn scroll_memory(&mut self, up: bool) {
        if up {
            self.mem_scroll = self.mem_scroll.saturating_sub(1);
        } else if self.mem_scroll + 1 < self.cpu.mem.size() {
            self.mem_scroll += 1;
        }
    }

    /// Disassembly starting at the top of the pane, marking the current ip.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let ip = self.cpu.regs.ip;
        disassemble_range(&self.cpu.mem, self.disasm_start, lines)
            .into_iter()
            .map(|(addr, text)| {
                let text = match self.cpu.source_line(addr) {
                    Some(line) => format!("{:<28} ; line {}", text, line),
                    None => text,
                };
                (addr, text, addr == ip)
            })
            .collect()
    }

    fn fault_message(&self) -> String {
        match self.cpu.fault() {
            Some(fault) => format!("Fault: {}", fault),
            None => "Fault".into(),
        }
    }

    fn after_execute(&mut self) {
        self.console.extend(self.io.drain_console());
        if self.console.len() > CONSOLE_SCROLLBACK {
            let excess = self.console.len() - CONSOLE_SCROLLBACK;
            self.console.drain(..excess);
        }

        // Keep the current instruction inside the pane
        let ip = self.cpu.regs.ip;
        let visible = disassemble_range(&self.cpu.mem, self.disasm_start, DISASM_WINDOW);
        if !visible.iter().any(|(addr, _)| *addr == ip) {
            self.disasm_start = ip;
        }
    }
}

/// Run the debugger with a program.
pub fn run_debugger(config: &CpuConfig, image: ProgramImage) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Create app before touching the terminal
    let mut app = DebuggerApp::new(config, image)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.input_mode {
                        match key.code {
                            KeyCode::Esc => {
                                app.input_mode = false;
                                app.status = "Input mode off.".into();
                            }
                            KeyCode::Enter => app.send_key(b'\n' as u16),
                            KeyCode::Char(c) => app.send_key(c as u32 as u16),
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => app.step(),
                            KeyCode::Char('r') => app.run(),
                            KeyCode::Char('p') => app.pause(),
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Char('i') => {
                                app.input_mode = true;
                                app.status = "Input mode: keys go to the unit, Esc to leave.".into();
                            }
                            KeyCode::Char('+') => app.steps_per_frame = (app.steps_per_frame * 10).min(100_000),
                            KeyCode::Char('-') => app.steps_per_frame = (app.steps_per_frame / 10).max(1),
                            KeyCode::Up => app.scroll_memory(true),
                            KeyCode::Down => app.scroll_memory(false),
                            _ => {}
                        }
                    }
                }
            }
        }

        // Tick for continuous running
        app.tick();

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
    use crate::cpu::decode::Instruction;
    use crate::cpu::operand::Operand;
    use crate::cpu::registers::Register;
    use crate::cpu::Opcode;

    fn app() -> DebuggerApp {
        let config = CpuConfig {
            memory_words: 256,
            stack_words: 16,
            ..CpuConfig::default()
        };
        // 0: inc A / 1: cmp A, 3 / 3: jnz 0 / 5: hlt
        let image = ProgramImage::from_instructions(&[
            Instruction::unary(Opcode::Inc, Operand::Register(Register::A)),
            Instruction::binary(Opcode::Cmp, Operand::Register(Register::A), Operand::Immediate(3)),
            Instruction::target(Opcode::Jnz, Operand::Immediate(0)),
            Instruction::none(Opcode::Hlt),
        ]);
        DebuggerApp::new(&config, image).unwrap()
    }

    fn run_to_stop(app: &mut DebuggerApp) {
        app.steps_per_frame = 100;
        app.run();
        for _ in 0..10 {
            app.tick();
        }
    }

    #[test]
    fn test_run_to_halt() {
        let mut app = app();
        run_to_stop(&mut app);
        assert!(app.cpu.is_halted());
        assert_eq!(app.cpu.regs.get(Register::A), 3);
        assert!(app.status.starts_with("Halted"));
    }

    #[test]
    fn test_breakpoint_stops_and_resumes() {
        let mut app = app();
        app.cpu.regs.ip = 5;
        app.toggle_breakpoint();
        app.cpu.regs.ip = 0;

        run_to_stop(&mut app);
        assert_eq!(app.cpu.state(), CpuState::Paused);
        assert_eq!(app.cpu.regs.ip, 5);

        // Running again steps off the breakpoint onto hlt
        app.run();
        assert!(app.cpu.is_halted());
    }

    #[test]
    fn test_step_and_reset() {
        let mut app = app();
        app.step();
        assert_eq!(app.status, "ip=0000: inc A");
        assert_eq!(app.cpu.cycles, 1);

        app.reset();
        assert_eq!(app.cpu.cycles, 0);
        assert_eq!(app.cpu.regs.get(Register::A), 0);
    }

    #[test]
    fn test_disassembly_marks_ip() {
        let mut app = app();
        app.step();
        let lines = app.get_disassembly(4);
        assert_eq!(lines[0].0, 0);
        assert!(lines[1].2);
        assert!(lines[1].1.contains("cmp A, 0x0003"));
        assert!(lines[1].1.ends_with("; line 2"));
    }
}
