//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle, the run-state machine and
//! the per-tick instruction budget. Nothing a program does can make this
//! module return an error to the host: bad opcodes, bad operands, division
//! by zero and stack misuse all move the CPU to [`CpuState::Faulted`] and
//! are reported through [`Cpu::fault`] and the debug snapshot.

use crate::config::CpuConfig;
use crate::cpu::decode::{self, DecodeError, Instruction};
use crate::cpu::instruction::{self, Control, ExecContext, FaultKind, Operands, StackBounds};
use crate::cpu::io::UnitIo;
use crate::cpu::memory::MemoryError;
use crate::cpu::{Memory, Registers, Status};
use crate::program::ProgramImage;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Executing up to the budget each tick.
    Running,
    /// Waiting for resume or single-step.
    Paused,
    /// Executed `hlt`. Terminal until reload.
    Halted,
    /// Hit a fault. Terminal until reload.
    Faulted,
}

/// Record of the fault that stopped the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Opcode field of the faulting instruction word.
    pub opcode: u8,
    /// Address of the faulting instruction.
    pub ip: u16,
    pub kind: FaultKind,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (opcode {} at ip 0x{:04X})", self.kind, self.opcode, self.ip)
    }
}

impl Fault {
    fn from_decode(err: DecodeError, ip: u16) -> Self {
        match err {
            DecodeError::InvalidOpcode(opcode) => Fault {
                opcode,
                ip,
                kind: FaultKind::InvalidOpcode,
            },
            DecodeError::InvalidOperand { opcode, error } => Fault {
                opcode,
                ip,
                kind: FaultKind::InvalidOperand(error),
            },
        }
    }
}

/// What one `run` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Instructions executed during this call.
    pub executed: u32,
    /// State after the call.
    pub state: CpuState,
}

/// The unit CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Flags.
    pub status: Status,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    state: CpuState,
    /// Instructions executed since the last reset.
    pub cycles: u64,
    /// Instructions left in the current tick.
    remaining: u32,
    fault: Option<Fault>,
    stack: StackBounds,
    line_limit: usize,
    /// Loaded program, kept for reload and source-line lookup.
    image: Option<ProgramImage>,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a paused CPU with zeroed memory.
    pub fn new(config: &CpuConfig) -> Self {
        let stack = config.stack_bounds();
        Self {
            regs: Registers::new(stack.base),
            status: Status::default(),
            mem: Memory::new(config.memory_words),
            state: CpuState::Paused,
            cycles: 0,
            remaining: 0,
            fault: None,
            stack,
            line_limit: config.console_line_len,
            image: None,
            last_instr: None,
        }
    }

    /// Reset to post-construction defaults and re-write the loaded image.
    pub fn reset(&mut self) {
        self.regs.reset(self.stack.base);
        self.status = Status::default();
        self.mem.clear();
        self.state = CpuState::Paused;
        self.cycles = 0;
        self.remaining = 0;
        self.fault = None;
        self.last_instr = None;

        if let Some(image) = &self.image {
            // Image size was checked when it was loaded
            if self.mem.load(image.origin, &image.words).is_ok() {
                self.regs.ip = self.wrap_ip(image.entry as usize);
            }
        }
        log::debug!("cpu reset, ip=0x{:04X}", self.regs.ip);
    }

    /// Load a program image, replacing whatever was running.
    pub fn load(&mut self, image: ProgramImage) -> Result<(), MemoryError> {
        if image.words.len() > self.mem.size() {
            return Err(MemoryError::ProgramTooLarge {
                size: image.words.len(),
                available: self.mem.size(),
            });
        }
        log::debug!(
            "loading {} words at 0x{:04X}, entry 0x{:04X}",
            image.words.len(),
            image.origin,
            image.entry
        );
        self.image = Some(image);
        self.reset();
        Ok(())
    }

    /// Reload the current image. Alias of [`Cpu::reset`], the only way out
    /// of `Halted` and `Faulted`.
    pub fn reload(&mut self) {
        self.reset();
    }

    // ==================== Run control ====================

    /// Run up to `budget` instructions.
    ///
    /// Stops early when the CPU halts, faults, or is not running.
    pub fn run(&mut self, budget: u32, io: &mut dyn UnitIo) -> RunReport {
        self.remaining = budget;
        let mut executed = 0;

        while self.state == CpuState::Running && self.remaining > 0 {
            if !self.cycle(io) {
                break;
            }
            self.remaining -= 1;
            executed += 1;
        }

        RunReport { executed, state: self.state }
    }

    /// Execute exactly one instruction, ignoring the budget.
    ///
    /// Leaves the CPU paused unless the instruction halted or faulted.
    pub fn step(&mut self, io: &mut dyn UnitIo) -> Result<CpuState, ControlError> {
        self.ensure_live()?;
        self.cycle(io);
        if self.state == CpuState::Running {
            self.state = CpuState::Paused;
        }
        Ok(self.state)
    }

    /// Stop executing at the next instruction boundary.
    pub fn pause(&mut self) -> Result<(), ControlError> {
        self.ensure_live()?;
        if self.state == CpuState::Running {
            log::debug!("cpu paused at ip=0x{:04X}", self.regs.ip);
        }
        self.state = CpuState::Paused;
        Ok(())
    }

    /// Start executing on the next tick.
    pub fn resume(&mut self) -> Result<(), ControlError> {
        self.ensure_live()?;
        if self.state == CpuState::Paused {
            log::debug!("cpu resumed at ip=0x{:04X}", self.regs.ip);
        }
        self.state = CpuState::Running;
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), ControlError> {
        match (self.state, self.fault) {
            (CpuState::Faulted, Some(fault)) => Err(ControlError::Faulted(fault)),
            (CpuState::Halted, _) => Err(ControlError::Halted),
            _ => Ok(()),
        }
    }

    // ==================== Fetch / decode / execute ====================

    /// One fetch-decode-execute cycle. Returns whether an instruction
    /// completed.
    fn cycle(&mut self, io: &mut dyn UnitIo) -> bool {
        let ip = self.regs.ip;

        // Fetch + decode
        let instr = match decode::decode_at(&self.mem, ip) {
            Ok(instr) => instr,
            Err(err) => {
                self.raise(Fault::from_decode(err, ip));
                return false;
            }
        };

        // Resolve operands against the registers as they are now
        let ops = Operands {
            dst: instr.dst.map(|o| o.resolve(&self.regs)),
            src: instr.src.map(|o| o.resolve(&self.regs)),
        };
        let next_ip = self.wrap_ip(ip as usize + instr.width() as usize);

        // Execute
        let mut ctx = ExecContext {
            regs: &mut self.regs,
            mem: &mut self.mem,
            io,
            stack: self.stack,
            next_ip,
            line_limit: self.line_limit,
        };
        let outcome = match instruction::execute(instr.opcode, &mut ctx, &ops, self.status) {
            Ok(outcome) => outcome,
            Err(kind) => {
                self.raise(Fault { opcode: instr.opcode.code(), ip, kind });
                return false;
            }
        };

        self.status = outcome.status;
        self.regs.ip = match outcome.control {
            Control::Next => next_ip,
            Control::Jump(target) => self.wrap_ip(target as usize),
            Control::Halt => {
                log::debug!("cpu halted at ip=0x{:04X} after {} instructions", ip, self.cycles + 1);
                self.state = CpuState::Halted;
                next_ip
            }
        };
        self.cycles += 1;
        self.last_instr = Some(instr);

        log::trace!("{:04X}: {:<24} {} ip={:04X}", ip, instr.to_string(), self.status, self.regs.ip);
        true
    }

    fn raise(&mut self, fault: Fault) {
        // Program faults are the player's problem, not the server's
        log::debug!("cpu fault: {}", fault);
        self.fault = Some(fault);
        self.state = CpuState::Faulted;
    }

    #[inline]
    fn wrap_ip(&self, addr: usize) -> u16 {
        self.mem.wrap(addr) as u16
    }

    // ==================== Accessors ====================

    pub fn state(&self) -> CpuState {
        self.state
    }

    /// The fault that stopped the CPU, if it is faulted.
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Instructions left in the current tick's budget.
    pub fn remaining_budget(&self) -> u32 {
        self.remaining
    }

    /// The loaded program image.
    pub fn image(&self) -> Option<&ProgramImage> {
        self.image.as_ref()
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    pub fn is_faulted(&self) -> bool {
        self.state == CpuState::Faulted
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(&CpuConfig::default())
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("status", &self.status)
            .field("fault", &self.fault)
            .finish()
    }
}

/// Run-control requests the CPU refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("CPU is halted; reload the program to run it again")]
    Halted,

    #[error("CPU faulted: {0}")]
    Faulted(Fault),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::io::UnitBuffers;
    use crate::cpu::operand::{Operand, OperandError};
    use crate::cpu::registers::Register;
    use crate::cpu::instruction::{Opcode, StackError};

    fn config() -> CpuConfig {
        CpuConfig {
            memory_words: 256,
            stack_words: 16,
            ..CpuConfig::default()
        }
    }

    fn cpu_with(program: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new(&config());
        cpu.load(ProgramImage::from_instructions(program)).unwrap();
        cpu
    }

    fn reg(r: Register) -> Operand {
        Operand::Register(r)
    }

    fn imm(v: u16) -> Operand {
        Operand::Immediate(v)
    }

    /// `inc A; jmp 0`, never halts. Each instruction is one or two words.
    fn endless() -> Vec<Instruction> {
        vec![
            Instruction::unary(Opcode::Inc, reg(Register::A)),
            Instruction::target(Opcode::Jmp, imm(0)),
        ]
    }

    #[test]
    fn test_initial_state_is_paused() {
        let mut cpu = cpu_with(&[Instruction::none(Opcode::Hlt)]);
        let mut io = UnitBuffers::default();
        assert_eq!(cpu.state(), CpuState::Paused);

        let report = cpu.run(100, &mut io);
        assert_eq!(report.executed, 0);
        assert_eq!(cpu.state(), CpuState::Paused);
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = cpu_with(&[
            Instruction::none(Opcode::Nop),
            Instruction::none(Opcode::Nop),
            Instruction::none(Opcode::Hlt),
        ]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();

        let report = cpu.run(100, &mut io);
        assert_eq!(report, RunReport { executed: 3, state: CpuState::Halted });
        assert!(cpu.is_halted());
        assert_eq!(cpu.resume(), Err(ControlError::Halted));
    }

    #[test]
    fn test_budget_is_exact() {
        let mut cpu = cpu_with(&endless());
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();

        // inc (1 word) at 0, jmp 0 (2 words) at 1
        let report = cpu.run(5, &mut io);
        assert_eq!(report, RunReport { executed: 5, state: CpuState::Running });
        // inc, jmp, inc, jmp, inc -> A = 3, ip after the third inc
        assert_eq!(cpu.regs.get(Register::A), 3);
        assert_eq!(cpu.regs.ip, 1);
        assert_eq!(cpu.remaining_budget(), 0);
        assert_eq!(cpu.cycles, 5);

        // Next tick continues where this one stopped
        cpu.run(1, &mut io);
        assert_eq!(cpu.regs.ip, 0);
    }

    #[test]
    fn test_zero_budget_executes_nothing() {
        let mut cpu = cpu_with(&endless());
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        assert_eq!(cpu.run(0, &mut io).executed, 0);
        assert_eq!(cpu.regs.ip, 0);
    }

    #[test]
    fn test_jump_past_end_wraps_to_zero() {
        let mut cpu = cpu_with(&[Instruction::target(Opcode::Jmp, imm(256))]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        cpu.run(1, &mut io);
        assert_eq!(cpu.regs.ip, 0);
    }

    #[test]
    fn test_ip_advance_wraps() {
        let mut cpu = Cpu::new(&config());
        let mut image = ProgramImage::from_instructions(&[
            Instruction::binary(Opcode::Mov, reg(Register::A), imm(9)),
        ]);
        image.origin = 255;
        image.entry = 255;
        cpu.load(image).unwrap();
        let mut io = UnitBuffers::default();

        cpu.step(&mut io).unwrap();
        assert_eq!(cpu.regs.get(Register::A), 9);
        // Two-word instruction at 255 ends at 0, next is 1
        assert_eq!(cpu.regs.ip, 1);
    }

    #[test]
    fn test_invalid_opcode_faults() {
        let mut cpu = cpu_with(&[Instruction::none(Opcode::Nop)]);
        cpu.mem.write(1, 0x3F);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();

        let report = cpu.run(10, &mut io);
        assert_eq!(report, RunReport { executed: 1, state: CpuState::Faulted });
        assert_eq!(
            cpu.fault(),
            Some(Fault { opcode: 0x3F, ip: 1, kind: FaultKind::InvalidOpcode })
        );
        assert_eq!(cpu.regs.ip, 1);
    }

    #[test]
    fn test_invalid_operand_faults() {
        let mut cpu = cpu_with(&[]);
        // mov with a reserved source mode
        cpu.mem.write(0, Opcode::Mov.code() as u16 | 1 << 6 | 27 << 11);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        cpu.run(10, &mut io);

        let fault = cpu.fault().unwrap();
        assert_eq!(fault.kind, FaultKind::InvalidOperand(OperandError::ReservedMode(27)));
        assert_eq!(fault.opcode, 1);
        assert_eq!(fault.ip, 0);

        // Faulted is sticky
        assert!(matches!(cpu.resume(), Err(ControlError::Faulted(_))));
        assert!(matches!(cpu.step(&mut io), Err(ControlError::Faulted(_))));
        assert!(cpu.is_faulted());
    }

    #[test]
    fn test_div_by_zero_faults_without_write() {
        let mut cpu = cpu_with(&[
            Instruction::binary(Opcode::Mov, reg(Register::A), imm(10)),
            Instruction::binary(Opcode::Mov, Operand::Memory(0x80), imm(5)),
            Instruction::binary(Opcode::Div, Operand::Memory(0x80), reg(Register::B)),
            Instruction::none(Opcode::Hlt),
        ]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();

        let report = cpu.run(10, &mut io);
        assert_eq!(report.executed, 2);
        assert_eq!(cpu.fault().map(|f| f.kind), Some(FaultKind::ArithmeticFault));
        assert_eq!(cpu.fault().map(|f| f.opcode), Some(Opcode::Div.code()));
        assert_eq!(cpu.mem.read(0x80), 5);
        assert_eq!(cpu.regs.get(Register::A), 10);
    }

    #[test]
    fn test_step_from_paused() {
        let mut cpu = cpu_with(&endless());
        let mut io = UnitBuffers::default();

        assert_eq!(cpu.step(&mut io), Ok(CpuState::Paused));
        assert_eq!(cpu.regs.get(Register::A), 1);
        assert_eq!(cpu.regs.ip, 1);
        assert_eq!(cpu.cycles, 1);

        // Budget is irrelevant to single-step
        assert_eq!(cpu.remaining_budget(), 0);
        assert_eq!(cpu.step(&mut io), Ok(CpuState::Paused));
        assert_eq!(cpu.regs.ip, 0);
    }

    #[test]
    fn test_step_from_running_pauses() {
        let mut cpu = cpu_with(&endless());
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        cpu.run(3, &mut io);

        assert_eq!(cpu.step(&mut io), Ok(CpuState::Paused));
        assert_eq!(cpu.cycles, 4);
    }

    #[test]
    fn test_step_onto_hlt() {
        let mut cpu = cpu_with(&[Instruction::none(Opcode::Hlt)]);
        let mut io = UnitBuffers::default();
        assert_eq!(cpu.step(&mut io), Ok(CpuState::Halted));
        assert_eq!(cpu.step(&mut io), Err(ControlError::Halted));
    }

    #[test]
    fn test_pause_resume() {
        let mut cpu = cpu_with(&endless());
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        cpu.run(2, &mut io);
        cpu.pause().unwrap();

        let before = (cpu.regs.clone(), cpu.status, cpu.cycles);
        assert_eq!(cpu.run(10, &mut io).executed, 0);
        assert_eq!((cpu.regs.clone(), cpu.status, cpu.cycles), before);

        cpu.resume().unwrap();
        assert_eq!(cpu.run(10, &mut io).executed, 10);
    }

    #[test]
    fn test_nop_changes_nothing() {
        let mut cpu = cpu_with(&[Instruction::none(Opcode::Nop)]);
        let mut io = UnitBuffers::default();
        cpu.regs.set(Register::C, 77);
        cpu.status = Status { zero: true, sign: false, carry: true, overflow: false };
        cpu.mem.write(0x40, 123);

        let regs = cpu.regs.clone();
        let status = cpu.status;
        let mem = cpu.mem.dump(0, 256);

        cpu.step(&mut io).unwrap();
        assert_eq!(cpu.regs.get(Register::C), regs.get(Register::C));
        assert_eq!(cpu.regs.values(), regs.values());
        assert_eq!(cpu.status, status);
        assert_eq!(cpu.mem.dump(0, 256), mem);
        assert_eq!(cpu.regs.ip, 1);
    }

    #[test]
    fn test_flags_preserved_by_data_movement() {
        let mut cpu = cpu_with(&[
            Instruction::binary(Opcode::Cmp, imm(1), imm(2)),
            Instruction::binary(Opcode::Mov, reg(Register::A), imm(0)),
            Instruction::target(Opcode::Push, reg(Register::A)),
            Instruction::unary(Opcode::Pop, reg(Register::B)),
            Instruction::binary(Opcode::Xchg, reg(Register::A), reg(Register::B)),
            Instruction::none(Opcode::Hlt),
        ]);
        let mut io = UnitBuffers::default();
        cpu.step(&mut io).unwrap();
        let after_cmp = cpu.status;
        assert!(after_cmp.carry && after_cmp.sign);

        cpu.resume().unwrap();
        cpu.run(10, &mut io);
        assert!(cpu.is_halted());
        assert_eq!(cpu.status, after_cmp);
    }

    #[test]
    fn test_signed_loop_with_jge() {
        // A counts down from 3 while A >= 0; B counts iterations
        let mut cpu = cpu_with(&[
            Instruction::binary(Opcode::Mov, reg(Register::A), imm(3)),    // 0..2
            Instruction::unary(Opcode::Inc, reg(Register::B)),             // 2
            Instruction::unary(Opcode::Dec, reg(Register::A)),             // 3
            Instruction::binary(Opcode::Cmp, reg(Register::A), imm(0)),    // 4..6
            Instruction::target(Opcode::Jge, imm(2)),                      // 6..8
            Instruction::none(Opcode::Hlt),                                // 8
        ]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        cpu.run(1000, &mut io);

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.get(Register::B), 4);
        assert_eq!(cpu.regs.get(Register::A), 0xFFFF);
    }

    #[test]
    fn test_call_ret() {
        let mut cpu = cpu_with(&[
            Instruction::target(Opcode::Call, imm(3)),                     // 0..2
            Instruction::none(Opcode::Hlt),                                // 2
            Instruction::binary(Opcode::Mov, reg(Register::X), imm(42)),   // 3..5
            Instruction::none(Opcode::Ret),                                // 5
        ]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        let report = cpu.run(10, &mut io);

        assert_eq!(report, RunReport { executed: 4, state: CpuState::Halted });
        assert_eq!(cpu.regs.get(Register::X), 42);
        assert_eq!(cpu.regs.get(Register::Sp), config().stack_bounds().base);
    }

    #[test]
    fn test_stack_underflow_faults() {
        let mut cpu = cpu_with(&[Instruction::none(Opcode::Ret)]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        cpu.run(10, &mut io);
        assert_eq!(
            cpu.fault().map(|f| f.kind),
            Some(FaultKind::StackFault(StackError::Underflow))
        );
    }

    #[test]
    fn test_runaway_recursion_overflows_stack() {
        let mut cpu = cpu_with(&[Instruction::target(Opcode::Call, imm(0))]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        let report = cpu.run(1000, &mut io);

        assert_eq!(report.executed, 16);
        assert_eq!(
            cpu.fault().map(|f| f.kind),
            Some(FaultKind::StackFault(StackError::Overflow))
        );
    }

    #[test]
    fn test_console_and_keyboard() {
        let mut cpu = cpu_with(&[
            Instruction::unary(Opcode::In, Operand::Memory(0x40)),
            Instruction::target(Opcode::Out, imm(0x40)),
            Instruction::none(Opcode::Hlt),
        ]);
        let mut io = UnitBuffers::default();
        io.push_key('k' as u16);
        cpu.resume().unwrap();
        cpu.run(10, &mut io);

        assert_eq!(io.drain_console(), vec!["k".to_string()]);
        assert_eq!(io.pending_keys(), 0);
    }

    #[test]
    fn test_reload_restores_defaults() {
        let program = vec![
            Instruction::binary(Opcode::Mov, reg(Register::A), imm(0x8000)),
            Instruction::binary(Opcode::Add, reg(Register::A), reg(Register::A)),
            Instruction::binary(Opcode::Mov, Operand::Memory(0x90), reg(Register::A)),
            Instruction::target(Opcode::Push, imm(1)),
            Instruction::none(Opcode::Hlt),
        ];
        let mut cpu = cpu_with(&program);
        let fresh = cpu.clone();
        let mut io = UnitBuffers::default();

        cpu.resume().unwrap();
        cpu.run(100, &mut io);
        assert!(cpu.is_halted());
        assert!(cpu.status.carry);

        cpu.load(ProgramImage::from_instructions(&program)).unwrap();
        assert_eq!(cpu.regs, fresh.regs);
        assert_eq!(cpu.status, Status::default());
        assert_eq!(cpu.state(), CpuState::Paused);
        assert_eq!(cpu.mem.dump(0, 256), fresh.mem.dump(0, 256));
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.fault(), None);
    }

    #[test]
    fn test_reload_clears_fault() {
        let mut cpu = cpu_with(&[Instruction::none(Opcode::Ret)]);
        let mut io = UnitBuffers::default();
        cpu.resume().unwrap();
        cpu.run(1, &mut io);
        assert!(cpu.is_faulted());

        cpu.reload();
        assert_eq!(cpu.state(), CpuState::Paused);
        assert_eq!(cpu.fault(), None);
        assert!(cpu.resume().is_ok());
    }

    #[test]
    fn test_load_too_large() {
        let mut cpu = Cpu::new(&config());
        let image = ProgramImage { words: vec![0; 257], ..ProgramImage::default() };
        assert_eq!(
            cpu.load(image),
            Err(MemoryError::ProgramTooLarge { size: 257, available: 256 })
        );
        assert!(cpu.image().is_none());
    }

    #[test]
    fn test_deserialize_rejects_empty_memory() {
        let cpu = cpu_with(&endless());
        let mut json = serde_json::to_value(&cpu).unwrap();
        let back: Cpu = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back.mem.size(), 256);
        assert_eq!(back.regs, cpu.regs);

        json["mem"] = serde_json::json!([]);
        assert!(serde_json::from_value::<Cpu>(json).is_err());
    }

    #[test]
    fn test_arbitrary_words_never_panic() {
        // Every possible first word either executes or faults cleanly
        let mut io = UnitBuffers::default();
        for word in (0..=u16::MAX).step_by(7) {
            let mut cpu = cpu_with(&[]);
            cpu.mem.write(0, word);
            let _ = cpu.step(&mut io);
            match cpu.fault() {
                Some(fault) => {
                    assert!(cpu.is_faulted());
                    assert_eq!(fault.ip, 0);
                    assert_eq!(fault.opcode, (word & 0x3F) as u8);
                }
                None => assert!(matches!(cpu.state(), CpuState::Paused | CpuState::Halted)),
            }
        }
    }
}
