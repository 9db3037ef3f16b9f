//! The instruction catalog.
//!
//! Instructions are a closed set: [`Opcode`] names every one of them and
//! [`execute`] implements them with a single exhaustive `match`. An
//! instruction never reaches into the CPU; it receives an explicit
//! [`ExecContext`] (registers, memory, unit I/O, stack bounds) plus its
//! resolved operands and the current flags, and returns the new flags and
//! what the CPU should do with the instruction pointer next.
//!
//! Instructions check everything that can fault before writing anything,
//! so a faulting instruction leaves registers and memory untouched.

use super::alu;
use super::io::UnitIo;
use super::memory::Memory;
use super::operand::{Field, Location, OperandError, OperandSource};
use super::registers::{Register, Registers};
use super::status::{Condition, Status};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// How an instruction uses one operand field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Field must be empty.
    Unused,
    /// Any operand, value is only read.
    Read,
    /// Must resolve to a writable location.
    Write,
}

/// Operand shape of an instruction: (destination, source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub dst: Access,
    pub src: Access,
}

impl Shape {
    const NONE: Shape = Shape { dst: Access::Unused, src: Access::Unused };
    const UNARY: Shape = Shape { dst: Access::Write, src: Access::Unused };
    const TARGET: Shape = Shape { dst: Access::Unused, src: Access::Read };
    const BINARY: Shape = Shape { dst: Access::Write, src: Access::Read };
    const COMPARE: Shape = Shape { dst: Access::Read, src: Access::Read };
    const SWAP: Shape = Shape { dst: Access::Write, src: Access::Write };

    /// Number of operands the instruction takes.
    pub fn operand_count(self) -> usize {
        [self.dst, self.src]
            .iter()
            .filter(|&&a| a != Access::Unused)
            .count()
    }
}

/// Every instruction, with its opcode as the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Control ====================
    Hlt = 0,

    // ==================== Data movement ====================
    Mov = 1,

    // ==================== Arithmetic / logic ====================
    Add = 2,
    Sub = 3,
    And = 4,
    Or = 5,
    Shl = 6,
    Shr = 7,
    Sar = 8,
    Xor = 9,
    Not = 10,
    Neg = 11,
    Cmp = 12,
    Test = 13,
    Inc = 14,
    Dec = 15,
    Mul = 16,
    Div = 17,
    Mod = 18,

    // ==================== Stack / subroutines ====================
    Push = 19,
    Pop = 20,
    Call = 21,
    Ret = 22,

    // ==================== Jumps ====================
    Jmp = 23,
    Jz = 24,
    Jnz = 25,
    Jg = 26,
    Jge = 27,
    Jl = 28,
    Jle = 29,
    Ja = 30,
    Jae = 31,
    Jb = 32,
    Jbe = 33,
    Js = 34,
    Jns = 35,
    Jo = 36,
    Jno = 37,

    // ==================== Misc ====================
    Xchg = 38,
    In = 39,
    Out = 40,
    Nop = 41,
}

impl Opcode {
    /// Every opcode, in numeric order.
    pub const ALL: [Opcode; 42] = [
        Opcode::Hlt, Opcode::Mov, Opcode::Add, Opcode::Sub, Opcode::And,
        Opcode::Or, Opcode::Shl, Opcode::Shr, Opcode::Sar, Opcode::Xor,
        Opcode::Not, Opcode::Neg, Opcode::Cmp, Opcode::Test, Opcode::Inc,
        Opcode::Dec, Opcode::Mul, Opcode::Div, Opcode::Mod, Opcode::Push,
        Opcode::Pop, Opcode::Call, Opcode::Ret, Opcode::Jmp, Opcode::Jz,
        Opcode::Jnz, Opcode::Jg, Opcode::Jge, Opcode::Jl, Opcode::Jle,
        Opcode::Ja, Opcode::Jae, Opcode::Jb, Opcode::Jbe, Opcode::Js,
        Opcode::Jns, Opcode::Jo, Opcode::Jno, Opcode::Xchg, Opcode::In,
        Opcode::Out, Opcode::Nop,
    ];

    /// Numeric opcode as stored in the low six bits of an instruction word.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlt => "hlt",
            Opcode::Mov => "mov",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Sar => "sar",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Neg => "neg",
            Opcode::Cmp => "cmp",
            Opcode::Test => "test",
            Opcode::Inc => "inc",
            Opcode::Dec => "dec",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Jg => "jg",
            Opcode::Jge => "jge",
            Opcode::Jl => "jl",
            Opcode::Jle => "jle",
            Opcode::Ja => "ja",
            Opcode::Jae => "jae",
            Opcode::Jb => "jb",
            Opcode::Jbe => "jbe",
            Opcode::Js => "js",
            Opcode::Jns => "jns",
            Opcode::Jo => "jo",
            Opcode::Jno => "jno",
            Opcode::Xchg => "xchg",
            Opcode::In => "in",
            Opcode::Out => "out",
            Opcode::Nop => "nop",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            Opcode::Hlt | Opcode::Ret | Opcode::Nop => Shape::NONE,

            Opcode::Mov
            | Opcode::Add
            | Opcode::Sub
            | Opcode::And
            | Opcode::Or
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Sar
            | Opcode::Xor
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod => Shape::BINARY,

            Opcode::Not
            | Opcode::Neg
            | Opcode::Inc
            | Opcode::Dec
            | Opcode::Pop
            | Opcode::In => Shape::UNARY,

            Opcode::Cmp | Opcode::Test => Shape::COMPARE,

            Opcode::Xchg => Shape::SWAP,

            Opcode::Push | Opcode::Call | Opcode::Jmp | Opcode::Out => Shape::TARGET,

            Opcode::Jz
            | Opcode::Jnz
            | Opcode::Jg
            | Opcode::Jge
            | Opcode::Jl
            | Opcode::Jle
            | Opcode::Ja
            | Opcode::Jae
            | Opcode::Jb
            | Opcode::Jbe
            | Opcode::Js
            | Opcode::Jns
            | Opcode::Jo
            | Opcode::Jno => Shape::TARGET,
        }
    }

    /// Branch condition for the conditional jumps.
    pub fn condition(self) -> Option<Condition> {
        let cond = match self {
            Opcode::Jz => Condition::Zero,
            Opcode::Jnz => Condition::NotZero,
            Opcode::Jg => Condition::Greater,
            Opcode::Jge => Condition::GreaterEqual,
            Opcode::Jl => Condition::Less,
            Opcode::Jle => Condition::LessEqual,
            Opcode::Ja => Condition::Above,
            Opcode::Jae => Condition::AboveEqual,
            Opcode::Jb => Condition::Below,
            Opcode::Jbe => Condition::BelowEqual,
            Opcode::Js => Condition::Sign,
            Opcode::Jns => Condition::NotSign,
            Opcode::Jo => Condition::Overflow,
            Opcode::Jno => Condition::NotOverflow,
            _ => return None,
        };
        Some(cond)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Stack region: SP grows down from `base` (empty) to `limit` (full).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackBounds {
    pub base: u16,
    pub limit: u16,
}

/// Stack misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StackError {
    #[error("overflow")]
    Overflow,
    #[error("underflow")]
    Underflow,
}

/// Why an instruction could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FaultKind {
    #[error("invalid opcode")]
    InvalidOpcode,

    #[error("invalid operand: {0}")]
    InvalidOperand(#[from] OperandError),

    #[error("division by zero")]
    ArithmeticFault,

    #[error("stack {0}")]
    StackFault(#[from] StackError),
}

/// What the CPU does with `ip` after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Fall through to the next instruction.
    Next,
    /// Continue at the given address.
    Jump(u16),
    /// Stop the program.
    Halt,
}

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub control: Control,
}

impl Outcome {
    fn next(status: Status) -> Self {
        Self { status, control: Control::Next }
    }

    fn jump(status: Status, target: u16) -> Self {
        Self { status, control: Control::Jump(target) }
    }
}

/// Resolved operands of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operands {
    pub dst: Option<OperandSource>,
    pub src: Option<OperandSource>,
}

impl Operands {
    fn dst(&self) -> Result<OperandSource, FaultKind> {
        self.dst.ok_or(FaultKind::InvalidOperand(OperandError::Missing(Field::Destination)))
    }

    fn src(&self) -> Result<OperandSource, FaultKind> {
        self.src.ok_or(FaultKind::InvalidOperand(OperandError::Missing(Field::Source)))
    }

    fn dst_location(&self) -> Result<Location, FaultKind> {
        self.dst()?
            .location()
            .ok_or(FaultKind::InvalidOperand(OperandError::NotWritable(Field::Destination)))
    }

    fn src_location(&self) -> Result<Location, FaultKind> {
        self.src()?
            .location()
            .ok_or(FaultKind::InvalidOperand(OperandError::NotWritable(Field::Source)))
    }
}

/// Everything an instruction may touch.
pub struct ExecContext<'a> {
    pub regs: &'a mut Registers,
    pub mem: &'a mut Memory,
    pub io: &'a mut dyn UnitIo,
    pub stack: StackBounds,
    /// Address of the instruction that follows this one.
    pub next_ip: u16,
    /// Maximum number of words `out` reads for one console line.
    pub line_limit: usize,
}

impl ExecContext<'_> {
    #[inline]
    fn read(&self, src: OperandSource) -> u16 {
        src.get(self.regs, self.mem)
    }

    #[inline]
    fn write(&mut self, loc: Location, value: u16) {
        loc.set(self.regs, self.mem, value);
    }

    fn push(&mut self, value: u16) -> Result<(), FaultKind> {
        let sp = self.regs.get(Register::Sp);
        if sp <= self.stack.limit {
            return Err(StackError::Overflow.into());
        }
        let sp = sp - 1;
        self.regs.set(Register::Sp, sp);
        self.mem.write(sp, value);
        Ok(())
    }

    fn pop(&mut self) -> Result<u16, FaultKind> {
        let sp = self.regs.get(Register::Sp);
        if sp >= self.stack.base {
            return Err(StackError::Underflow.into());
        }
        let value = self.mem.read(sp);
        self.regs.set(Register::Sp, sp + 1);
        Ok(value)
    }

    /// Read a NUL-terminated string of one character per word.
    fn read_string(&self, addr: u16) -> String {
        (0..self.line_limit)
            .map(|i| self.mem.read(addr.wrapping_add(i as u16)))
            .take_while(|&w| w != 0)
            .map(|w| char::from_u32(w as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

/// Apply a read-modify-write ALU operation to the destination.
fn modify(
    ctx: &mut ExecContext<'_>,
    ops: &Operands,
    f: impl FnOnce(u16, u16) -> (u16, Status),
) -> Result<Outcome, FaultKind> {
    let loc = ops.dst_location()?;
    let a = loc.get(ctx.regs, ctx.mem);
    let b = ctx.read(ops.src()?);
    let (result, status) = f(a, b);
    ctx.write(loc, result);
    Ok(Outcome::next(status))
}

/// Apply a unary ALU operation to the destination.
fn modify_unary(
    ctx: &mut ExecContext<'_>,
    ops: &Operands,
    f: impl FnOnce(u16) -> (u16, Status),
) -> Result<Outcome, FaultKind> {
    let loc = ops.dst_location()?;
    let (result, status) = f(loc.get(ctx.regs, ctx.mem));
    ctx.write(loc, result);
    Ok(Outcome::next(status))
}

/// Flags of `dst op src` without writing anything.
fn compare(
    ctx: &ExecContext<'_>,
    ops: &Operands,
    f: impl FnOnce(u16, u16) -> (u16, Status),
) -> Result<Outcome, FaultKind> {
    let a = ctx.read(ops.dst()?);
    let b = ctx.read(ops.src()?);
    Ok(Outcome::next(f(a, b).1))
}

/// Division-like operation that faults on a zero divisor.
fn divide(
    ctx: &mut ExecContext<'_>,
    ops: &Operands,
    f: impl FnOnce(u16, u16) -> Option<(u16, Status)>,
) -> Result<Outcome, FaultKind> {
    let loc = ops.dst_location()?;
    let a = loc.get(ctx.regs, ctx.mem);
    let b = ctx.read(ops.src()?);
    let (result, status) = f(a, b).ok_or(FaultKind::ArithmeticFault)?;
    ctx.write(loc, result);
    Ok(Outcome::next(status))
}

/// Execute one instruction.
pub fn execute(
    op: Opcode,
    ctx: &mut ExecContext<'_>,
    ops: &Operands,
    status: Status,
) -> Result<Outcome, FaultKind> {
    match op {
        Opcode::Hlt => Ok(Outcome { status, control: Control::Halt }),
        Opcode::Nop => Ok(Outcome::next(status)),

        Opcode::Mov => {
            let loc = ops.dst_location()?;
            let value = ctx.read(ops.src()?);
            ctx.write(loc, value);
            Ok(Outcome::next(status))
        }

        Opcode::Xchg => {
            let a = ops.dst_location()?;
            let b = ops.src_location()?;
            let va = a.get(ctx.regs, ctx.mem);
            let vb = b.get(ctx.regs, ctx.mem);
            ctx.write(a, vb);
            ctx.write(b, va);
            Ok(Outcome::next(status))
        }

        Opcode::Add => modify(ctx, ops, alu::add),
        Opcode::Sub => modify(ctx, ops, alu::sub),
        Opcode::And => modify(ctx, ops, alu::and),
        Opcode::Or => modify(ctx, ops, alu::or),
        Opcode::Xor => modify(ctx, ops, alu::xor),
        Opcode::Shl => modify(ctx, ops, alu::shl),
        Opcode::Shr => modify(ctx, ops, alu::shr),
        Opcode::Sar => modify(ctx, ops, alu::sar),
        Opcode::Mul => modify(ctx, ops, alu::mul),
        Opcode::Div => divide(ctx, ops, alu::div),
        Opcode::Mod => divide(ctx, ops, alu::rem),

        Opcode::Not => modify_unary(ctx, ops, alu::not),
        Opcode::Neg => modify_unary(ctx, ops, alu::neg),
        Opcode::Inc => modify_unary(ctx, ops, |a| alu::add(a, 1)),
        Opcode::Dec => modify_unary(ctx, ops, |a| alu::sub(a, 1)),

        Opcode::Cmp => compare(ctx, ops, alu::sub),
        Opcode::Test => compare(ctx, ops, alu::and),

        Opcode::Push => {
            let value = ctx.read(ops.src()?);
            ctx.push(value)?;
            Ok(Outcome::next(status))
        }

        Opcode::Pop => {
            let loc = ops.dst_location()?;
            let value = ctx.pop()?;
            ctx.write(loc, value);
            Ok(Outcome::next(status))
        }

        Opcode::Call => {
            let target = ctx.read(ops.src()?);
            let ret = ctx.next_ip;
            ctx.push(ret)?;
            Ok(Outcome::jump(status, target))
        }

        Opcode::Ret => {
            let target = ctx.pop()?;
            Ok(Outcome::jump(status, target))
        }

        Opcode::Jmp => Ok(Outcome::jump(status, ctx.read(ops.src()?))),

        Opcode::Jz
        | Opcode::Jnz
        | Opcode::Jg
        | Opcode::Jge
        | Opcode::Jl
        | Opcode::Jle
        | Opcode::Ja
        | Opcode::Jae
        | Opcode::Jb
        | Opcode::Jbe
        | Opcode::Js
        | Opcode::Jns
        | Opcode::Jo
        | Opcode::Jno => {
            let target = ctx.read(ops.src()?);
            let taken = op.condition().map_or(false, |c| c.holds(status));
            if taken {
                Ok(Outcome::jump(status, target))
            } else {
                Ok(Outcome::next(status))
            }
        }

        Opcode::In => {
            let loc = ops.dst_location()?;
            let key = ctx.io.read_key().unwrap_or(0);
            ctx.write(loc, key);
            Ok(Outcome::next(status))
        }

        Opcode::Out => {
            let addr = ctx.read(ops.src()?);
            let line = ctx.read_string(addr);
            ctx.io.write_line(line);
            Ok(Outcome::next(status))
        }
    }
}
