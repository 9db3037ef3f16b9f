//! Operand descriptors and addressing-mode resolution.
//!
//! An instruction word carries two 5-bit operand descriptors. Decoding a
//! descriptor is pure: it names an addressing mode and, for modes that need
//! one, consumes an extension word. Resolving the decoded operand against
//! the current registers yields an [`OperandSource`]: either a writable
//! [`Location`] or a read-only immediate value.
//!
//! Descriptor codes:
//!
//! | Code    | Mode                      | Extension word |
//! |---------|---------------------------|----------------|
//! | 0       | no operand                | no             |
//! | 1..=8   | register `A`..`BP`        | no             |
//! | 9..=16  | register indirect `[r]`   | no             |
//! | 17..=24 | indexed `[r + disp]`      | displacement   |
//! | 25..=29 | reserved                  | -              |
//! | 30      | memory direct `[addr]`    | address        |
//! | 31      | immediate                 | value          |

use super::memory::Memory;
use super::registers::{Register, Registers};
use serde::{Serialize, Deserialize};
use thiserror::Error;

pub const CODE_NONE: u8 = 0;
const CODE_REGISTER: u8 = 1;
const CODE_INDIRECT: u8 = 9;
const CODE_INDEXED: u8 = 17;
pub const CODE_MEMORY: u8 = 30;
pub const CODE_IMMEDIATE: u8 = 31;

/// Which operand field of the instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Destination,
    Source,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Destination => f.write_str("destination"),
            Field::Source => f.write_str("source"),
        }
    }
}

/// Addressing mode named by a descriptor, before any extension word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Register(Register),
    Indirect(Register),
    Indexed(Register),
    Memory,
    Immediate,
}

impl Mode {
    /// Decode a 5-bit descriptor. `Ok(None)` means "no operand".
    pub fn from_code(code: u8) -> Result<Option<Mode>, OperandError> {
        let register = |base: u8| Register::from_index(code - base);
        let mode = match code {
            CODE_NONE => return Ok(None),
            CODE_REGISTER..=8 => register(CODE_REGISTER).map(Mode::Register),
            CODE_INDIRECT..=16 => register(CODE_INDIRECT).map(Mode::Indirect),
            CODE_INDEXED..=24 => register(CODE_INDEXED).map(Mode::Indexed),
            CODE_MEMORY => Some(Mode::Memory),
            CODE_IMMEDIATE => Some(Mode::Immediate),
            _ => None,
        };
        mode.map(Some).ok_or(OperandError::ReservedMode(code))
    }

    /// Whether this mode consumes an extension word.
    pub fn needs_extension(self) -> bool {
        matches!(self, Mode::Indexed(_) | Mode::Memory | Mode::Immediate)
    }

    /// Complete the operand with its extension word (ignored by modes
    /// that do not take one).
    pub fn with_extension(self, word: u16) -> Operand {
        match self {
            Mode::Register(r) => Operand::Register(r),
            Mode::Indirect(r) => Operand::Indirect(r),
            Mode::Indexed(r) => Operand::Indexed(r, word),
            Mode::Memory => Operand::Memory(word),
            Mode::Immediate => Operand::Immediate(word),
        }
    }
}

/// A fully decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Register direct: `A`
    Register(Register),
    /// Register indirect: `[A]`
    Indirect(Register),
    /// Indexed: `[A + disp]`
    Indexed(Register, u16),
    /// Memory direct: `[addr]`
    Memory(u16),
    /// Immediate value
    Immediate(u16),
}

impl Operand {
    /// The 5-bit descriptor code for this operand.
    pub fn code(&self) -> u8 {
        match self {
            Operand::Register(r) => CODE_REGISTER + r.index() as u8,
            Operand::Indirect(r) => CODE_INDIRECT + r.index() as u8,
            Operand::Indexed(r, _) => CODE_INDEXED + r.index() as u8,
            Operand::Memory(_) => CODE_MEMORY,
            Operand::Immediate(_) => CODE_IMMEDIATE,
        }
    }

    /// The extension word this operand carries, if any.
    pub fn extension(&self) -> Option<u16> {
        match self {
            Operand::Indexed(_, w) | Operand::Memory(w) | Operand::Immediate(w) => Some(*w),
            Operand::Register(_) | Operand::Indirect(_) => None,
        }
    }

    /// Resolve against the current registers.
    pub fn resolve(&self, regs: &Registers) -> OperandSource {
        match *self {
            Operand::Register(r) => OperandSource::Location(Location::Register(r)),
            Operand::Indirect(r) => OperandSource::Location(Location::Memory(regs.get(r))),
            Operand::Indexed(r, disp) => {
                OperandSource::Location(Location::Memory(regs.get(r).wrapping_add(disp)))
            }
            Operand::Memory(addr) => OperandSource::Location(Location::Memory(addr)),
            Operand::Immediate(value) => OperandSource::Immediate(value),
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Indirect(r) => write!(f, "[{}]", r),
            Operand::Indexed(r, disp) => {
                let signed = *disp as i16;
                if signed < 0 {
                    write!(f, "[{} - {}]", r, signed.unsigned_abs())
                } else {
                    write!(f, "[{} + {}]", r, signed)
                }
            }
            Operand::Memory(addr) => write!(f, "[0x{:04X}]", addr),
            Operand::Immediate(value) => write!(f, "0x{:04X}", value),
        }
    }
}

/// An addressable, writable location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(Register),
    Memory(u16),
}

impl Location {
    #[inline]
    pub fn get(&self, regs: &Registers, mem: &Memory) -> u16 {
        match *self {
            Location::Register(r) => regs.get(r),
            Location::Memory(addr) => mem.read(addr),
        }
    }

    #[inline]
    pub fn set(&self, regs: &mut Registers, mem: &mut Memory, value: u16) {
        match *self {
            Location::Register(r) => regs.set(r, value),
            Location::Memory(addr) => mem.write(addr, value),
        }
    }
}

/// A resolved operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSource {
    Location(Location),
    Immediate(u16),
}

impl OperandSource {
    /// Current value of the operand.
    #[inline]
    pub fn get(&self, regs: &Registers, mem: &Memory) -> u16 {
        match self {
            OperandSource::Location(loc) => loc.get(regs, mem),
            OperandSource::Immediate(value) => *value,
        }
    }

    /// The writable location, if this is not an immediate.
    pub fn location(&self) -> Option<Location> {
        match self {
            OperandSource::Location(loc) => Some(*loc),
            OperandSource::Immediate(_) => None,
        }
    }
}

/// Errors from decoding operand descriptors against an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum OperandError {
    #[error("reserved addressing mode {0}")]
    ReservedMode(u8),

    #[error("missing {0} operand")]
    Missing(Field),

    #[error("unexpected {0} operand")]
    Unexpected(Field),

    #[error("{0} operand must be writable")]
    NotWritable(Field),
}
