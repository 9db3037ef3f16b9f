//! Instruction word layout, decoder and encoder.
//!
//! Encoding version 1. Every instruction starts with one 16-bit word:
//!
//! ```text
//!  15      11 10       6 5          0
//! +----------+----------+------------+
//! |  source  |   dest   |   opcode   |
//! +----------+----------+------------+
//! ```
//!
//! followed by the destination's extension word (if its addressing mode
//! takes one), then the source's. Instructions are therefore one to three
//! words wide. See [`crate::cpu::operand`] for the descriptor codes.
//!
//! Any change to this layout breaks previously compiled programs and must
//! bump [`ENCODING_VERSION`] together with the assembler.

use super::instruction::{Access, Opcode};
use super::memory::Memory;
use super::operand::{Field, Mode, Operand, OperandError, CODE_NONE};
use super::table::OPCODE_TABLE;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Version of the word layout and opcode numbering.
pub const ENCODING_VERSION: u16 = 1;

const OPCODE_MASK: u16 = 0x3F;
const FIELD_MASK: u16 = 0x1F;
const DST_SHIFT: u16 = 6;
const SRC_SHIFT: u16 = 11;

/// Split the first word into (opcode, destination code, source code).
#[inline]
pub fn split_word(word: u16) -> (u8, u8, u8) {
    (
        (word & OPCODE_MASK) as u8,
        ((word >> DST_SHIFT) & FIELD_MASK) as u8,
        ((word >> SRC_SHIFT) & FIELD_MASK) as u8,
    )
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dst: Option<Operand>,
    pub src: Option<Operand>,
}

impl Instruction {
    /// Instruction without operands (`hlt`, `ret`, `nop`).
    pub fn none(opcode: Opcode) -> Self {
        Self { opcode, dst: None, src: None }
    }

    /// Instruction with only a destination (`inc A`, `pop B`).
    pub fn unary(opcode: Opcode, dst: Operand) -> Self {
        Self { opcode, dst: Some(dst), src: None }
    }

    /// Instruction with only a source (`jmp 4`, `push A`).
    pub fn target(opcode: Opcode, src: Operand) -> Self {
        Self { opcode, dst: None, src: Some(src) }
    }

    /// Instruction with both operands (`mov A, 5`).
    pub fn binary(opcode: Opcode, dst: Operand, src: Operand) -> Self {
        Self { opcode, dst: Some(dst), src: Some(src) }
    }

    /// Width in words, including extension words.
    pub fn width(&self) -> u16 {
        let ext = |op: &Option<Operand>| op.and_then(|o| o.extension()).is_some() as u16;
        1 + ext(&self.dst) + ext(&self.src)
    }

    /// Encode to one to three words.
    pub fn encode(&self) -> Vec<u16> {
        let code = |op: &Option<Operand>| op.map_or(CODE_NONE, |o| o.code()) as u16;
        let mut words = vec![
            self.opcode.code() as u16
                | code(&self.dst) << DST_SHIFT
                | code(&self.src) << SRC_SHIFT,
        ];
        words.extend(self.dst.and_then(|o| o.extension()));
        words.extend(self.src.and_then(|o| o.extension()));
        words
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.opcode)?;
        match (&self.dst, &self.src) {
            (Some(d), Some(s)) => write!(f, " {}, {}", d, s),
            (Some(o), None) | (None, Some(o)) => write!(f, " {}", o),
            (None, None) => Ok(()),
        }
    }
}

/// Decode the instruction whose first word is at offset 0 of `fetch`.
///
/// `fetch(n)` returns the word `n` words after the start of the
/// instruction. Decoding has no side effects.
pub fn decode_with(fetch: impl Fn(u16) -> u16) -> Result<Instruction, DecodeError> {
    let (code, dst_code, src_code) = split_word(fetch(0));
    let opcode = OPCODE_TABLE
        .lookup(code)
        .ok_or(DecodeError::InvalidOpcode(code))?;
    let shape = opcode.shape();
    let invalid = |error| DecodeError::InvalidOperand { opcode: code, error };

    let dst_mode = check_field(dst_code, shape.dst, Field::Destination).map_err(invalid)?;
    let src_mode = check_field(src_code, shape.src, Field::Source).map_err(invalid)?;

    let mut offset = 1;
    let mut complete = |mode: Option<Mode>| {
        mode.map(|m| {
            if m.needs_extension() {
                let word = fetch(offset);
                offset += 1;
                m.with_extension(word)
            } else {
                m.with_extension(0)
            }
        })
    };
    let dst = complete(dst_mode);
    let src = complete(src_mode);

    Ok(Instruction { opcode, dst, src })
}

/// Decode the instruction at `ip`, wrapping around the end of memory.
pub fn decode_at(mem: &Memory, ip: u16) -> Result<Instruction, DecodeError> {
    decode_with(|offset| mem.read(ip.wrapping_add(offset)))
}

/// Decode a single operand field against what the instruction expects.
fn check_field(code: u8, access: Access, field: Field) -> Result<Option<Mode>, OperandError> {
    let mode = Mode::from_code(code)?;
    match (access, mode) {
        (Access::Unused, None) => Ok(None),
        (Access::Unused, Some(_)) => Err(OperandError::Unexpected(field)),
        (_, None) => Err(OperandError::Missing(field)),
        (Access::Write, Some(Mode::Immediate)) => Err(OperandError::NotWritable(field)),
        (_, Some(m)) => Ok(Some(m)),
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),

    #[error("invalid operand for opcode {opcode}: {error}")]
    InvalidOperand { opcode: u8, error: OperandError },
}
