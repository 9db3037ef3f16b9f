//! The opcode table: opcode number → instruction.
//!
//! Built once on first use from [`Opcode::ALL`] and never mutated.

use super::instruction::Opcode;
use lazy_static::lazy_static;

/// Number of slots addressable by the 6-bit opcode field.
pub const OPCODE_SLOTS: usize = 64;

/// Fixed mapping from opcode number to instruction.
pub struct OpcodeTable {
    slots: [Option<Opcode>; OPCODE_SLOTS],
}

impl OpcodeTable {
    fn build() -> Self {
        let mut slots = [None; OPCODE_SLOTS];
        for op in Opcode::ALL {
            let slot = &mut slots[op.code() as usize];
            debug_assert!(slot.is_none(), "opcode {} assigned twice", op.code());
            *slot = Some(op);
        }
        log::debug!("opcode table built with {} instructions", Opcode::ALL.len());
        Self { slots }
    }

    /// Instruction for an opcode number, `None` if unassigned.
    #[inline]
    pub fn lookup(&self, code: u8) -> Option<Opcode> {
        self.slots.get(code as usize).copied().flatten()
    }

    /// Assigned opcodes in numeric order.
    pub fn iter(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.slots.iter().filter_map(|slot| *slot)
    }
}

lazy_static! {
    /// The global opcode table.
    pub static ref OPCODE_TABLE: OpcodeTable = OpcodeTable::build();
}
