//! CPU registers.
//!
//! The unit CPU has eight 16-bit general registers and an instruction
//! pointer:
//! - A, B, C, D: general purpose
//! - X, Y: general purpose, commonly used as index registers
//! - SP: stack pointer (the stack grows downward)
//! - BP: base pointer for stack frames
//! - ip: instruction pointer (not addressable by operands)

use serde::{Serialize, Deserialize};

/// Number of general registers.
pub const REGISTER_COUNT: usize = 8;

/// A general register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    A,
    B,
    C,
    D,
    X,
    Y,
    Sp,
    Bp,
}

impl Register {
    /// All registers in index order.
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::A,
        Register::B,
        Register::C,
        Register::D,
        Register::X,
        Register::Y,
        Register::Sp,
        Register::Bp,
    ];

    /// Look up a register by index (0-7).
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Index of this register in the register file.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Assembly name.
    pub fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::B => "B",
            Register::C => "C",
            Register::D => "D",
            Register::X => "X",
            Register::Y => "Y",
            Register::Sp => "SP",
            Register::Bp => "BP",
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General registers, indexed by `Register::index`.
    values: [u16; REGISTER_COUNT],

    /// Instruction pointer, always kept below the memory size.
    pub ip: u16,
}

impl Registers {
    /// Create a register file with everything zeroed except SP.
    pub fn new(stack_base: u16) -> Self {
        let mut regs = Self {
            values: [0; REGISTER_COUNT],
            ip: 0,
        };
        regs.set(Register::Sp, stack_base);
        regs
    }

    /// Reset all registers, leaving SP at the empty-stack position.
    pub fn reset(&mut self, stack_base: u16) {
        *self = Self::new(stack_base);
    }

    #[inline]
    pub fn get(&self, reg: Register) -> u16 {
        self.values[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: u16) {
        self.values[reg.index()] = value;
    }

    /// All general register values in index order.
    pub fn values(&self) -> [u16; REGISTER_COUNT] {
        self.values
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_index_roundtrip() {
        for (i, reg) in Register::ALL.iter().enumerate() {
            assert_eq!(reg.index(), i);
            assert_eq!(Register::from_index(i as u8), Some(*reg));
        }
        assert_eq!(Register::from_index(8), None);
    }

    #[test]
    fn test_new_sets_stack_pointer() {
        let regs = Registers::new(0xFFFF);
        assert_eq!(regs.get(Register::Sp), 0xFFFF);
        assert_eq!(regs.get(Register::A), 0);
        assert_eq!(regs.ip, 0);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new(100);
        regs.set(Register::X, 5);
        regs.set(Register::Sp, 90);
        regs.ip = 12;

        regs.reset(100);
        assert_eq!(regs, Registers::new(100));
    }
}
