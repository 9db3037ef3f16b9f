//! CPU emulation for a unit.
//!
//! This module implements the complete unit CPU:
//! - W words of 16-bit memory, addresses taken modulo W
//! - 8 general registers: A, B, C, D, X, Y, SP, BP (plus ip)
//! - 42-instruction set with register, indirect, indexed, direct and
//!   immediate operands
//! - zero/sign/carry/overflow flags with two's-complement semantics

pub mod alu;
pub mod debug;
pub mod decode;
pub mod execute;
pub mod instruction;
pub mod io;
pub mod memory;
pub mod operand;
pub mod registers;
pub mod status;
pub mod table;

pub use debug::{CommandError, Snapshot, UnitCommand};
pub use decode::{DecodeError, Instruction};
pub use execute::{ControlError, Cpu, CpuState, Fault, RunReport};
pub use instruction::{FaultKind, Opcode, StackBounds};
pub use io::{UnitBuffers, UnitIo};
pub use memory::{Memory, MemoryError};
pub use operand::{Operand, OperandError};
pub use registers::{Register, Registers};
pub use status::{Condition, Status};
