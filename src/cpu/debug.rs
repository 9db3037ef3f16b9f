//! Debug bridge.
//!
//! Everything an attached debugger needs from a CPU: a serializable
//! snapshot, source-line lookup, and the command set the debugger (or the
//! game server) submits between ticks.

use super::execute::{ControlError, Cpu, CpuState, Fault};
use super::io::UnitBuffers;
use super::memory::MemoryError;
use super::registers::REGISTER_COUNT;
use super::status::Status;
use crate::program::ProgramImage;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Point-in-time view of a CPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: CpuState,
    /// `A B C D X Y SP BP`, in index order.
    pub registers: [u16; REGISTER_COUNT],
    pub ip: u16,
    pub status: Status,
    pub fault: Option<Fault>,
    /// Instructions executed since the last reset.
    pub cycles: u64,
    /// Source line of the instruction at `ip`.
    pub line: Option<u32>,
}

impl Cpu {
    /// Capture registers, flags, run state and fault.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state(),
            registers: self.regs.values(),
            ip: self.regs.ip,
            status: self.status,
            fault: self.fault(),
            cycles: self.cycles,
            line: self.source_line(self.regs.ip),
        }
    }

    /// Source line of the instruction at `ip`, if the image recorded one.
    pub fn source_line(&self, ip: u16) -> Option<u32> {
        self.image().and_then(|image| image.source_line(ip))
    }
}

/// A request submitted to a unit from outside the tick loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitCommand {
    Pause,
    Resume,
    Step,
    Reset,
    Reload(ProgramImage),
    /// Keypress for the unit's keyboard queue.
    Key(u16),
}

impl UnitCommand {
    /// Apply the command to a CPU and its I/O buffers.
    ///
    /// `Reset` and `Reload` both start the unit over with empty buffers.
    pub fn apply(self, cpu: &mut Cpu, io: &mut UnitBuffers) -> Result<(), CommandError> {
        match self {
            UnitCommand::Pause => cpu.pause()?,
            UnitCommand::Resume => cpu.resume()?,
            UnitCommand::Step => {
                cpu.step(io)?;
            }
            UnitCommand::Reset => {
                cpu.reset();
                io.clear();
            }
            UnitCommand::Reload(image) => {
                cpu.load(image)?;
                io.clear();
            }
            UnitCommand::Key(key) => {
                if !io.push_key(key) {
                    return Err(CommandError::KeyboardFull);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for UnitCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitCommand::Pause => write!(f, "pause"),
            UnitCommand::Resume => write!(f, "resume"),
            UnitCommand::Step => write!(f, "step"),
            UnitCommand::Reset => write!(f, "reset"),
            UnitCommand::Reload(image) => write!(f, "reload ({} words)", image.len()),
            UnitCommand::Key(key) => write!(f, "key 0x{:04X}", key),
        }
    }
}

/// Why a command could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Load(#[from] MemoryError),

    #[error("keyboard queue is full")]
    KeyboardFull,
}
