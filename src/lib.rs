//! # Cubot VM
//!
//! The 16-bit CPU that runs inside every player unit.
//!
//! Each unit executes a small assembly program its player wrote. The game
//! server owns one [`host::Host`] per world; every game tick it applies the
//! commands queued since the last tick (debugger requests, keypresses,
//! reloads) and then runs each unit's CPU for a fixed instruction budget.

pub mod config;
pub mod cpu;
pub mod host;
pub mod program;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use config::{ConfigError, CpuConfig};
pub use cpu::{Cpu, CpuState, Fault, FaultKind, Instruction, Memory, Registers, Snapshot, UnitCommand};
pub use host::{CommandSender, Host, HostError, LoadError, UnitId};
pub use program::{disassemble, load_image, save_image, ImageError, ProgramImage};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
