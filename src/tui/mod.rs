//! TUI debugger for a single unit CPU.
//!
//! Provides an interactive terminal-based debugger with:
//! - Registers, flags, run state and fault
//! - Memory view
//! - Step/run/pause/breakpoint controls
//! - Disassembly view with source lines
//! - The unit's console, and keyboard input

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
