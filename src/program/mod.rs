//! Program images and disassembly.
//!
//! This module provides:
//! - The program image contract between the assembler and the CPU
//!   (words, load address, entry point, source-line map)
//! - JSON and raw binary image files
//! - A disassembler (words → readable text)

pub mod disasm;
pub mod image;

pub use disasm::{disassemble, disassemble_at};
pub use image::{load_image, save_image, ImageError, ProgramImage};
