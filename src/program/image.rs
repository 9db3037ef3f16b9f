//! Program images.
//!
//! A program image is what the assembler hands to the CPU: the words to
//! place in memory, where to place them, where to start, and which source
//! line each instruction came from. Two on-disk forms are supported:
//!
//! - JSON (`.json`), carrying everything including the line map:
//!
//!   ```json
//!   { "origin": 0, "entry": 0, "words": [1985, 5, 0], "lines": { "0": 3, "2": 4 } }
//!   ```
//!
//! - raw binary (`.bin`): little-endian words loaded at address 0, with no
//!   line map.

use crate::cpu::decode::Instruction;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// A compiled program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage {
    /// Address of the first word.
    #[serde(default)]
    pub origin: u16,
    /// Initial instruction pointer.
    #[serde(default)]
    pub entry: u16,
    /// Encoded program.
    pub words: Vec<u16>,
    /// Instruction address → source line.
    #[serde(default)]
    pub lines: BTreeMap<u16, u32>,
}

impl ProgramImage {
    /// Build an image at address 0 from decoded instructions, numbering
    /// source lines from 1 in order.
    pub fn from_instructions(program: &[Instruction]) -> Self {
        let mut image = ProgramImage::default();
        for (i, instr) in program.iter().enumerate() {
            image.lines.insert(image.words.len() as u16, i as u32 + 1);
            image.words.extend(instr.encode());
        }
        image
    }

    /// Source line of the instruction at `ip`, if the assembler recorded one.
    pub fn source_line(&self, ip: u16) -> Option<u32> {
        self.lines.get(&ip).copied()
    }

    /// Parse a raw little-endian image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() % 2 != 0 {
            return Err(ImageError::OddLength(bytes.len()));
        }
        let words = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { words, ..Self::default() })
    }

    /// Serialize as raw little-endian words.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Load an image from disk, choosing the format by extension.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let path = path.as_ref();
    if is_binary(path) {
        let bytes = std::fs::read(path).map_err(|e| ImageError::IoError(e.to_string()))?;
        return ProgramImage::from_bytes(&bytes);
    }

    let text = std::fs::read_to_string(path).map_err(|e| ImageError::IoError(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| ImageError::ParseError(e.to_string()))
}

/// Save an image to disk, choosing the format by extension.
///
/// The binary format drops the origin, entry point and line map.
pub fn save_image<P: AsRef<Path>>(path: P, image: &ProgramImage) -> Result<(), ImageError> {
    let path = path.as_ref();
    let bytes = if is_binary(path) {
        image.to_bytes()
    } else {
        serde_json::to_vec_pretty(image).map_err(|e| ImageError::ParseError(e.to_string()))?
    };
    std::fs::write(path, bytes).map_err(|e| ImageError::IoError(e.to_string()))
}

fn is_binary(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "bin")
}

/// Errors that can occur while loading or saving images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("binary image has odd length {0}")]
    OddLength(usize),
}
