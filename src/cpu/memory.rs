//! Unit memory subsystem.
//!
//! Each CPU owns a flat array of 16-bit words. The address space wraps:
//! every address is reduced modulo the memory size, so pointer arithmetic
//! is total and no address is ever rejected.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Default number of words: the full 16-bit address space.
pub const DEFAULT_MEMORY_WORDS: usize = 0x1_0000;

/// Largest memory a CPU can address with a 16-bit pointer.
pub const MAX_MEMORY_WORDS: usize = 0x1_0000;

/// Word-addressable memory owned by a single CPU.
///
/// Serialized as the bare array of cells. Deserializing checks the size
/// the same way `new` clamps it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<u16>", into = "Vec<u16>")]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a zeroed memory of `words` cells.
    ///
    /// The size is clamped to `1..=MAX_MEMORY_WORDS`; configuration
    /// validation rejects anything outside that range before it gets here.
    pub fn new(words: usize) -> Self {
        let words = words.clamp(1, MAX_MEMORY_WORDS);
        Self {
            cells: vec![0; words],
        }
    }

    /// Number of words.
    #[inline]
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Reduce an address into range.
    #[inline]
    pub fn wrap(&self, addr: usize) -> usize {
        addr % self.cells.len()
    }

    /// Read the word at `addr` (modulo the memory size).
    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        self.cells[self.wrap(addr as usize)]
    }

    /// Write the word at `addr` (modulo the memory size).
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        let index = self.wrap(addr as usize);
        self.cells[index] = value;
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Copy a program image into memory starting at `origin`.
    ///
    /// Writes wrap around the end of memory like any other access. An
    /// image longer than the memory would overwrite itself and is refused.
    pub fn load(&mut self, origin: u16, words: &[u16]) -> Result<(), MemoryError> {
        if words.len() > self.cells.len() {
            return Err(MemoryError::ProgramTooLarge {
                size: words.len(),
                available: self.cells.len(),
            });
        }

        let start = origin as usize;
        for (i, &word) in words.iter().enumerate() {
            let index = self.wrap(start + i);
            self.cells[index] = word;
        }

        Ok(())
    }

    /// Dump `count` words starting at `start`, wrapping at the end.
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        let count = count.min(self.cells.len());
        (0..count)
            .map(|i| {
                let index = self.wrap(start as usize + i);
                (index as u16, self.cells[index])
            })
            .collect()
    }
}

impl TryFrom<Vec<u16>> for Memory {
    type Error = MemoryError;

    fn try_from(cells: Vec<u16>) -> Result<Self, Self::Error> {
        if cells.is_empty() || cells.len() > MAX_MEMORY_WORDS {
            return Err(MemoryError::InvalidSize(cells.len()));
        }
        Ok(Self { cells })
    }
}

impl From<Memory> for Vec<u16> {
    fn from(mem: Memory) -> Self {
        mem.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WORDS)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur while loading memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds memory size {available}")]
    ProgramTooLarge { size: usize, available: usize },

    /// Memory must hold between 1 and `MAX_MEMORY_WORDS` words.
    #[error("memory size {0} is outside 1..=65536")]
    InvalidSize(usize),
}
