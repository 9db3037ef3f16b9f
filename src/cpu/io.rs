//! Unit I/O: the only state the CPU shares with the unit that owns it.
//!
//! The CPU sees its unit through [`UnitIo`], a two-method interface: pull
//! one buffered keypress, push one console line. [`UnitBuffers`] is the
//! in-memory implementation drained by the presentation layer between
//! ticks.

use std::collections::VecDeque;

/// Default keyboard queue capacity.
pub const DEFAULT_KEYBOARD_CAPACITY: usize = 16;

/// Default number of console lines kept between drains.
pub const DEFAULT_CONSOLE_CAPACITY: usize = 64;

/// The CPU's view of its controlling unit.
pub trait UnitIo {
    /// Take the oldest pending keypress.
    fn read_key(&mut self) -> Option<u16>;

    /// Append one line to the console output.
    fn write_line(&mut self, line: String);
}

/// Bounded keyboard queue and capped console queue.
#[derive(Debug, Clone)]
pub struct UnitBuffers {
    keys: VecDeque<u16>,
    key_capacity: usize,
    console: VecDeque<String>,
    console_capacity: usize,
    dropped_lines: u64,
}

impl UnitBuffers {
    pub fn new(key_capacity: usize, console_capacity: usize) -> Self {
        Self {
            keys: VecDeque::with_capacity(key_capacity),
            key_capacity,
            console: VecDeque::with_capacity(console_capacity),
            console_capacity,
            dropped_lines: 0,
        }
    }

    /// Queue a keypress. Returns `false` if the queue is full.
    pub fn push_key(&mut self, key: u16) -> bool {
        if self.keys.len() >= self.key_capacity {
            return false;
        }
        self.keys.push_back(key);
        true
    }

    /// Number of keypresses waiting.
    pub fn pending_keys(&self) -> usize {
        self.keys.len()
    }

    /// Take every console line written since the last drain.
    pub fn drain_console(&mut self) -> Vec<String> {
        self.console.drain(..).collect()
    }

    /// Console lines discarded because the queue was full.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }

    /// Forget all pending input and output, and the dropped-line count.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.console.clear();
        self.dropped_lines = 0;
    }
}

impl Default for UnitBuffers {
    fn default() -> Self {
        Self::new(DEFAULT_KEYBOARD_CAPACITY, DEFAULT_CONSOLE_CAPACITY)
    }
}

impl UnitIo for UnitBuffers {
    fn read_key(&mut self) -> Option<u16> {
        self.keys.pop_front()
    }

    fn write_line(&mut self, line: String) {
        if self.console_capacity == 0 {
            self.dropped_lines += 1;
            return;
        }
        if self.console.len() >= self.console_capacity {
            // Oldest line goes first
            self.console.pop_front();
            self.dropped_lines += 1;
            log::warn!("console full, dropped oldest line ({} dropped so far)", self.dropped_lines);
        }
        self.console.push_back(line);
    }
}
