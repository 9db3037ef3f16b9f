//! CPU and host configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below:
//!
//! ```json
//! {
//!     "memory_words": 65536,
//!     "stack_words": 2048,
//!     "tick_budget": 10000,
//!     "keyboard_capacity": 16,
//!     "console_capacity": 64,
//!     "console_line_len": 80
//! }
//! ```

use crate::cpu::instruction::StackBounds;
use crate::cpu::io::{DEFAULT_CONSOLE_CAPACITY, DEFAULT_KEYBOARD_CAPACITY};
use crate::cpu::memory::{DEFAULT_MEMORY_WORDS, MAX_MEMORY_WORDS};
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Tunables for one CPU and the tick loop driving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CpuConfig {
    /// Memory size in words (1..=65536).
    pub memory_words: usize,
    /// Words reserved for the stack at the top of memory.
    pub stack_words: usize,
    /// Instructions each CPU may execute per tick.
    pub tick_budget: u32,
    /// Pending keypresses kept per unit.
    pub keyboard_capacity: usize,
    /// Console lines kept per unit between drains.
    pub console_capacity: usize,
    /// Longest console line `out` produces, in characters.
    pub console_line_len: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            memory_words: DEFAULT_MEMORY_WORDS,
            stack_words: 0x800,
            tick_budget: 10_000,
            keyboard_capacity: DEFAULT_KEYBOARD_CAPACITY,
            console_capacity: DEFAULT_CONSOLE_CAPACITY,
            console_line_len: 80,
        }
    }
}

impl CpuConfig {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: CpuConfig = serde_json::from_str(text)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_words == 0 || self.memory_words > MAX_MEMORY_WORDS {
            return Err(ConfigError::Invalid(format!(
                "memory_words must be between 1 and {}, got {}",
                MAX_MEMORY_WORDS, self.memory_words
            )));
        }
        if self.stack_words >= self.memory_words {
            return Err(ConfigError::Invalid(format!(
                "stack_words ({}) must be smaller than memory_words ({})",
                self.stack_words, self.memory_words
            )));
        }
        if self.console_line_len == 0 {
            return Err(ConfigError::Invalid("console_line_len must be at least 1".into()));
        }
        // OUT never reads more words than memory holds
        if self.console_line_len > self.memory_words {
            return Err(ConfigError::Invalid(format!(
                "console_line_len ({}) must not exceed memory_words ({})",
                self.console_line_len, self.memory_words
            )));
        }
        Ok(())
    }

    /// Stack region at the top of memory.
    ///
    /// SP starts at `base` (empty stack) and may go down to `limit`.
    pub fn stack_bounds(&self) -> StackBounds {
        let base = self.memory_words.min(u16::MAX as usize);
        let limit = base.saturating_sub(self.stack_words);
        StackBounds {
            base: base as u16,
            limit: limit as u16,
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CpuConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stack_bounds(), StackBounds { base: 0xFFFF, limit: 0xF7FF });
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CpuConfig::from_json(
            r#"{ "memory_words": 1024, "stack_words": 256, "tick_budget": 50 }"#,
        )
        .unwrap();
        assert_eq!(config.memory_words, 1024);
        assert_eq!(config.tick_budget, 50);
        assert_eq!(config.keyboard_capacity, DEFAULT_KEYBOARD_CAPACITY);
        assert_eq!(config.stack_bounds(), StackBounds { base: 1024, limit: 768 });
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            CpuConfig::from_json(r#"{ "memroy_words": 10 }"#),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            CpuConfig::from_json(r#"{ "memory_words": 0, "stack_words": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CpuConfig::from_json(r#"{ "memory_words": 70000 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CpuConfig::from_json(r#"{ "memory_words": 256, "stack_words": 256 }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_console_line_len_bounded_by_memory() {
        assert!(matches!(
            CpuConfig::from_json(r#"{ "memory_words": 256, "stack_words": 16, "console_line_len": 300 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CpuConfig::from_json(r#"{ "memory_words": 256, "stack_words": 16, "console_line_len": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        let config = CpuConfig::from_json(
            r#"{ "memory_words": 256, "stack_words": 16, "console_line_len": 256 }"#,
        )
        .unwrap();
        assert_eq!(config.console_line_len, 256);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            CpuConfig::load("/nonexistent/cubot.json"),
            Err(ConfigError::IoError(_))
        ));
    }
}
