//! Emulator configuration.
//!
//! Defaults match a PC boot sector: 1 MiB of memory, the image loaded at
//! 0x7C00 and the stack growing down from the same address. A JSON file can
//! override any subset of fields; the CLI applies its flags on top.

use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::cpu::MEMORY_SIZE;

/// Conventional boot sector load address.
pub const BOOT_LOAD_ADDRESS: u32 = 0x7C00;

/// Size of a boot sector.
pub const BOOT_SECTOR_SIZE: usize = 512;

/// Machine layout and run options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Bytes of emulated memory.
    pub memory_size: usize,
    /// Where the image is placed and where EIP starts.
    pub load_address: u32,
    /// Initial ESP.
    pub stack_pointer: u32,
    /// Maximum number of image bytes read from disk.
    pub image_limit: usize,
    /// Print a trace line before each instruction.
    pub trace: bool,
    /// Stop after this many instructions.
    pub max_steps: Option<u64>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            memory_size: MEMORY_SIZE,
            load_address: BOOT_LOAD_ADDRESS,
            stack_pointer: BOOT_LOAD_ADDRESS,
            image_limit: BOOT_SECTOR_SIZE,
            trace: true,
            max_steps: None,
        }
    }
}

impl EmulatorConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Check that the layout fits in memory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 || self.memory_size > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "memory size {:#x} must be between 1 and 4 GiB",
                self.memory_size
            )));
        }

        let load_end = (self.load_address as usize).checked_add(self.image_limit);
        if load_end.map_or(true, |end| end > self.memory_size) {
            return Err(ConfigError::Invalid(format!(
                "image at {:#x} with limit {} does not fit in {:#x} bytes",
                self.load_address, self.image_limit, self.memory_size
            )));
        }

        if self.stack_pointer as usize > self.memory_size {
            return Err(ConfigError::Invalid(format!(
                "stack pointer {:#x} is outside {:#x} bytes of memory",
                self.stack_pointer, self.memory_size
            )));
        }

        Ok(())
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmulatorConfig::default();
        assert_eq!(config.memory_size, 1_048_576);
        assert_eq!(config.load_address, 0x7C00);
        assert_eq!(config.stack_pointer, 0x7C00);
        assert_eq!(config.image_limit, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = EmulatorConfig::from_json(r#"{ "stack_pointer": 32768, "trace": false }"#).unwrap();
        assert_eq!(config.stack_pointer, 0x8000);
        assert!(!config.trace);
        assert_eq!(config.load_address, BOOT_LOAD_ADDRESS);
    }

    #[test]
    fn test_rejects_layout_outside_memory() {
        let result = EmulatorConfig::from_json(r#"{ "memory_size": 4096 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = EmulatorConfig::from_json(r#"{ "memory_size": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_overflowing_image_limit() {
        let result = EmulatorConfig::from_json(r#"{ "image_limit": 18446744073709551615 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(
            EmulatorConfig::from_json("{ memory_size: }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
