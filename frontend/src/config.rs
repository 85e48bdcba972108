use std::env;

use bfjit_backend::x86_64::regs::STACK_ALIGN;
use thiserror::Error;

/// Default size of the working region, in bytes.
pub const DEFAULT_TAPE_SIZE: usize = 30_000;

/// Upper bound for the working region. It lives on the native stack of
/// the thread running the program.
pub const MAX_TAPE_SIZE: usize = 1 << 20;

/// Environment variable overriding the working region size.
pub const TAPE_SIZE_ENV: &str = "BFJIT_TAPE_SIZE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: expected a byte count, got {value:?}")]
    NotANumber { key: &'static str, value: String },

    #[error("tape size {size} out of range (1..={max})")]
    TapeSize { size: usize, max: usize },
}

/// Translation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorConfig {
    /// Working region size in bytes; always a multiple of `STACK_ALIGN`.
    tape_size: usize,
}

impl TranslatorConfig {
    /// Validate `size` and round it up to the stack alignment.
    pub fn with_tape_size(size: usize) -> Result<Self, ConfigError> {
        if size == 0 || size > MAX_TAPE_SIZE {
            return Err(ConfigError::TapeSize {
                size,
                max: MAX_TAPE_SIZE,
            });
        }
        Ok(Self {
            tape_size: (size + STACK_ALIGN - 1) & !(STACK_ALIGN - 1),
        })
    }

    /// Read the configuration from the environment, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(TAPE_SIZE_ENV) {
            Ok(value) => {
                let size = value.trim().parse().map_err(|_| ConfigError::NotANumber {
                    key: TAPE_SIZE_ENV,
                    value: value.clone(),
                })?;
                Self::with_tape_size(size)
            }
            Err(_) => Ok(Self::default()),
        }
    }

    #[inline]
    pub fn tape_size(&self) -> usize {
        self.tape_size
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            tape_size: (DEFAULT_TAPE_SIZE + STACK_ALIGN - 1) & !(STACK_ALIGN - 1),
        }
    }
}
