// Error types for the fallible edges of the simulation: config parsing and
// genome persistence.
//
// The tick itself has no recoverable errors. Expected conditions inside the
// VM are opcode fallback jumps, and broken internal invariants panic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("genome cell {index} is not an integer: {text:?}")]
    InvalidCell { index: usize, text: String },

    #[error("genome has {found} cells, expected {expected}")]
    WrongLength { expected: usize, found: usize },

    #[error("genome file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
