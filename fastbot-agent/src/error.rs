//! Recoverable failure kinds for reuse-model persistence. All of them
//! are logged and swallowed by the caller; a failed save or load never
//! corrupts the in-memory model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reuse model file exceeds the 100 MiB cap")]
    TooLarge,
    #[error("reuse model file is empty")]
    Empty,
    #[error("malformed reuse model encoding: {0}")]
    Malformed(String),
}
