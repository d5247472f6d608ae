//! Recoverable error kinds for loading the opaque configuration sources.
//! Every variant is caught at the call site and logged; no config error
//! is allowed to abort loading the remaining files.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source unreadable: {0}")]
    Unreadable(String),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
}
