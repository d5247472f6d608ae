//! Error taxonomy for UI-tree parsing. Every variant here is
//! recovered by its caller — `Model::step` never lets one escape to the
//! driver — but within this crate parse failures are still ordinary
//! `Result`s so tests can assert on them directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML snapshot: {0}")]
    Xml(String),
    #[error("malformed binary snapshot: {0}")]
    Binary(String),
    #[error("unrecognized snapshot magic bytes")]
    BadMagic,
    #[error("unexpected end of input at offset {0}")]
    Truncated(usize),
}

/// Tree parsed but the root element carried no bounds. Logged by the
/// caller; root bounds are simply left at `Rect::default()` and the step
/// continues.
#[derive(Debug, Error)]
#[error("parsed tree has no root bounds")]
pub struct EmptyTreeError;
