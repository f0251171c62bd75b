//! Error taxonomy (spec §7): a parse failure becomes a single
//! `uncaught_exception` trace entry; an internal invariant violation is
//! fatal. `anyhow` is used only at the CLI boundary (`main.rs`), matching
//! the teacher's own split between typed library errors and an
//! `anyhow::Result` at the edge.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message} at {line}:{col}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum TracerError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}
