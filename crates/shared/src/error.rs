//! Error types for Nerbixa

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid price table entry: {0}")]
    InvalidPriceEntry(String),
}
