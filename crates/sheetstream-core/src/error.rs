//! Error types for sheetstream-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sheetstream-core
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid cell address format
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Invalid cell range format
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// Address outside the worksheet grid
    #[error("Address out of range: column {col} (max {max_col}), row {row} (max {max_row})")]
    AddressRange {
        col: u32,
        row: u32,
        max_col: u32,
        max_row: u32,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    pub(crate) fn out_of_range(col: u32, row: u32) -> Self {
        Error::AddressRange {
            col,
            row,
            max_col: crate::MAX_COLS - 1,
            max_row: crate::MAX_ROWS - 1,
        }
    }
}
