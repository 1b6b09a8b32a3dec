//! # sheetstream-core
//!
//! Core data structures for the sheetstream streaming spreadsheet engine.
//!
//! This crate provides the types shared by the readers and writers:
//! - [`CellValue`] - Values crossing the engine boundary (numbers, strings, booleans, dates, bytes)
//! - [`CellAddress`] and [`CellRange`] - The A1 address codec
//! - [`ColumnInfo`] - Column metadata for writing
//! - [`Row`] - One decoded worksheet row
//! - [`ReadOptions`], [`QueryOptions`], [`WriteOptions`] - Engine configuration
//!
//! ## Example
//!
//! ```rust
//! use sheetstream_core::{format_address, parse_address};
//!
//! assert_eq!(parse_address("C7").unwrap(), (2, 6));
//! assert_eq!(format_address(2, 6).unwrap(), "C7");
//! ```

pub mod cancel;
pub mod cell;
pub mod column;
pub mod date;
pub mod error;
pub mod number_format;
pub mod options;
pub mod row;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use cell::{format_address, parse_address, CellAddress, CellRange, CellValue};
pub use column::ColumnInfo;
pub use date::{datetime_to_serial, serial_to_datetime};
pub use error::{Error, Result};
pub use number_format::NumberFormat;
pub use options::{CompressionLevel, EntryMode, QueryOptions, ReadOptions, WriteOptions};
pub use row::Row;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u32 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
