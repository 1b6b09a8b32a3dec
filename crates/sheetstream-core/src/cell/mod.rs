//! Cell-related types and utilities
//!
//! This module contains:
//! - [`CellValue`] - The value carried by a cell
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A range of cells (e.g., "A1:B10")

mod address;
mod value;

pub use address::{format_address, parse_address, CellAddress, CellRange, CellRangeIterator};
pub use value::CellValue;
