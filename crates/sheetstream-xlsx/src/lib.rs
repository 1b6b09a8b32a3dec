//! # sheetstream-xlsx
//!
//! Streaming XLSX (Office Open XML) reader and writer for sheetstream.
//!
//! Worksheets are read row by row with a pull parser and written row by row into the zip
//! container, so neither side holds a whole sheet in memory.

pub mod error;
pub mod package;
pub mod reader;
pub mod shared_strings;
pub mod writer;

mod styles;
mod xml;

pub use error::{XlsxError, XlsxResult};
pub use package::assembler::{insert_sheet, try_insert_sheet};
pub use package::{PackageReader, PackageWriter, SheetRecord, SheetState, BINARY_SENTINEL};
pub use reader::{scan_dimension, scan_merges, DimensionResult, MergeRegistry, RowIter, XlsxDocument};
pub use shared_strings::SharedStrings;
pub use writer::{PatchSite, WorkbookWriter};
