//! Prelude module - common imports for sheetstream users
//!
//! ```rust
//! use sheetstream::prelude::*;
//! ```

pub use crate::{
    // Cell types
    CellAddress,
    CellRange,
    CellValue,
    ColumnInfo,
    NumberFormat,
    Row,

    // Options
    EntryMode,
    QueryOptions,
    ReadOptions,
    WriteOptions,

    // I/O types
    WorkbookWriter,
    XlsxDocument,
    XlsxError,
    XlsxResult,
};
