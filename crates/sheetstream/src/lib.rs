//! # sheetstream
//!
//! Read and write XLSX workbooks too large to hold in memory.
//!
//! Rows are pulled from a worksheet one at a time and pushed into a new one the same way.
//! A sheet can also be added to (or replaced in) an existing workbook without touching the
//! rest of the package.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sheetstream::prelude::*;
//!
//! # fn main() -> XlsxResult<()> {
//! let columns = [ColumnInfo::new("Name"), ColumnInfo::new("Age")];
//! let rows = vec![
//!     vec![CellValue::from("Jack"), CellValue::from(25)],
//!     vec![CellValue::from("Mike"), CellValue::from(44)],
//! ];
//! sheetstream::write_sheet("people.xlsx", "People", &columns, rows, WriteOptions::default())?;
//!
//! let mut doc = XlsxDocument::open_path("people.xlsx", ReadOptions::default())?;
//! for row in doc.rows(None, &QueryOptions::with_header())? {
//!     let row = row?;
//!     println!("{:?} is {:?}", row.get("Name"), row.get("Age"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod prelude;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;

// Re-export core types
pub use sheetstream_core::{
    datetime_to_serial, format_address, parse_address, serial_to_datetime, CancellationToken,
    CellAddress, CellRange, CellValue, ColumnInfo, CompressionLevel, EntryMode, Error,
    NumberFormat, QueryOptions, ReadOptions, Result, Row, WriteOptions, MAX_COLS, MAX_ROWS,
    MAX_SHEET_NAME_LEN,
};

// Re-export I/O types
pub use sheetstream_xlsx::{
    insert_sheet, try_insert_sheet, DimensionResult, MergeRegistry, PatchSite, RowIter,
    SheetRecord, SheetState, WorkbookWriter, XlsxDocument, XlsxError, XlsxResult,
};

/// Call `f` for every row of a sheet (the first sheet when `sheet` is `None`)
///
/// Returns the number of rows visited. An error from the reader or from `f` stops the walk.
pub fn for_each_row<P, F>(
    path: P,
    sheet: Option<&str>,
    options: ReadOptions,
    query: &QueryOptions,
    mut f: F,
) -> XlsxResult<u64>
where
    P: AsRef<Path>,
    F: FnMut(Row) -> XlsxResult<()>,
{
    let mut doc = XlsxDocument::open_path(path, options)?;
    let mut count = 0;
    for row in doc.rows(sheet, query)? {
        f(row?)?;
        count += 1;
    }
    Ok(count)
}

/// Write a single-sheet workbook to `path`, returning the number of data rows written
pub fn write_sheet<P, I, R>(
    path: P,
    name: &str,
    columns: &[ColumnInfo],
    rows: I,
    options: WriteOptions,
) -> XlsxResult<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = CellValue>,
{
    let mut writer = WorkbookWriter::create_file(path, options)?;
    let written = writer.add_sheet(name, columns, rows)?;
    writer.finish()?;
    Ok(written)
}

/// Add sheet `name` to the workbook at `path`, or replace it when `overwrite` is set
///
/// The new package is written to a temporary file next to `path` and moved over it once
/// complete, so a failure leaves the original untouched.
pub fn insert_sheet_file<P, I, R>(
    path: P,
    name: &str,
    columns: &[ColumnInfo],
    rows: I,
    overwrite: bool,
    options: &WriteOptions,
) -> XlsxResult<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = CellValue>,
{
    try_insert_sheet_file(
        path,
        name,
        columns,
        rows.into_iter().map(Ok::<R, XlsxError>),
        overwrite,
        options,
    )
}

/// [`insert_sheet_file`] for rows that may fail
pub fn try_insert_sheet_file<P, I, R, E>(
    path: P,
    name: &str,
    columns: &[ColumnInfo],
    rows: I,
    overwrite: bool,
    options: &WriteOptions,
) -> XlsxResult<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = std::result::Result<R, E>>,
    R: IntoIterator<Item = CellValue>,
    XlsxError: From<E>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;

    let input = BufReader::new(File::open(path)?);
    let output = BufWriter::new(temp.as_file_mut());
    let (output, written) =
        try_insert_sheet(input, output, name, columns, rows, overwrite, options)?;
    output.into_inner().map_err(|e| e.into_error())?;

    temp.persist(path).map_err(|e| XlsxError::Io(e.error))?;
    debug!("updated {} with sheet '{}'", path.display(), name);
    Ok(written)
}
