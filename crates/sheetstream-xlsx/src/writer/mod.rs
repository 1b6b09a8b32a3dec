//! XLSX writer
//!
//! [`WorkbookWriter`] streams sheets one at a time into a new package; each sheet's rows
//! are pulled from the caller's iterator and never held as a whole.

mod encode;
mod patch;
mod worksheet;

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use log::debug;
use sheetstream_core::{CellValue, ColumnInfo, NumberFormat, WriteOptions, MAX_SHEET_NAME_LEN};

use crate::error::{XlsxError, XlsxResult};
use crate::package::assembler::finalize_new_package;
use crate::package::{PackageWriter, SheetRecord, SheetState};
use crate::styles::StylesBuilder;

pub use patch::PatchSite;

pub(crate) use worksheet::DRAWING_RID;
use encode::ColumnEncoding;
use worksheet::{write_worksheet, SheetLayout, SheetOutcome};

/// Characters Excel does not allow in sheet names
const FORBIDDEN_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Streaming writer for a new workbook
pub struct WorkbookWriter<W: Write + Seek> {
    package: PackageWriter<W>,
    options: WriteOptions,
    styles: StylesBuilder,
    sheets: Vec<SheetRecord>,
    has_binaries: bool,
}

impl WorkbookWriter<BufWriter<File>> {
    /// Create (or truncate) a file and write a workbook into it
    pub fn create_file<P: AsRef<Path>>(path: P, options: WriteOptions) -> XlsxResult<Self> {
        let file = BufWriter::new(File::create(path)?);
        Self::create(file, options)
    }
}

impl<W: Write + Seek> WorkbookWriter<W> {
    /// Start a workbook. Fails on option combinations that cannot work.
    pub fn create(writer: W, options: WriteOptions) -> XlsxResult<Self> {
        options.validate().map_err(XlsxError::InvalidOptions)?;
        let package = PackageWriter::create(writer, options.entry_mode, options.compression)
            .with_cancellation(options.cancellation.clone());
        Ok(Self {
            package,
            options,
            styles: StylesBuilder::new(),
            sheets: Vec::new(),
            has_binaries: false,
        })
    }

    /// Options the writer was created with
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Names of the sheets written so far
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Write a sheet from infallible rows; returns the number of data rows written
    pub fn add_sheet<I, R>(&mut self, name: &str, columns: &[ColumnInfo], rows: I) -> XlsxResult<u64>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = CellValue>,
    {
        self.try_add_sheet(name, columns, rows.into_iter().map(Ok::<R, XlsxError>))
    }

    /// Write a sheet from rows that may fail, such as rows decoded from another document.
    /// The first error aborts the sheet.
    pub fn try_add_sheet<I, R, E>(
        &mut self,
        name: &str,
        columns: &[ColumnInfo],
        rows: I,
    ) -> XlsxResult<u64>
    where
        I: IntoIterator<Item = Result<R, E>>,
        R: IntoIterator<Item = CellValue>,
        XlsxError: From<E>,
    {
        validate_sheet_name(name)?;
        if self
            .sheets
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(name))
        {
            return Err(XlsxError::SheetAlreadyExists(name.to_string()));
        }

        // A sheet that failed midway keeps its part name registered
        let mut number = self.sheets.len() as u32 + 1;
        while self.package.contains(&worksheet_part(number)) {
            number += 1;
        }
        let record = SheetRecord {
            name: name.to_string(),
            rid: format!("rId{}", self.sheets.len() + 1),
            sheet_id: number,
            state: SheetState::Visible,
            is_active: self.sheets.is_empty(),
            path: worksheet_part(number),
        };

        let layout = sheet_layout(name, number, columns, &mut self.styles, record.is_active);
        let outcome = write_sheet_entry(&mut self.package, &record.path, &layout, &self.options, rows)?;
        self.has_binaries |= !outcome.binaries.is_empty();
        self.sheets.push(record);
        Ok(outcome.rows_written)
    }

    /// Write the workbook-level parts and seal the package
    pub fn finish(mut self) -> XlsxResult<W> {
        if self.sheets.is_empty() {
            return Err(XlsxError::InvalidOptions(
                "a workbook needs at least one sheet".into(),
            ));
        }
        finalize_new_package(&mut self.package, &self.sheets, &self.styles, self.has_binaries)?;
        self.package.finish()
    }
}

fn worksheet_part(number: u32) -> String {
    format!("xl/worksheets/sheet{}.xml", number)
}

/// Excel's sheet name rules: 1 to 31 characters, none of `[]:*?/\`
pub(crate) fn validate_sheet_name(name: &str) -> XlsxResult<()> {
    if name.trim().is_empty() {
        return Err(XlsxError::InvalidOptions("sheet name is empty".into()));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(XlsxError::InvalidOptions(format!(
            "sheet name '{}' is longer than {} characters",
            name, MAX_SHEET_NAME_LEN
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(XlsxError::InvalidOptions(format!(
            "sheet name '{}' contains '{}'",
            name, c
        )));
    }
    Ok(())
}

/// Allocate the cell formats a sheet needs and fix its layout
pub(crate) fn sheet_layout<'a>(
    name: &'a str,
    sheet_number: u32,
    columns: &'a [ColumnInfo],
    styles: &mut StylesBuilder,
    tab_selected: bool,
) -> SheetLayout<'a> {
    let header_xf = styles.header_xf();
    let date_xf = styles.datetime_xf();
    let encodings = columns
        .iter()
        .map(|column| ColumnEncoding {
            custom_xf: column
                .number_format
                .as_ref()
                .filter(|f| **f != NumberFormat::General)
                .map(|f| styles.xf_for(f, false)),
            date_xf,
        })
        .collect();
    SheetLayout {
        name,
        sheet_number,
        columns,
        encodings,
        header_xf,
        tab_selected,
    }
}

/// Stream one worksheet into `path`, seal it, then write its binary parts
pub(crate) fn write_sheet_entry<W, I, R, E>(
    package: &mut PackageWriter<W>,
    path: &str,
    layout: &SheetLayout<'_>,
    options: &WriteOptions,
    rows: I,
) -> XlsxResult<SheetOutcome>
where
    W: Write + Seek,
    I: IntoIterator<Item = Result<R, E>>,
    R: IntoIterator<Item = CellValue>,
    XlsxError: From<E>,
{
    let mut entry = package.create_entry(path)?;
    let outcome = write_worksheet(&mut entry, layout, options, rows)?;
    let size = entry.seal()?;
    debug!(
        "sealed {} ({} bytes, {} rows, extent {})",
        path, size, outcome.rows_written, outcome.dimension
    );

    for (part, bytes) in &outcome.binaries {
        package.write_entry(part, bytes)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sheet_name_rules() {
        assert!(validate_sheet_name("Data").is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name("a/b").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
        assert!(validate_sheet_name(&"x".repeat(31)).is_ok());
    }

    #[test]
    fn test_duplicate_sheet_rejected() {
        let mut writer =
            WorkbookWriter::create(Cursor::new(Vec::new()), WriteOptions::default()).unwrap();
        let columns = [ColumnInfo::new("A")];
        writer
            .add_sheet("One", &columns, vec![vec![CellValue::from(1)]])
            .unwrap();
        let err = writer
            .add_sheet("one", &columns, Vec::<Vec<CellValue>>::new())
            .unwrap_err();
        assert!(matches!(err, XlsxError::SheetAlreadyExists(_)));
        assert_eq!(writer.sheet_names(), vec!["One"]);
    }

    #[test]
    fn test_invalid_options_rejected_up_front() {
        let options = WriteOptions {
            entry_mode: sheetstream_core::EntryMode::Streamed,
            auto_column_width: true,
            ..WriteOptions::default()
        };
        assert!(matches!(
            WorkbookWriter::create(Cursor::new(Vec::new()), options),
            Err(XlsxError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_failed_sheet_does_not_block_the_next() {
        let mut writer =
            WorkbookWriter::create(Cursor::new(Vec::new()), WriteOptions::default()).unwrap();
        let columns = [ColumnInfo::new("A")];
        let rows = vec![Ok(vec![CellValue::from(1)]), Err(XlsxError::Cancelled)];
        assert!(matches!(
            writer.try_add_sheet("Bad", &columns, rows),
            Err(XlsxError::Cancelled)
        ));
        assert!(writer.sheet_names().is_empty());

        writer
            .add_sheet("Good", &columns, vec![vec![CellValue::from(2)]])
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut doc =
            crate::XlsxDocument::from_bytes(bytes, sheetstream_core::ReadOptions::default())
                .unwrap();
        assert_eq!(doc.sheet_names(), vec!["Good"]);
        let rows: Vec<_> = doc
            .rows(None, &sheetstream_core::QueryOptions::with_header())
            .unwrap()
            .collect::<XlsxResult<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("A"), Some(&CellValue::from(2)));
    }

    #[test]
    fn test_empty_workbook_refused() {
        let writer =
            WorkbookWriter::create(Cursor::new(Vec::new()), WriteOptions::default()).unwrap();
        assert!(matches!(writer.finish(), Err(XlsxError::InvalidOptions(_))));
    }
}
