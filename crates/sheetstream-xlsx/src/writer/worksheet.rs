//! Worksheet XML emission
//!
//! The sheet is written front to back in a single pass. Two things are not known until the
//! last row has gone by when the row count is unknown: the `<dimension>` reference and,
//! with auto-sized columns, the `<cols>` widths. Both get a [`PatchSite`] reserved at their
//! place in the document and are overwritten before the entry is sealed.

use log::{debug, warn};
use sheetstream_core::{format_address, CellAddress, CellValue, ColumnInfo, EntryMode, WriteOptions};

use crate::error::{XlsxError, XlsxResult};
use crate::package::EntryOutput;
use crate::writer::encode::{display_width, encode_value, BinaryParts, ColumnEncoding, CellOutputUnit};
use crate::writer::patch::PatchSite;
use crate::xml::{NS_MAIN, NS_RELATIONSHIPS, XML_DECLARATION};

/// Relationship id of the drawing part, from the sheet's own relationships part
pub(crate) const DRAWING_RID: &str = "rId1";

/// Widest width attribute a column can get
const WIDEST_COLUMN: f64 = 255.0;

/// Everything about a sheet that is fixed before its rows are written
#[derive(Debug)]
pub(crate) struct SheetLayout<'a> {
    pub name: &'a str,
    pub sheet_number: u32,
    pub columns: &'a [ColumnInfo],
    pub encodings: Vec<ColumnEncoding>,
    pub header_xf: u32,
    pub tab_selected: bool,
}

/// What a finished sheet produced
#[derive(Debug)]
pub(crate) struct SheetOutcome {
    /// Data rows, header excluded
    pub rows_written: u64,
    /// Binary parts referenced by sentinel cells
    pub binaries: Vec<(String, Vec<u8>)>,
    /// The written extent, e.g. `A1:C11`
    pub dimension: String,
}

/// Running maximum display width per column
#[derive(Debug)]
struct ColumnWidthAccumulator {
    widths: Vec<f64>,
}

impl ColumnWidthAccumulator {
    fn new(columns: usize) -> Self {
        Self {
            widths: vec![0.0; columns],
        }
    }

    fn observe(&mut self, col: usize, width: f64) {
        if let Some(w) = self.widths.get_mut(col) {
            if width > *w {
                *w = width;
            }
        }
    }

    fn width(&self, col: usize, min: f64, max: f64) -> f64 {
        self.widths.get(col).copied().unwrap_or(0.0).clamp(min, max)
    }
}

/// Write a complete worksheet into `out`
pub(crate) fn write_worksheet<O, I, R, E>(
    out: &mut O,
    layout: &SheetLayout<'_>,
    options: &WriteOptions,
    rows: I,
) -> XlsxResult<SheetOutcome>
where
    O: EntryOutput + ?Sized,
    I: IntoIterator<Item = Result<R, E>>,
    R: IntoIterator<Item = CellValue>,
    XlsxError: From<E>,
{
    if layout.columns.is_empty() {
        return Err(XlsxError::InvalidOptions(format!(
            "sheet '{}' has no columns",
            layout.name
        )));
    }
    let column_count = layout.columns.len();
    let last_col = (column_count - 1) as u32;
    let header_rows: u64 = if options.write_header { 1 } else { 0 };

    let rows = rows.into_iter();
    let known_rows = match rows.size_hint() {
        (lower, Some(upper)) if lower == upper => Some(lower as u64),
        _ => None,
    };

    write!(
        out,
        "{}\n<worksheet xmlns=\"{}\" xmlns:r=\"{}\">",
        XML_DECLARATION, NS_MAIN, NS_RELATIONSHIPS
    )?;

    // Dimension: exact when the row count is known up front, patched otherwise
    let dimension_site = match known_rows {
        Some(count) => {
            let reference = dimension_ref(last_col, count + header_rows)?;
            write!(out, "<dimension ref=\"{}\"/>", reference)?;
            None
        }
        None if options.entry_mode == EntryMode::Patchable => {
            let widest = dimension_element(&format!(
                "A1:{}",
                CellAddress::new(sheetstream_core::MAX_ROWS - 1, sheetstream_core::MAX_COLS - 1)
            ));
            Some(PatchSite::reserve(out, widest.len())?)
        }
        None => None,
    };

    write_sheet_views(out, layout.tab_selected, options)?;
    out.write_all(b"<sheetFormatPr defaultRowHeight=\"15\"/>")?;

    let cols_site = if options.auto_column_width {
        let worst = cols_element(layout.columns, |_| Some(WIDEST_COLUMN), true);
        Some(PatchSite::reserve(out, worst.len())?)
    } else {
        if layout.columns.iter().any(ColumnInfo::has_custom_settings) {
            out.write_all(cols_element(layout.columns, |i| layout.columns[i].width, false).as_bytes())?;
        }
        None
    };

    let mut widths = ColumnWidthAccumulator::new(column_count);
    let mut binaries = BinaryParts::new(layout.sheet_number);
    let cancellation = options.cancellation.as_ref();
    let check_cancelled = || match cancellation {
        Some(token) if token.is_cancelled() => Err(XlsxError::Cancelled),
        _ => Ok(()),
    };

    out.write_all(b"<sheetData>")?;

    if options.write_header {
        out.write_all(b"<row r=\"1\">")?;
        for (i, column) in layout.columns.iter().enumerate() {
            let header = CellValue::string(column.header.as_str());
            widths.observe(i, display_width(&header));
            let unit = CellOutputUnit::text(&column.header, Some(layout.header_xf));
            unit.write_to(out, &format_address(i as u32, 0)?)?;
        }
        out.write_all(b"</row>")?;
    }

    let mut rows_written: u64 = 0;
    let mut warned_extra = false;
    for row in rows {
        check_cancelled()?;
        let row = row?;
        let row_index = (header_rows + rows_written) as u32;
        write!(out, "<row r=\"{}\">", row_index as u64 + 1)?;

        for (i, value) in row.into_iter().enumerate() {
            check_cancelled()?;
            if i >= column_count {
                if !warned_extra && !value.is_empty() {
                    warn!(
                        "sheet '{}': values beyond {} columns are dropped (row {})",
                        layout.name,
                        column_count,
                        row_index + 1
                    );
                    warned_extra = true;
                }
                continue;
            }
            if options.auto_column_width && layout.columns[i].width.is_none() {
                widths.observe(i, display_width(&value));
            }
            let encoding = &layout.encodings[i];
            if let Some(unit) =
                encode_value(value, encoding, options.write_empty_cells, &mut binaries)
            {
                unit.write_to(out, &format_address(i as u32, row_index)?)?;
            }
        }
        out.write_all(b"</row>")?;
        rows_written += 1;
    }

    out.write_all(b"</sheetData>")?;

    let total_rows = rows_written + header_rows;
    if options.auto_filter && options.write_header {
        write!(
            out,
            "<autoFilter ref=\"{}\"/>",
            dimension_ref(last_col, total_rows)?
        )?;
    }
    write!(out, "<drawing r:id=\"{}\"/></worksheet>", DRAWING_RID)?;

    let dimension = dimension_ref(last_col, total_rows)?;
    if let Some(expected) = known_rows {
        if expected != rows_written {
            warn!(
                "sheet '{}': row iterator promised {} rows but produced {}",
                layout.name, expected, rows_written
            );
        }
    }
    if let Some(site) = dimension_site {
        site.commit(out, &dimension_element(&dimension))?;
    }
    if let Some(site) = cols_site {
        let min = options.min_column_width;
        let max = options.max_column_width;
        let text = cols_element(
            layout.columns,
            |i| Some(layout.columns[i].width.unwrap_or_else(|| widths.width(i, min, max))),
            true,
        );
        site.commit(out, &text)?;
    }

    debug!(
        "sheet '{}': {} data rows, extent {}",
        layout.name, rows_written, dimension
    );
    Ok(SheetOutcome {
        rows_written,
        binaries: binaries.into_parts(),
        dimension,
    })
}

/// `A1:<last>` for a sheet with `rows` rows; `A1` when there is nothing to span
fn dimension_ref(last_col: u32, rows: u64) -> XlsxResult<String> {
    if rows == 0 {
        return Ok("A1".to_string());
    }
    let last_row = u32::try_from(rows - 1).unwrap_or(u32::MAX);
    let end = format_address(last_col, last_row)?;
    if end == "A1" {
        Ok(end)
    } else {
        Ok(format!("A1:{}", end))
    }
}

fn dimension_element(reference: &str) -> String {
    format!("<dimension ref=\"{}\"/>", reference)
}

/// `<cols>` for the columns `width` returns a value for (or that are hidden).
/// Auto-sized output marks every width as custom so reservation and commit line up.
fn cols_element<F>(columns: &[ColumnInfo], width: F, all: bool) -> String
where
    F: Fn(usize) -> Option<f64>,
{
    let mut xml = String::from("<cols>");
    for (i, column) in columns.iter().enumerate() {
        if !all && !column.has_custom_settings() {
            continue;
        }
        let n = i + 1;
        xml.push_str(&format!("<col min=\"{}\" max=\"{}\"", n, n));
        if let Some(w) = width(i) {
            xml.push_str(&format!(" width=\"{:.2}\" customWidth=\"1\"", w));
        }
        if column.hidden {
            xml.push_str(" hidden=\"1\"");
        }
        xml.push_str("/>");
    }
    xml.push_str("</cols>");
    xml
}

fn write_sheet_views<O: EntryOutput + ?Sized>(
    out: &mut O,
    tab_selected: bool,
    options: &WriteOptions,
) -> XlsxResult<()> {
    out.write_all(b"<sheetViews><sheetView workbookViewId=\"0\"")?;
    if tab_selected {
        out.write_all(b" tabSelected=\"1\"")?;
    }

    let rows = options.freeze_rows;
    let cols = options.freeze_columns;
    if rows == 0 && cols == 0 {
        out.write_all(b"/></sheetViews>")?;
        return Ok(());
    }

    let pane = match (rows > 0, cols > 0) {
        (true, true) => "bottomRight",
        (true, false) => "bottomLeft",
        _ => "topRight",
    };
    out.write_all(b"><pane")?;
    if cols > 0 {
        write!(out, " xSplit=\"{}\"", cols)?;
    }
    if rows > 0 {
        write!(out, " ySplit=\"{}\"", rows)?;
    }
    write!(
        out,
        " topLeftCell=\"{}\" activePane=\"{}\" state=\"frozen\"/><selection pane=\"{}\"/></sheetView></sheetViews>",
        format_address(cols, rows)?,
        pane,
        pane
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};

    #[derive(Default)]
    struct Buffer {
        bytes: Vec<u8>,
        streamed: bool,
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl EntryOutput for Buffer {
        fn position(&mut self) -> XlsxResult<u64> {
            Ok(self.bytes.len() as u64)
        }

        fn overwrite(&mut self, position: u64, bytes: &[u8]) -> XlsxResult<()> {
            let start = position as usize;
            self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn is_patchable(&self) -> bool {
            !self.streamed
        }
    }

    fn layout(columns: &[ColumnInfo]) -> SheetLayout<'_> {
        SheetLayout {
            name: "Sheet1",
            sheet_number: 1,
            columns,
            encodings: vec![
                ColumnEncoding {
                    custom_xf: None,
                    date_xf: 2
                };
                columns.len()
            ],
            header_xf: 1,
            tab_selected: true,
        }
    }

    fn people() -> Vec<Vec<CellValue>> {
        vec![
            vec![CellValue::string("Jack"), CellValue::Number(25.0)],
            vec![CellValue::string("Mike"), CellValue::Number(44.0)],
        ]
    }

    fn write(rows: Vec<Vec<CellValue>>, known: bool, options: &WriteOptions) -> (String, SheetOutcome) {
        let columns = vec![ColumnInfo::new("Name"), ColumnInfo::new("Age")];
        let mut out = Buffer {
            streamed: options.entry_mode == EntryMode::Streamed,
            ..Buffer::default()
        };
        let rows = rows.into_iter().map(Ok::<_, XlsxError>);
        let outcome = if known {
            write_worksheet(&mut out, &layout(&columns), options, rows).unwrap()
        } else {
            // filter() hides the exact length
            let unknown = rows.filter(|_| true);
            write_worksheet(&mut out, &layout(&columns), options, unknown).unwrap()
        };
        (String::from_utf8(out.bytes).unwrap(), outcome)
    }

    #[test]
    fn test_known_count_writes_dimension_directly() {
        let (xml, outcome) = write(people(), true, &WriteOptions::default());
        assert_eq!(outcome.rows_written, 2);
        assert_eq!(outcome.dimension, "A1:B3");
        assert!(xml.contains("<dimension ref=\"A1:B3\"/><sheetViews>"));
        assert!(xml.contains(r#"<row r="1"><c r="A1" s="1" t="inlineStr"><is><t>Name</t></is></c>"#));
        assert!(xml.contains(r#"<c r="B3"><v>44</v></c>"#));
        assert!(xml.contains(r#"<autoFilter ref="A1:B3"/>"#));
    }

    #[test]
    fn test_unknown_count_patches_dimension() {
        let (xml, outcome) = write(people(), false, &WriteOptions::default());
        assert_eq!(outcome.dimension, "A1:B3");
        assert!(xml.contains("<dimension ref=\"A1:B3\"/>"));
        // Padding left by the worst-case reservation sits before <sheetViews>
        assert!(xml.contains("/>        <sheetViews>"));
    }

    #[test]
    fn test_streamed_unknown_count_omits_dimension() {
        let options = WriteOptions {
            entry_mode: EntryMode::Streamed,
            ..WriteOptions::default()
        };
        let (xml, outcome) = write(people(), false, &options);
        assert_eq!(outcome.rows_written, 2);
        assert!(!xml.contains("<dimension"));
    }

    #[test]
    fn test_auto_width_and_freeze() {
        let options = WriteOptions {
            auto_column_width: true,
            freeze_rows: 1,
            ..WriteOptions::default()
        };
        let (xml, _) = write(
            vec![vec![CellValue::string("a much longer name than the header"), CellValue::Number(1.0)]],
            true,
            &options,
        );
        assert!(xml.contains(r#"<col min="1" max="1" width="36.00" customWidth="1"/>"#));
        assert!(xml.contains(r#"<col min="2" max="2" width="9.28" customWidth="1"/>"#));
        assert!(xml.contains(r#"<pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/>"#));
    }

    #[test]
    fn test_extra_values_dropped_and_empty_sheet() {
        let (xml, outcome) = write(
            vec![vec![CellValue::string("x"), CellValue::Number(1.0), CellValue::string("extra")]],
            true,
            &WriteOptions::default(),
        );
        assert_eq!(outcome.rows_written, 1);
        assert!(!xml.contains("extra"));

        let options = WriteOptions {
            write_header: false,
            ..WriteOptions::default()
        };
        let (xml, outcome) = write(Vec::new(), true, &options);
        assert_eq!(outcome.rows_written, 0);
        assert!(xml.contains("<dimension ref=\"A1\"/>"));
        assert!(!xml.contains("autoFilter"));
    }
}
