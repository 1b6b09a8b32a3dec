//! Forward-only worksheet row reader

use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use sheetstream_core::{
    parse_address, serial_to_datetime, CancellationToken, CellAddress, CellValue, Row,
};

use crate::error::{XlsxError, XlsxResult};
use crate::package::{PackageReader, PackageSource, ReadSeek, BINARY_SENTINEL};
use crate::reader::prescan::MergeRegistry;
use crate::shared_strings::SharedStrings;
use crate::styles::StyleTable;
use crate::xml::{attr_value, decode_excel_escapes, read_text};

/// Where the reader is in the worksheet document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    BeforeWorksheet,
    InWorksheet,
    InSheetData,
    InRow,
    InCell,
    AfterSheetData,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Addressing {
    Explicit,
    Ordinal,
}

/// Elements the state machine reacts to
#[derive(Debug)]
enum Tag {
    Worksheet,
    SheetData,
    Row,
    Cell,
    Value,
    Inline,
    Run,
    Text,
    Other(Vec<u8>),
}

impl Tag {
    fn of(e: &BytesStart<'_>) -> Self {
        match e.local_name().as_ref() {
            b"worksheet" => Tag::Worksheet,
            b"sheetData" => Tag::SheetData,
            b"row" => Tag::Row,
            b"c" => Tag::Cell,
            b"v" => Tag::Value,
            b"is" => Tag::Inline,
            b"r" => Tag::Run,
            b"t" => Tag::Text,
            _ => Tag::Other(e.name().as_ref().to_vec()),
        }
    }
}

/// Owned view of one XML event, so the read buffer is free again while it is handled
#[derive(Debug)]
enum Node {
    Start(Tag, Attrs),
    Empty(Tag, Attrs),
    End(Tag),
    Eof,
    Skip,
}

/// The attributes rows and cells care about
#[derive(Debug, Default)]
struct Attrs {
    r: Option<String>,
    t: Option<String>,
    s: Option<String>,
}

impl Attrs {
    fn of(tag: &Tag, e: &BytesStart<'_>) -> XlsxResult<Self> {
        Ok(match tag {
            Tag::Row => Attrs {
                r: attr_value(e, b"r")?,
                ..Attrs::default()
            },
            Tag::Cell => Attrs {
                r: attr_value(e, b"r")?,
                t: attr_value(e, b"t")?,
                s: attr_value(e, b"s")?,
            },
            _ => Attrs::default(),
        })
    }
}

/// The `<c>` being read
#[derive(Debug, Default)]
struct PendingCell {
    address: Option<String>,
    kind: Option<String>,
    style: Option<usize>,
    value: String,
    inline: String,
}

/// Cells of the row being assembled, ordered by column
#[derive(Debug, Default)]
struct RawRow {
    index: u32,
    cells: BTreeMap<u32, CellValue>,
}

/// Inputs shared by every row of a query
pub(crate) struct DecodeContext<'a> {
    pub shared_strings: &'a SharedStrings,
    pub styles: &'a StyleTable,
    pub date1904: bool,
    pub binaries: Option<&'a mut BinaryResolver>,
}

/// Query window and policies, in 0-based indices
#[derive(Debug, Clone)]
pub(crate) struct RowWindow {
    pub first_row: u32,
    pub last_row: Option<u32>,
    pub first_col: u32,
    pub last_col: Option<u32>,
    pub has_header: bool,
    pub ignore_empty_rows: bool,
    pub dimension_last_col: Option<u32>,
    /// Whether cells carry `r` attributes, when a cell scan already settled it
    pub explicit_refs: Option<bool>,
}

/// Lazily resolves embedded-binary sentinels through a second handle on the package
pub(crate) struct BinaryResolver {
    source: PackageSource,
    package: Option<PackageReader<Box<dyn ReadSeek>>>,
    warned: bool,
}

impl BinaryResolver {
    pub(crate) fn new(source: PackageSource) -> Self {
        Self {
            source,
            package: None,
            warned: false,
        }
    }

    /// Bytes of the part a sentinel points at, or `None` when it cannot be read
    pub(crate) fn resolve(&mut self, part: &str) -> Option<Vec<u8>> {
        if self.package.is_none() {
            match self.source.reopen() {
                Ok(Some(package)) => self.package = Some(package),
                Ok(None) => {
                    self.warn_once(|| {
                        "embedded binaries left unresolved: document was opened from a one-shot stream"
                            .to_string()
                    });
                    return None;
                }
                Err(e) => {
                    self.warn_once(|| format!("embedded binaries left unresolved: {}", e));
                    return None;
                }
            }
        }

        let package = self.package.as_mut()?;
        match package.read_entry(part.trim_start_matches('/')) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("embedded binary '{}' unreadable: {}", part, e);
                None
            }
        }
    }

    fn warn_once<F: FnOnce() -> String>(&mut self, message: F) {
        if !self.warned {
            warn!("{}", message());
            self.warned = true;
        }
    }
}

/// Iterator over the rows of one worksheet
///
/// Pulls one XML node at a time from the compressed entry; nothing beyond the current
/// row is held in memory. Errors end the iteration.
pub struct RowIter<'a> {
    xml: Reader<BufReader<Box<dyn Read + 'a>>>,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    state: ReaderState,
    sheet: String,
    context: DecodeContext<'a>,
    window: RowWindow,
    keys: Arc<[String]>,
    header_pending: bool,
    merges: Option<MergeRegistry>,
    addressing: Option<Addressing>,
    row: Option<RawRow>,
    cell: PendingCell,
    next_col: u32,
    last_row_index: Option<u32>,
    next_expected: u32,
    gap: std::ops::Range<u32>,
    held: Option<Row>,
    finished: bool,
    cancellation: Option<CancellationToken>,
    reported_overflow: bool,
}

impl<'a> RowIter<'a> {
    pub(crate) fn new(
        entry: Box<dyn Read + 'a>,
        sheet: &str,
        context: DecodeContext<'a>,
        window: RowWindow,
        merges: Option<MergeRegistry>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        let mut xml = Reader::from_reader(BufReader::new(entry));
        // Whitespace inside <t> and <v> is data
        xml.trim_text(false);

        let keys: Arc<[String]> = column_letters(&window).into();
        let header_pending = window.has_header;
        let next_expected = window.first_row;
        let addressing = window.explicit_refs.map(|explicit| {
            if explicit {
                Addressing::Explicit
            } else {
                Addressing::Ordinal
            }
        });

        Self {
            xml,
            buf: Vec::new(),
            scratch: Vec::new(),
            state: ReaderState::BeforeWorksheet,
            sheet: sheet.to_string(),
            context,
            window,
            keys,
            header_pending,
            merges,
            addressing,
            row: None,
            cell: PendingCell::default(),
            next_col: 0,
            last_row_index: None,
            next_expected,
            gap: 0..0,
            held: None,
            finished: false,
            cancellation,
            reported_overflow: false,
        }
    }

    /// Column keys of the rows produced so far (header text once the header was read)
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn check_cancelled(&self) -> XlsxResult<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(XlsxError::Cancelled),
            _ => Ok(()),
        }
    }

    fn next_node(&mut self) -> XlsxResult<Node> {
        let node = match self.xml.read_event_into(&mut self.buf)? {
            Event::Start(e) => {
                let tag = Tag::of(&e);
                let attrs = Attrs::of(&tag, &e)?;
                Node::Start(tag, attrs)
            }
            Event::Empty(e) => {
                let tag = Tag::of(&e);
                let attrs = Attrs::of(&tag, &e)?;
                Node::Empty(tag, attrs)
            }
            Event::End(e) => {
                let tag = match e.local_name().as_ref() {
                    b"worksheet" => Tag::Worksheet,
                    b"sheetData" => Tag::SheetData,
                    b"row" => Tag::Row,
                    b"c" => Tag::Cell,
                    _ => Tag::Other(Vec::new()),
                };
                Node::End(tag)
            }
            Event::Eof => Node::Eof,
            _ => Node::Skip,
        };
        self.buf.clear();
        Ok(node)
    }

    fn skip_element(&mut self, name: &[u8]) -> XlsxResult<()> {
        self.xml.read_to_end_into(QName(name), &mut self.scratch)?;
        self.scratch.clear();
        Ok(())
    }

    /// Drive the state machine until one `<row>` is complete, or the sheet data ends
    fn read_raw_row(&mut self) -> XlsxResult<Option<RawRow>> {
        loop {
            if matches!(self.state, ReaderState::AfterSheetData | ReaderState::Done) {
                self.state = ReaderState::Done;
                return Ok(None);
            }
            if self.state == ReaderState::InCell {
                self.check_cancelled()?;
            }

            let node = self.next_node()?;
            match (self.state, node) {
                (_, Node::Eof) => {
                    self.state = ReaderState::Done;
                    return Ok(self.row.take());
                }
                (_, Node::Skip) => {}

                (ReaderState::BeforeWorksheet, Node::Start(Tag::Worksheet, _)) => {
                    self.state = ReaderState::InWorksheet;
                }
                (ReaderState::BeforeWorksheet, Node::Empty(Tag::Worksheet, _)) => {
                    self.state = ReaderState::Done;
                }

                (ReaderState::InWorksheet, Node::Start(Tag::SheetData, _)) => {
                    self.state = ReaderState::InSheetData;
                }
                (ReaderState::InWorksheet, Node::Empty(Tag::SheetData, _)) => {
                    self.state = ReaderState::AfterSheetData;
                }

                (ReaderState::InSheetData, Node::Start(Tag::Row, attrs)) => {
                    self.begin_row(attrs.r);
                    self.state = ReaderState::InRow;
                }
                (ReaderState::InSheetData, Node::Empty(Tag::Row, attrs)) => {
                    self.begin_row(attrs.r);
                    return Ok(self.row.take());
                }
                (ReaderState::InSheetData, Node::End(Tag::SheetData)) => {
                    self.state = ReaderState::AfterSheetData;
                }

                (ReaderState::InRow, Node::Start(Tag::Cell, attrs)) => {
                    self.begin_cell(attrs)?;
                    self.state = ReaderState::InCell;
                }
                (ReaderState::InRow, Node::Empty(Tag::Cell, attrs)) => {
                    self.begin_cell(attrs)?;
                    self.finish_cell()?;
                }
                (ReaderState::InRow, Node::End(Tag::Row)) => {
                    self.state = ReaderState::InSheetData;
                    return Ok(self.row.take());
                }

                (ReaderState::InCell, Node::Start(Tag::Value, _)) => {
                    read_text(&mut self.xml, &mut self.scratch, &mut self.cell.value)?;
                }
                (ReaderState::InCell, Node::Start(Tag::Text, _)) => {
                    read_text(&mut self.xml, &mut self.scratch, &mut self.cell.inline)?;
                }
                // Descend into inline strings and their runs
                (ReaderState::InCell, Node::Start(Tag::Inline | Tag::Run, _)) => {}
                (ReaderState::InCell, Node::End(Tag::Cell)) => {
                    self.finish_cell()?;
                    self.state = ReaderState::InRow;
                }

                // Anything else (formulas, phonetic runs, extLst, cols, ...) is skipped whole
                (_, Node::Start(Tag::Other(name), _)) => self.skip_element(&name)?,
                (_, Node::Start(Tag::Cell, _)) | (_, Node::Start(Tag::Row, _)) => {
                    return Err(XlsxError::Parse(format!(
                        "sheet '{}': unexpected element nesting",
                        self.sheet
                    )));
                }
                _ => {}
            }
        }
    }

    fn begin_row(&mut self, r: Option<String>) {
        let index = match r.and_then(|v| v.trim().parse::<u32>().ok()) {
            Some(n) if n > 0 => n - 1,
            _ => self.last_row_index.map_or(0, |i| i + 1),
        };
        self.last_row_index = Some(index);
        self.next_col = 0;
        self.row = Some(RawRow {
            index,
            cells: BTreeMap::new(),
        });
    }

    fn begin_cell(&mut self, attrs: Attrs) -> XlsxResult<()> {
        self.cell = PendingCell {
            address: attrs.r,
            kind: attrs.t,
            style: attrs.s.and_then(|s| s.trim().parse().ok()),
            value: String::new(),
            inline: String::new(),
        };
        Ok(())
    }

    fn finish_cell(&mut self) -> XlsxResult<()> {
        let cell = std::mem::take(&mut self.cell);
        let row_index = self.row.as_ref().map_or(0, |r| r.index);

        let mode = if cell.address.is_some() {
            Addressing::Explicit
        } else {
            Addressing::Ordinal
        };
        match self.addressing {
            None => self.addressing = Some(mode),
            Some(seen) if seen != mode => {
                return Err(XlsxError::MixedCellAddressing {
                    sheet: self.sheet.clone(),
                    row: row_index + 1,
                });
            }
            Some(_) => {}
        }

        let col = match &cell.address {
            Some(text) => parse_address(text)?.0,
            None => self.next_col,
        };
        self.next_col = col + 1;

        let value = decode_cell(&mut self.context, cell);

        if let Some(merges) = self.merges.as_mut() {
            let address = CellAddress::new(row_index, col);
            if merges.is_anchor(&address) {
                merges.set_anchor_value(address, value.clone());
            }
        }

        if let Some(last) = self.window.dimension_last_col {
            if col > last && !self.reported_overflow {
                debug!(
                    "sheet '{}': cells beyond the declared dimension are dropped (first at row {})",
                    self.sheet,
                    row_index + 1
                );
                self.reported_overflow = true;
            }
        }

        let in_window = col >= self.window.first_col
            && self.window.last_col.map_or(false, |last| col <= last);
        if in_window && !value.is_empty() {
            if let Some(row) = self.row.as_mut() {
                row.cells.insert(col, value);
            }
        }
        Ok(())
    }

    /// Dense row over the column window, merge-filled when enabled
    fn materialize(&self, index: u32, mut cells: BTreeMap<u32, CellValue>) -> Row {
        let values = window_columns(&self.window)
            .map(|col| {
                let value = cells.remove(&col).unwrap_or(CellValue::Empty);
                if value.is_empty() {
                    if let Some(merges) = &self.merges {
                        if let Some(anchor_value) = merges.value_for(&CellAddress::new(index, col)) {
                            return anchor_value.clone();
                        }
                    }
                }
                value
            })
            .collect();
        Row::new(index + 1, Arc::clone(&self.keys), values)
    }

    fn take_header(&mut self, row: &Row) {
        let letters = column_letters(&self.window);
        let keys: Vec<String> = row
            .values()
            .iter()
            .zip(letters)
            .map(|(value, letter)| {
                let text = value.to_string();
                if text.trim().is_empty() {
                    letter
                } else {
                    text
                }
            })
            .collect();
        debug!("sheet '{}': header keys {:?}", self.sheet, keys);
        self.keys = keys.into();
    }

    /// Read the next real row and queue it, with any empty rows that precede it
    fn advance(&mut self) -> XlsxResult<()> {
        loop {
            self.check_cancelled()?;

            let raw = match self.read_raw_row()? {
                Some(raw) => raw,
                None => {
                    self.finished = true;
                    return Ok(());
                }
            };

            if raw.index < self.window.first_row {
                continue;
            }

            if let Some(last) = self.window.last_row {
                if raw.index > last {
                    if !self.header_pending && !self.window.ignore_empty_rows {
                        self.gap = self.next_expected..last + 1;
                    }
                    self.finished = true;
                    return Ok(());
                }
            }

            let row = self.materialize(raw.index, raw.cells);

            if self.header_pending {
                self.take_header(&row);
                self.header_pending = false;
                self.next_expected = raw.index + 1;
                continue;
            }

            if !self.window.ignore_empty_rows && raw.index > self.next_expected {
                self.gap = self.next_expected..raw.index;
            }
            self.next_expected = self.next_expected.max(raw.index + 1);

            if self.window.ignore_empty_rows && row.is_blank() {
                continue;
            }
            self.held = Some(row);
            return Ok(());
        }
    }
}

impl<'a> Iterator for RowIter<'a> {
    type Item = XlsxResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(index) = self.gap.next() {
                return Some(Ok(self.materialize(index, BTreeMap::new())));
            }
            if let Some(row) = self.held.take() {
                return Some(Ok(row));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.advance() {
                self.finished = true;
                self.gap = 0..0;
                return Some(Err(e));
            }
        }
    }
}

fn window_columns(window: &RowWindow) -> impl Iterator<Item = u32> {
    let first = window.first_col;
    let end = window.last_col.map_or(first, |last| last + 1);
    first..end.max(first)
}

fn column_letters(window: &RowWindow) -> Vec<String> {
    window_columns(window)
        .map(CellAddress::column_to_letters)
        .collect()
}

/// Turn a cell's raw text into a typed value. Anomalies degrade to the raw text.
fn decode_cell(context: &mut DecodeContext<'_>, cell: PendingCell) -> CellValue {
    let PendingCell {
        kind,
        style,
        value,
        inline,
        ..
    } = cell;

    match kind.as_deref() {
        Some("s") => match value.trim().parse::<usize>() {
            Ok(index) => context
                .shared_strings
                .get(index)
                .map(|s| CellValue::String(s.into_owned()))
                .unwrap_or(CellValue::Empty),
            Err(_) => raw_text(value),
        },
        Some("str") | Some("inlineStr") => {
            let text = if inline.is_empty() { value } else { inline };
            if text.is_empty() {
                return CellValue::Empty;
            }
            let text = decode_excel_escapes(&text).into_owned();
            resolve_sentinel(context, text)
        }
        Some("b") => match value.trim() {
            "1" | "true" => CellValue::Bool(true),
            "0" | "false" => CellValue::Bool(false),
            "" => CellValue::Empty,
            _ => raw_text(value),
        },
        Some("d") => parse_iso_datetime(value.trim())
            .map(CellValue::DateTime)
            .unwrap_or_else(|| raw_text(value)),
        Some("e") => raw_text(value),
        None | Some("n") => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return CellValue::Empty;
            }
            match trimmed.parse::<f64>() {
                Ok(number) => match style {
                    Some(s) if context.styles.is_date(s) => {
                        serial_to_datetime(number, context.date1904)
                            .map(CellValue::DateTime)
                            .unwrap_or(CellValue::Number(number))
                    }
                    _ => CellValue::Number(number),
                },
                Err(_) => raw_text(value),
            }
        }
        Some(_) => {
            let text = if inline.is_empty() { value } else { inline };
            raw_text(text)
        }
    }
}

fn raw_text(text: String) -> CellValue {
    if text.is_empty() {
        CellValue::Empty
    } else {
        CellValue::String(text)
    }
}

fn resolve_sentinel(context: &mut DecodeContext<'_>, text: String) -> CellValue {
    let Some(part) = text.strip_prefix(BINARY_SENTINEL) else {
        return CellValue::String(text);
    };
    match context.binaries.as_deref_mut() {
        Some(resolver) => match resolver.resolve(part) {
            Some(bytes) => CellValue::Bytes(bytes),
            None => CellValue::String(text),
        },
        None => CellValue::String(text),
    }
}

fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim_end_matches('Z');
    text.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| {
            text.parse::<NaiveDate>()
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wrap(sheet_data: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:C5"/>{}</worksheet>"#,
            sheet_data
        )
    }

    fn window(last_col: u32) -> RowWindow {
        RowWindow {
            first_row: 0,
            last_row: None,
            first_col: 0,
            last_col: Some(last_col),
            has_header: false,
            ignore_empty_rows: false,
            dimension_last_col: Some(last_col),
            explicit_refs: None,
        }
    }

    fn read(xml: &str, window: RowWindow, merges: Option<MergeRegistry>) -> XlsxResult<Vec<Row>> {
        let shared = SharedStrings::empty();
        let styles = StyleTable::default();
        let context = DecodeContext {
            shared_strings: &shared,
            styles: &styles,
            date1904: false,
            binaries: None,
        };
        let entry: Box<dyn Read + '_> = Box::new(xml.as_bytes());
        RowIter::new(entry, "Sheet1", context, window, merges, None).collect()
    }

    fn texts(rows: &[Row]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.values().iter().map(|v| v.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_typed_cells() {
        let xml = wrap(
            r#"<sheetData><row r="1"><c r="A1" t="b"><v>1</v></c><c r="B1"><v>2.5</v></c><c r="C1" t="inlineStr"><is><t xml:space="preserve"> hi </t></is></c></row></sheetData>"#,
        );
        let rows = read(&xml, window(2), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].values(),
            &[
                CellValue::Bool(true),
                CellValue::Number(2.5),
                CellValue::string(" hi "),
            ]
        );
        assert_eq!(rows[0].keys(), &["A", "B", "C"]);
    }

    #[test]
    fn test_gap_rows_synthesized() {
        let xml = wrap(
            r#"<sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="3"><c r="A3"><v>3</v></c></row></sheetData>"#,
        );
        let rows = read(&xml, window(0), None).unwrap();
        assert_eq!(rows.iter().map(Row::number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(rows[1].is_blank());
    }

    #[test]
    fn test_ignore_empty_rows() {
        let xml = wrap(
            r#"<sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="2"/><row r="4"><c r="A4"><v>4</v></c></row></sheetData>"#,
        );
        let mut w = window(0);
        w.ignore_empty_rows = true;
        let rows = read(&xml, w, None).unwrap();
        assert_eq!(rows.iter().map(Row::number).collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn test_self_closing_row() {
        let xml = wrap(r#"<sheetData><row r="5"/></sheetData>"#);
        let mut w = window(1);
        w.first_row = 4;
        let rows = read(&xml, w, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].number(), 5);
        assert!(rows[0].is_blank());
    }

    #[test]
    fn test_ordinal_addressing() {
        let xml = wrap(
            r#"<sheetData><row><c><v>1</v></c><c><v>2</v></c></row><row><c><v>3</v></c></row></sheetData>"#,
        );
        let rows = read(&xml, window(1), None).unwrap();
        assert_eq!(texts(&rows), vec![vec!["1", "2"], vec!["3", ""]]);
    }

    #[test]
    fn test_mixed_addressing_fails() {
        let xml = wrap(r#"<sheetData><row r="1"><c r="A1"><v>1</v></c><c><v>2</v></c></row></sheetData>"#);
        let err = read(&xml, window(1), None).unwrap_err();
        assert!(matches!(err, XlsxError::MixedCellAddressing { row: 1, .. }));
    }

    #[test]
    fn test_scanned_addressing_is_enforced_from_the_first_cell() {
        let xml = wrap(r#"<sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData>"#);
        let w = RowWindow {
            explicit_refs: Some(false),
            ..window(0)
        };
        let err = read(&xml, w, None).unwrap_err();
        assert!(matches!(err, XlsxError::MixedCellAddressing { row: 1, .. }));

        let xml = wrap(r#"<sheetData><row><c><v>1</v></c><c><v>2</v></c></row></sheetData>"#);
        let w = RowWindow {
            explicit_refs: Some(false),
            ..window(1)
        };
        assert_eq!(texts(&read(&xml, w, None).unwrap()), vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_window_and_header() {
        let xml = wrap(
            r#"<sheetData>
              <row r="1"><c r="A1"><v>0</v></c></row>
              <row r="2"><c r="A2" t="inlineStr"><is><t>skip</t></is></c><c r="B2" t="inlineStr"><is><t>Name</t></is></c></row>
              <row r="3"><c r="B3" t="inlineStr"><is><t>Jack</t></is></c><c r="C3"><v>25</v></c></row>
              <row r="4"><c r="B4" t="inlineStr"><is><t>Mike</t></is></c></row>
              <row r="5"><c r="B5" t="inlineStr"><is><t>late</t></is></c></row>
            </sheetData>"#,
        );
        let w = RowWindow {
            first_row: 1,
            last_row: Some(3),
            first_col: 1,
            last_col: Some(2),
            has_header: true,
            ignore_empty_rows: false,
            dimension_last_col: Some(2),
            explicit_refs: None,
        };
        let rows = read(&xml, w, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].keys(), &["Name", "C"]);
        assert_eq!(rows[0].get("Name"), Some(&CellValue::string("Jack")));
        assert_eq!(rows[0].get("C"), Some(&CellValue::Number(25.0)));
        assert_eq!(rows[1].number(), 4);
    }

    #[test]
    fn test_formula_and_unknown_children_skipped() {
        let xml = wrap(
            r#"<sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetData><row r="1"><c r="A1"><f>1+1</f><v>2</v></c><c r="B1" t="e"><v>#DIV/0!</v></c><c r="C1"><v>abc</v></c></row></sheetData>"#,
        );
        let rows = read(&xml, window(2), None).unwrap();
        assert_eq!(
            rows[0].values(),
            &[
                CellValue::Number(2.0),
                CellValue::string("#DIV/0!"),
                CellValue::string("abc"),
            ]
        );
    }

    #[test]
    fn test_merge_fill() {
        let xml = wrap(
            r#"<sheetData><row r="2"><c r="B2" t="inlineStr"><is><t>X</t></is></c></row></sheetData>"#,
        );
        let mut merges = MergeRegistry::default();
        merges.add_region(sheetstream_core::CellRange::parse("B2:C3").unwrap());
        let rows = read(&xml, window(2), Some(merges)).unwrap();
        assert_eq!(texts(&rows), vec![
            vec!["", "", ""],
            vec!["", "X", "X"],
        ]);

        let mut merges = MergeRegistry::default();
        merges.add_region(sheetstream_core::CellRange::parse("B2:C3").unwrap());
        let xml = wrap(
            r#"<sheetData><row r="2"><c r="B2" t="inlineStr"><is><t>X</t></is></c></row><row r="3"/></sheetData>"#,
        );
        let rows = read(&xml, window(2), Some(merges)).unwrap();
        assert_eq!(texts(&rows)[2], vec!["", "X", "X"]);
    }

    #[test]
    fn test_dates_and_escapes() {
        let xml = wrap(
            r#"<sheetData><row r="1"><c r="A1" t="d"><v>2024-03-01T10:30:00</v></c><c r="B1" t="str"><v>a_x000a_b</v></c><c r="C1" t="str"><v>@@@fileid@@@,xl/media/x.bin</v></c></row></sheetData>"#,
        );
        let rows = read(&xml, window(2), None).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(rows[0].values()[0], CellValue::DateTime(expected));
        assert_eq!(rows[0].values()[1], CellValue::string("a\nb"));
        // No resolver: the sentinel stays text
        assert_eq!(
            rows[0].values()[2],
            CellValue::string("@@@fileid@@@,xl/media/x.bin")
        );
    }

    #[test]
    fn test_cancellation() {
        let xml = wrap(r#"<sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData>"#);
        let shared = SharedStrings::empty();
        let styles = StyleTable::default();
        let context = DecodeContext {
            shared_strings: &shared,
            styles: &styles,
            date1904: false,
            binaries: None,
        };
        let token = CancellationToken::new();
        token.cancel();
        let entry: Box<dyn Read + '_> = Box::new(xml.as_bytes());
        let mut rows = RowIter::new(entry, "S", context, window(0), None, Some(token));
        assert!(matches!(rows.next(), Some(Err(XlsxError::Cancelled))));
        assert!(rows.next().is_none());
    }
}
