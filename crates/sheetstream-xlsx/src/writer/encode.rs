//! Cell value encoding for the worksheet writer

use std::io::Write;

use sheetstream_core::{datetime_to_serial, CellValue};

use crate::error::XlsxResult;
use crate::package::BINARY_SENTINEL;
use crate::xml::{escape_xml, needs_space_preserve};

/// Width, in characters, Excel reserves around cell text
const WIDTH_PADDING: f64 = 2.0;

/// One `<c>` element, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CellOutputUnit {
    pub style_id: Option<u32>,
    pub data_type: Option<&'static str>,
    /// Already XML-escaped
    pub encoded_value: String,
    pub preserve_whitespace: bool,
}

impl CellOutputUnit {
    pub fn text(text: &str, style_id: Option<u32>) -> Self {
        Self {
            style_id,
            data_type: Some("inlineStr"),
            encoded_value: escape_xml(text).into_owned(),
            preserve_whitespace: needs_space_preserve(text),
        }
    }

    fn value(value: String, data_type: Option<&'static str>, style_id: Option<u32>) -> Self {
        Self {
            style_id,
            data_type,
            encoded_value: value,
            preserve_whitespace: false,
        }
    }

    fn blank(style_id: Option<u32>) -> Self {
        Self::value(String::new(), None, style_id)
    }

    /// Write the element for the cell at `address`
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W, address: &str) -> XlsxResult<()> {
        write!(out, "<c r=\"{}\"", address)?;
        if let Some(style) = self.style_id.filter(|&s| s != 0) {
            write!(out, " s=\"{}\"", style)?;
        }
        match self.data_type {
            Some("inlineStr") => {
                let space = if self.preserve_whitespace {
                    " xml:space=\"preserve\""
                } else {
                    ""
                };
                write!(
                    out,
                    " t=\"inlineStr\"><is><t{}>{}</t></is></c>",
                    space, self.encoded_value
                )?;
            }
            _ if self.encoded_value.is_empty() => out.write_all(b"/>")?,
            Some(kind) => write!(out, " t=\"{}\"><v>{}</v></c>", kind, self.encoded_value)?,
            None => write!(out, "><v>{}</v></c>", self.encoded_value)?,
        }
        Ok(())
    }
}

/// Styles a column's values are written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ColumnEncoding {
    /// Cell format for a custom number format on the column
    pub custom_xf: Option<u32>,
    /// Cell format for date-times when the column has no custom format
    pub date_xf: u32,
}

/// Binary parts produced by one sheet, written once the sheet is sealed
#[derive(Debug, Default)]
pub(crate) struct BinaryParts {
    sheet_number: u32,
    parts: Vec<(String, Vec<u8>)>,
}

impl BinaryParts {
    pub fn new(sheet_number: u32) -> Self {
        Self {
            sheet_number,
            parts: Vec::new(),
        }
    }

    fn add(&mut self, bytes: Vec<u8>) -> String {
        let part = format!(
            "xl/media/sheet{}_blob{}.bin",
            self.sheet_number,
            self.parts.len() + 1
        );
        self.parts.push((part.clone(), bytes));
        part
    }

    pub fn into_parts(self) -> Vec<(String, Vec<u8>)> {
        self.parts
    }
}

/// Encode one value. `None` means the cell is omitted.
pub(crate) fn encode_value(
    value: CellValue,
    column: &ColumnEncoding,
    write_empty: bool,
    binaries: &mut BinaryParts,
) -> Option<CellOutputUnit> {
    let style = column.custom_xf;
    let unit = match value {
        CellValue::Empty if write_empty => CellOutputUnit::blank(style),
        CellValue::Empty => return None,
        CellValue::Bool(b) => {
            CellOutputUnit::value(if b { "1" } else { "0" }.to_string(), Some("b"), style)
        }
        CellValue::Number(n) if n.is_finite() => CellOutputUnit::value(n.to_string(), None, style),
        CellValue::Number(n) => CellOutputUnit::text(&n.to_string(), style),
        CellValue::String(s) => CellOutputUnit::text(&s, style),
        CellValue::DateTime(dt) => match datetime_to_serial(dt) {
            Some(serial) => CellOutputUnit::value(
                serial.to_string(),
                None,
                Some(style.unwrap_or(column.date_xf)),
            ),
            None => CellOutputUnit::text(&dt.format("%Y-%m-%dT%H:%M:%S").to_string(), style),
        },
        CellValue::Bytes(bytes) => {
            let part = binaries.add(bytes);
            CellOutputUnit::text(&format!("{}{}", BINARY_SENTINEL, part), style)
        }
    };
    Some(unit)
}

/// Approximate display width of a value in characters, for auto-sized columns
pub(crate) fn display_width(value: &CellValue) -> f64 {
    let chars = match value {
        CellValue::Empty => 0.0,
        CellValue::Bool(b) => if *b { 4.0 } else { 5.0 },
        CellValue::Number(n) => n.to_string().len() as f64,
        CellValue::String(s) => text_width(s),
        // yyyy-mm-dd hh:mm:ss
        CellValue::DateTime(_) => 19.0,
        CellValue::Bytes(_) => 0.0,
    };
    if chars == 0.0 {
        0.0
    } else {
        chars + WIDTH_PADDING
    }
}

/// Width of the longest line; East Asian wide characters count double
pub(crate) fn text_width(text: &str) -> f64 {
    text.lines()
        .map(|line| line.chars().map(char_width).sum::<f64>())
        .fold(0.0, f64::max)
}

fn char_width(c: char) -> f64 {
    match c as u32 {
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x3FFFD => 2.0,
        _ => 1.0,
    }
}
