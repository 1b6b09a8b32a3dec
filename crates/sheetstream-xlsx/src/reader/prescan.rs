//! Dimension and merge discovery ahead of the main row pass

use std::io::{BufReader, Read};

use ahash::AHashMap;
use log::debug;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use sheetstream_core::{parse_address, CellAddress, CellRange, CellValue};

use crate::error::{XlsxError, XlsxResult};
use crate::xml::attr_value;

/// Extent of a worksheet's populated cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimensionResult {
    /// Largest 0-based row index, `None` for an empty sheet
    pub max_row_index: Option<u32>,
    /// Largest 0-based column index, `None` for an empty sheet
    pub max_column_index: Option<u32>,
    /// Whether cells carry `r` attributes. Only known for certain when the cells were
    /// scanned; a declared dimension leaves the main pass to decide.
    pub explicit_cell_refs: bool,
    /// Whether the extent came from `<dimension ref>` rather than a cell scan
    pub declared: bool,
}

impl DimensionResult {
    /// The extent as an A1 range, if the sheet has any cells
    pub fn range(&self) -> Option<CellRange> {
        match (self.max_row_index, self.max_column_index) {
            (Some(row), Some(col)) => Some(CellRange::from_indices(0, 0, row, col)),
            _ => None,
        }
    }
}

/// Discover a worksheet's extent.
///
/// Prefers the declared `<dimension ref>`; stops reading as soon as it is found. Without
/// one (or with the placeholder `A1` many writers emit), every `<c>` is scanned. The scan
/// also settles whether cells are addressed explicitly or by position.
pub fn scan_dimension<R: Read>(reader: R, sheet: &str) -> XlsxResult<DimensionResult> {
    let mut xml = Reader::from_reader(BufReader::new(reader));
    xml.trim_text(true);

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    let mut scan = CellScan::default();
    let mut in_sheet_data = false;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                if let Some(value) = attr_value(&e, b"ref")? {
                    let range = CellRange::parse(&value).map_err(|_| {
                        XlsxError::MalformedDimension {
                            sheet: sheet.to_string(),
                            value: value.clone(),
                        }
                    })?;
                    if range.start != range.end || range.start != CellAddress::new(0, 0) {
                        debug!("sheet '{}': declared dimension {}", sheet, range);
                        return Ok(DimensionResult {
                            max_row_index: Some(range.end.row),
                            max_column_index: Some(range.end.col),
                            explicit_cell_refs: true,
                            declared: true,
                        });
                    }
                }
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = true,
                b"row" if in_sheet_data => scan.row(attr_value(&e, b"r")?),
                b"c" if in_sheet_data => {
                    scan.cell(attr_value(&e, b"r")?, sheet)?;
                    let end = e.name().as_ref().to_vec();
                    xml.read_to_end_into(QName(&end), &mut skip_buf)?;
                    skip_buf.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" if in_sheet_data => scan.row(attr_value(&e, b"r")?),
                b"c" if in_sheet_data => scan.cell(attr_value(&e, b"r")?, sheet)?,
                b"sheetData" => break,
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let result = scan.finish();
    debug!("sheet '{}': scanned dimension {:?}", sheet, result.range());
    Ok(result)
}

#[derive(Debug, Default)]
struct CellScan {
    row: Option<u32>,
    next_col: u32,
    max_row: Option<u32>,
    max_col: Option<u32>,
    saw_explicit: bool,
    saw_ordinal: bool,
}

impl CellScan {
    fn row(&mut self, r: Option<String>) {
        let index = match r.and_then(|v| v.trim().parse::<u32>().ok()) {
            Some(n) if n > 0 => n - 1,
            _ => self.row.map_or(0, |r| r + 1),
        };
        self.row = Some(index);
        self.next_col = 0;
        self.max_row = self.max_row.max(Some(index));
    }

    fn cell(&mut self, r: Option<String>, sheet: &str) -> XlsxResult<()> {
        let (col, row) = match r {
            Some(text) => {
                self.saw_explicit = true;
                let (col, row) = parse_address(&text)?;
                (col, row)
            }
            None => {
                self.saw_ordinal = true;
                (self.next_col, self.row.unwrap_or(0))
            }
        };
        if self.saw_explicit && self.saw_ordinal {
            return Err(XlsxError::MixedCellAddressing {
                sheet: sheet.to_string(),
                row: row + 1,
            });
        }
        self.next_col = col + 1;
        self.max_row = self.max_row.max(Some(row));
        self.max_col = self.max_col.max(Some(col));
        Ok(())
    }

    fn finish(self) -> DimensionResult {
        DimensionResult {
            max_row_index: self.max_row,
            max_column_index: self.max_col,
            explicit_cell_refs: !self.saw_ordinal,
            declared: false,
        }
    }
}

/// Merge regions of one worksheet, expanded cell by cell
///
/// Every covered cell maps to exactly one anchor (the region's top-left cell); anchors are
/// not in the covered map. Anchor values are captured as the main pass decodes them.
#[derive(Debug, Clone, Default)]
pub struct MergeRegistry {
    anchors: AHashMap<CellAddress, Option<CellValue>>,
    covered: AHashMap<CellAddress, CellAddress>,
    regions: Vec<CellRange>,
}

impl MergeRegistry {
    /// Register one merge region
    pub fn add_region(&mut self, region: CellRange) {
        let anchor = region.start;
        self.anchors.entry(anchor).or_insert(None);
        for cell in region.cells() {
            if cell != anchor {
                self.covered.insert(cell, anchor);
            }
        }
        self.regions.push(region);
    }

    /// Declared regions, in file order
    pub fn regions(&self) -> &[CellRange] {
        &self.regions
    }

    /// Whether the sheet has no merges
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Whether `cell` is the top-left cell of a region
    pub fn is_anchor(&self, cell: &CellAddress) -> bool {
        self.anchors.contains_key(cell)
    }

    /// Anchor of the region covering `cell` (anchors themselves give `None`)
    pub fn anchor_of(&self, cell: &CellAddress) -> Option<CellAddress> {
        self.covered.get(cell).copied()
    }

    /// Record the decoded value of an anchor cell
    pub fn set_anchor_value(&mut self, anchor: CellAddress, value: CellValue) {
        if let Some(slot) = self.anchors.get_mut(&anchor) {
            *slot = Some(value);
        }
    }

    /// Value a covered cell inherits, once its anchor has been decoded
    pub fn value_for(&self, cell: &CellAddress) -> Option<&CellValue> {
        let anchor = self.covered.get(cell)?;
        self.anchors.get(anchor)?.as_ref()
    }
}

/// Read the `<mergeCells>` block. `<sheetData>` is skipped structurally and reading
/// stops at the end of the block.
pub fn scan_merges<R: Read>(reader: R, sheet: &str) -> XlsxResult<MergeRegistry> {
    let mut xml = Reader::from_reader(BufReader::new(reader));
    xml.trim_text(true);

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    let mut registry = MergeRegistry::default();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                let end = e.name().as_ref().to_vec();
                xml.read_to_end_into(QName(&end), &mut skip_buf)?;
                skip_buf.clear();
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"mergeCell" => {
                if let Some(value) = attr_value(&e, b"ref")? {
                    match CellRange::parse(&value) {
                        Ok(region) => registry.add_region(region),
                        Err(err) => debug!("sheet '{}': skipping merge '{}': {}", sheet, value, err),
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"mergeCells" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(
        "sheet '{}': {} merge regions",
        sheet,
        registry.regions().len()
    );
    Ok(registry)
}
