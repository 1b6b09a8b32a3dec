//! The OpenXML package: ZIP container access, package-level parts and assembly

pub mod assembler;
mod container;
pub mod parts;

use std::io::{Read, Seek};

use log::debug;

pub use container::{
    EntryOutput, EntryWriter, PackageReader, PackageSource, PackageUpdater, PackageWriter,
    ReadSeek,
};
pub use parts::{SheetRecord, SheetState, BINARY_SENTINEL};

use crate::error::{XlsxError, XlsxResult};
use parts::{
    parse_relationships, parse_workbook, rels_path_for, resolve_target, Relationship,
    CONTENT_TYPES_PART, DEFAULT_WORKBOOK_PART, REL_OFFICE_DOCUMENT, REL_SHARED_STRINGS,
    REL_STYLES, REL_WORKSHEET, ROOT_RELS_PART,
};

/// What a package declares about its workbook, resolved to part paths
#[derive(Debug, Clone)]
pub(crate) struct Manifest {
    pub workbook_part: String,
    pub sheets: Vec<SheetRecord>,
    pub workbook_rels: Vec<Relationship>,
    pub date1904: bool,
}

impl Manifest {
    /// Part path of the first non-external relationship of `rel_type`
    pub fn part_for(&self, rel_type: &str) -> Option<String> {
        self.workbook_rels
            .iter()
            .find(|r| r.is(rel_type) && !r.is_external())
            .map(|r| resolve_target(&self.workbook_part, &r.target))
    }

    pub fn styles_part(&self) -> Option<String> {
        self.part_for(REL_STYLES)
    }

    pub fn shared_strings_part(&self) -> Option<String> {
        self.part_for(REL_SHARED_STRINGS)
    }
}

/// Locate the workbook part and resolve every worksheet's path
pub(crate) fn read_manifest<R: Read + Seek>(
    package: &mut PackageReader<R>,
) -> XlsxResult<Manifest> {
    if !package.contains(CONTENT_TYPES_PART) {
        return Err(XlsxError::ContainerFormat(format!(
            "not an OpenXML package: {} is missing",
            CONTENT_TYPES_PART
        )));
    }

    let root_rels = match package.open_optional(ROOT_RELS_PART)? {
        Some(entry) => parse_relationships(entry)?,
        None => Vec::new(),
    };
    let workbook_part = root_rels
        .iter()
        .find(|r| r.is(REL_OFFICE_DOCUMENT) && !r.is_external())
        .map(|r| resolve_target("", &r.target))
        .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());

    let info = match package.open_optional(&workbook_part)? {
        Some(entry) => parse_workbook(entry)?,
        None => return Err(XlsxError::PartNotFound(workbook_part)),
    };
    let workbook_rels = match package.open_optional(&rels_path_for(&workbook_part))? {
        Some(entry) => parse_relationships(entry)?,
        None => Vec::new(),
    };

    let mut sheets = Vec::with_capacity(info.sheets.len());
    for mut sheet in info.sheets {
        match workbook_rels
            .iter()
            .find(|r| r.id == sheet.rid && r.is(REL_WORKSHEET))
        {
            Some(rel) => {
                sheet.path = resolve_target(&workbook_part, &rel.target);
                sheets.push(sheet);
            }
            // Chart sheets and dialog sheets have no cell grid
            None => debug!("sheet '{}' is not a worksheet, ignored", sheet.name),
        }
    }

    debug!(
        "workbook {}: {} worksheets, date1904={}",
        workbook_part,
        sheets.len(),
        info.date1904
    );
    Ok(Manifest {
        workbook_part,
        sheets,
        workbook_rels,
        date1904: info.date1904,
    })
}
