//! Package assembly
//!
//! A new package gets its workbook-level parts written once every sheet is sealed. Inserting
//! a sheet into an existing package rewrites only the affected worksheet, its drawing, and
//! the workbook, relationship and content-type parts; every other entry is raw-copied.

use std::io::{Read, Seek, Write};

use log::debug;
use sheetstream_core::{CellValue, ColumnInfo, WriteOptions};

use crate::error::{XlsxError, XlsxResult};
use crate::package::parts::{
    append_sheet_to_workbook, drawing_xml, next_relationship_id, relationships_xml,
    relative_target, rels_path_for, resolve_target, root_rels_xml, shared_strings_stub_xml,
    workbook_xml, ContentTypes, Relationship, CONTENT_TYPES_PART, CT_BIN, CT_DRAWING,
    CT_SHARED_STRINGS, CT_STYLES, CT_WORKBOOK, CT_WORKSHEET, DEFAULT_WORKBOOK_PART, REL_DRAWING,
    REL_SHARED_STRINGS, REL_STYLES, REL_WORKSHEET, ROOT_RELS_PART,
};
use crate::package::{read_manifest, PackageReader, PackageUpdater, PackageWriter, SheetRecord, SheetState};
use crate::styles::StylesBuilder;
use crate::writer::{sheet_layout, validate_sheet_name, write_sheet_entry, DRAWING_RID};

/// Write the workbook-level parts of a package whose sheets have all been sealed
pub(crate) fn finalize_new_package<W: Write + Seek>(
    package: &mut PackageWriter<W>,
    sheets: &[SheetRecord],
    styles: &StylesBuilder,
    has_binaries: bool,
) -> XlsxResult<()> {
    let workbook = DEFAULT_WORKBOOK_PART;
    let styles_part = "xl/styles.xml";
    let shared_strings_part = "xl/sharedStrings.xml";

    package.write_entry(ROOT_RELS_PART, root_rels_xml(workbook).as_bytes())?;
    package.write_entry(shared_strings_part, shared_strings_stub_xml().as_bytes())?;
    package.write_entry(styles_part, styles.to_styles_xml().as_bytes())?;
    package.write_entry(workbook, workbook_xml(sheets).as_bytes())?;

    let mut rels: Vec<Relationship> = sheets
        .iter()
        .map(|sheet| Relationship {
            id: sheet.rid.clone(),
            rel_type: REL_WORKSHEET.to_string(),
            target: relative_target(workbook, &sheet.path),
            target_mode: None,
        })
        .collect();
    for (rel_type, part) in [(REL_STYLES, styles_part), (REL_SHARED_STRINGS, shared_strings_part)] {
        rels.push(Relationship {
            id: next_relationship_id(&rels),
            rel_type: rel_type.to_string(),
            target: relative_target(workbook, part),
            target_mode: None,
        });
    }
    package.write_entry(&rels_path_for(workbook), relationships_xml(&rels).as_bytes())?;

    let mut types = ContentTypes::new_package();
    if has_binaries {
        types.add_default("bin", CT_BIN);
    }
    types.set_override(workbook, CT_WORKBOOK);
    types.set_override(styles_part, CT_STYLES);
    types.set_override(shared_strings_part, CT_SHARED_STRINGS);
    for (i, sheet) in sheets.iter().enumerate() {
        let drawing = format!("xl/drawings/drawing{}.xml", i + 1);
        write_sheet_drawing(package, &sheet.path, &drawing)?;
        types.set_override(&sheet.path, CT_WORKSHEET);
        types.set_override(&drawing, CT_DRAWING);
    }
    package.write_entry(CONTENT_TYPES_PART, types.to_xml().as_bytes())?;

    debug!("assembled package with {} sheets", sheets.len());
    Ok(())
}

/// Empty drawing part for a sheet, plus the sheet's relationships part pointing at it
fn write_sheet_drawing<W: Write + Seek>(
    package: &mut PackageWriter<W>,
    sheet_part: &str,
    drawing_part: &str,
) -> XlsxResult<()> {
    package.write_entry(drawing_part, drawing_xml().as_bytes())?;
    let rels = [Relationship {
        id: DRAWING_RID.to_string(),
        rel_type: REL_DRAWING.to_string(),
        target: relative_target(sheet_part, drawing_part),
        target_mode: None,
    }];
    package.write_entry(&rels_path_for(sheet_part), relationships_xml(&rels).as_bytes())
}

/// Write `rows` as sheet `name` into a copy of the package read from `input`.
///
/// With `overwrite` an existing sheet of that name (compared ignoring case) is replaced in
/// place, keeping its position, id and visibility. Without it an existing name fails with
/// [`XlsxError::SheetAlreadyExists`] before anything is written. Returns the output and the
/// number of data rows written.
pub fn insert_sheet<R, W, I, Row>(
    input: R,
    output: W,
    name: &str,
    columns: &[ColumnInfo],
    rows: I,
    overwrite: bool,
    options: &WriteOptions,
) -> XlsxResult<(W, u64)>
where
    R: Read + Seek,
    W: Write + Seek,
    I: IntoIterator<Item = Row>,
    Row: IntoIterator<Item = CellValue>,
{
    try_insert_sheet(
        input,
        output,
        name,
        columns,
        rows.into_iter().map(Ok::<Row, XlsxError>),
        overwrite,
        options,
    )
}

/// [`insert_sheet`] for rows that may fail
pub fn try_insert_sheet<R, W, I, Row, E>(
    input: R,
    output: W,
    name: &str,
    columns: &[ColumnInfo],
    rows: I,
    overwrite: bool,
    options: &WriteOptions,
) -> XlsxResult<(W, u64)>
where
    R: Read + Seek,
    W: Write + Seek,
    I: IntoIterator<Item = Result<Row, E>>,
    Row: IntoIterator<Item = CellValue>,
    XlsxError: From<E>,
{
    options.validate().map_err(XlsxError::InvalidOptions)?;
    validate_sheet_name(name)?;

    let mut source = PackageReader::open(input)?.with_cancellation(options.cancellation.clone());
    let manifest = read_manifest(&mut source)?;
    let existing = manifest
        .sheets
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
        .cloned();
    if existing.is_some() && !overwrite {
        return Err(XlsxError::SheetAlreadyExists(name.to_string()));
    }

    let workbook = manifest.workbook_part.clone();
    let base_dir = match workbook.rsplit_once('/') {
        Some((dir, _)) => format!("{}/", dir),
        None => String::new(),
    };

    let mut types = match source.open_optional(CONTENT_TYPES_PART)? {
        Some(entry) => ContentTypes::parse(entry)?,
        None => ContentTypes::new_package(),
    };

    // Drawings and binary parts of the sheet being replaced
    let mut stale_parts = Vec::new();
    if let Some(old) = &existing {
        let old_rels = rels_path_for(&old.path);
        if let Some(entry) = source.open_optional(&old_rels)? {
            for rel in crate::package::parts::parse_relationships(entry)? {
                if rel.is(REL_DRAWING) && !rel.is_external() {
                    let drawing = resolve_target(&old.path, &rel.target);
                    stale_parts.push(rels_path_for(&drawing));
                    stale_parts.push(drawing);
                }
            }
        }
        stale_parts.push(old_rels);
    }

    let record = match &existing {
        Some(old) => old.clone(),
        None => {
            let mut number = 1;
            while source.contains(&format!("{}worksheets/sheet{}.xml", base_dir, number))
                || manifest
                    .sheets
                    .iter()
                    .any(|s| s.path == format!("{}worksheets/sheet{}.xml", base_dir, number))
            {
                number += 1;
            }
            SheetRecord {
                name: name.to_string(),
                rid: next_relationship_id(&manifest.workbook_rels),
                sheet_id: manifest.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1,
                state: SheetState::Visible,
                is_active: false,
                path: format!("{}worksheets/sheet{}.xml", base_dir, number),
            }
        }
    };
    let sheet_number = sheet_file_number(&record.path).unwrap_or(record.sheet_id);
    if existing.is_some() {
        let blobs = format!("xl/media/sheet{}_blob", sheet_number);
        stale_parts.extend(source.entries_with_prefix(&blobs).map(str::to_string));
    }

    let existing_styles = match manifest.styles_part() {
        Some(part) if source.contains(&part) => Some((source.read_entry(&part)?, part)),
        _ => None,
    };
    let (mut styles, styles_part) = match &existing_styles {
        Some((bytes, part)) => (StylesBuilder::extending(bytes)?, part.clone()),
        None => (StylesBuilder::new(), format!("{}styles.xml", base_dir)),
    };

    let workbook_bytes = if existing.is_none() {
        Some(source.read_entry(&workbook)?)
    } else {
        None
    };

    let target = PackageWriter::create(output, options.entry_mode, options.compression)
        .with_cancellation(options.cancellation.clone());
    let mut updater = PackageUpdater::new(source, target);
    for part in &stale_parts {
        updater.delete_entry(part);
    }

    let layout = sheet_layout(name, sheet_number, columns, &mut styles, record.is_active);
    let outcome = write_sheet_entry(updater.target(), &record.path, &layout, options, rows)?;

    let mut drawing_number = 1;
    let drawing = loop {
        let candidate = format!("{}drawings/drawing{}.xml", base_dir, drawing_number);
        if !updater.is_live(&candidate) {
            break candidate;
        }
        drawing_number += 1;
    };
    write_sheet_drawing(updater.target(), &record.path, &drawing)?;

    let styles_xml = match &existing_styles {
        Some((bytes, _)) => styles.extend_styles_xml(bytes)?,
        None => styles.to_styles_xml().into_bytes(),
    };
    updater.target().write_entry(&styles_part, &styles_xml)?;

    if let Some(bytes) = &workbook_bytes {
        let updated = append_sheet_to_workbook(bytes, &record)?;
        updater.target().write_entry(&workbook, &updated)?;
    }

    let mut rels = manifest.workbook_rels.clone();
    if existing.is_none() {
        rels.push(Relationship {
            id: record.rid.clone(),
            rel_type: REL_WORKSHEET.to_string(),
            target: relative_target(&workbook, &record.path),
            target_mode: None,
        });
    }
    if existing_styles.is_none() {
        rels.push(Relationship {
            id: next_relationship_id(&rels),
            rel_type: REL_STYLES.to_string(),
            target: relative_target(&workbook, &styles_part),
            target_mode: None,
        });
    }
    updater
        .target()
        .write_entry(&rels_path_for(&workbook), relationships_xml(&rels).as_bytes())?;

    types.retain_overrides(|part| updater.is_live(part));
    types.set_override(&record.path, CT_WORKSHEET);
    types.set_override(&drawing, CT_DRAWING);
    types.set_override(&styles_part, CT_STYLES);
    if types.override_for(&workbook).is_none() {
        types.set_override(&workbook, CT_WORKBOOK);
    }
    if !outcome.binaries.is_empty() {
        types.add_default("bin", CT_BIN);
    }
    updater
        .target()
        .write_entry(CONTENT_TYPES_PART, types.to_xml().as_bytes())?;

    let output = updater.finish()?;
    debug!(
        "{} sheet '{}' at {} ({} rows)",
        if existing.is_some() { "replaced" } else { "inserted" },
        record.name,
        record.path,
        outcome.rows_written
    );
    Ok((output, outcome.rows_written))
}

/// `N` in `.../sheetN.xml`
fn sheet_file_number(path: &str) -> Option<u32> {
    let file = path.rsplit('/').next()?;
    file.strip_prefix("sheet")?.strip_suffix(".xml")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::XlsxDocument;
    use crate::writer::WorkbookWriter;
    use sheetstream_core::{QueryOptions, ReadOptions};
    use std::io::Cursor;

    fn two_sheets() -> Vec<u8> {
        let mut writer =
            WorkbookWriter::create(Cursor::new(Vec::new()), WriteOptions::default()).unwrap();
        let columns = [ColumnInfo::new("Value")];
        writer
            .add_sheet("A", &columns, vec![vec![CellValue::from(1)]])
            .unwrap();
        writer
            .add_sheet("B", &columns, vec![vec![CellValue::from(2)]])
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_new_package_parts() {
        let bytes = two_sheets();
        let mut package = PackageReader::open(Cursor::new(bytes)).unwrap();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/styles.xml",
            "xl/sharedStrings.xml",
            "xl/worksheets/sheet1.xml",
            "xl/worksheets/sheet2.xml",
            "xl/worksheets/_rels/sheet2.xml.rels",
            "xl/drawings/drawing2.xml",
        ] {
            assert!(package.contains(part), "missing {}", part);
        }
        let types = String::from_utf8(package.read_entry("[Content_Types].xml").unwrap()).unwrap();
        assert!(types.contains("/xl/worksheets/sheet2.xml"));
        assert!(types.contains("/xl/drawings/drawing1.xml"));
    }

    #[test]
    fn test_insert_new_sheet() {
        let (output, rows) = insert_sheet(
            Cursor::new(two_sheets()),
            Cursor::new(Vec::new()),
            "C",
            &[ColumnInfo::new("Name")],
            vec![vec![CellValue::string("x")], vec![CellValue::string("y")]],
            false,
            &WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(rows, 2);

        let mut doc = XlsxDocument::from_bytes(output.into_inner(), ReadOptions::default()).unwrap();
        assert_eq!(doc.sheet_names(), vec!["A", "B", "C"]);
        let record = doc.sheet("C").unwrap().clone();
        assert_eq!(record.path, "xl/worksheets/sheet3.xml");
        assert_eq!(record.sheet_id, 3);

        let rows: Vec<_> = doc
            .rows(Some("C"), &QueryOptions::with_header())
            .unwrap()
            .collect::<XlsxResult<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("Name"), Some(&CellValue::string("y")));
    }

    #[test]
    fn test_existing_name_without_overwrite() {
        let mut output = Cursor::new(Vec::new());
        let err = insert_sheet(
            Cursor::new(two_sheets()),
            &mut output,
            "b",
            &[ColumnInfo::new("Name")],
            Vec::<Vec<CellValue>>::new(),
            false,
            &WriteOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, XlsxError::SheetAlreadyExists(_)));
        assert!(output.get_ref().is_empty());
    }

    #[test]
    fn test_overwrite_keeps_record() {
        let (output, _) = insert_sheet(
            Cursor::new(two_sheets()),
            Cursor::new(Vec::new()),
            "B",
            &[ColumnInfo::new("Other")],
            vec![vec![CellValue::from(true)]],
            true,
            &WriteOptions::default(),
        )
        .unwrap();

        let mut doc = XlsxDocument::from_bytes(output.into_inner(), ReadOptions::default()).unwrap();
        assert_eq!(doc.sheet_names(), vec!["A", "B"]);
        assert_eq!(doc.sheet("B").unwrap().path, "xl/worksheets/sheet2.xml");
        let rows: Vec<_> = doc
            .rows(Some("B"), &QueryOptions::with_header())
            .unwrap()
            .collect::<XlsxResult<_>>()
            .unwrap();
        assert_eq!(rows[0].get("Other"), Some(&CellValue::Bool(true)));
    }

    #[test]
    fn test_overwrite_drops_leftover_binary_parts() {
        let mut writer =
            WorkbookWriter::create(Cursor::new(Vec::new()), WriteOptions::default()).unwrap();
        let columns = [ColumnInfo::new("Blob")];
        writer
            .add_sheet("A", &columns, vec![vec![CellValue::from(1)]])
            .unwrap();
        writer
            .add_sheet(
                "B",
                &columns,
                vec![vec![CellValue::Bytes(vec![1])], vec![CellValue::Bytes(vec![2, 2])]],
            )
            .unwrap();
        let original = writer.finish().unwrap().into_inner();
        let package = PackageReader::open(Cursor::new(original.clone())).unwrap();
        assert!(package.contains("xl/media/sheet2_blob2.bin"));

        let (output, _) = insert_sheet(
            Cursor::new(original),
            Cursor::new(Vec::new()),
            "B",
            &columns,
            vec![vec![CellValue::Bytes(vec![3, 3, 3])]],
            true,
            &WriteOptions::default(),
        )
        .unwrap();

        let mut package = PackageReader::open(Cursor::new(output.into_inner())).unwrap();
        assert_eq!(package.read_entry("xl/media/sheet2_blob1.bin").unwrap(), vec![3, 3, 3]);
        assert!(!package.contains("xl/media/sheet2_blob2.bin"));
    }

    #[test]
    fn test_sheet_file_number() {
        assert_eq!(sheet_file_number("xl/worksheets/sheet12.xml"), Some(12));
        assert_eq!(sheet_file_number("xl/worksheets/data.xml"), None);
    }
}
