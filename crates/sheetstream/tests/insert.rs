//! Adding and replacing sheets in existing packages

mod common;

use std::io::Cursor;

use common::{entry, read_all};
use pretty_assertions::assert_eq;
use sheetstream::prelude::*;

fn two_sheet_workbook() -> Vec<u8> {
    let mut writer = WorkbookWriter::create(Cursor::new(Vec::new()), WriteOptions::default()).unwrap();
    writer
        .add_sheet(
            "A",
            &[ColumnInfo::new("City"), ColumnInfo::new("Population")],
            vec![
                vec![CellValue::from("Oslo"), CellValue::from(709_000)],
                vec![CellValue::from("Bergen"), CellValue::from(291_000)],
            ],
        )
        .unwrap();
    writer
        .add_sheet("B", &[ColumnInfo::new("Old")], vec![vec![CellValue::from(1)]])
        .unwrap();
    writer.finish().unwrap().into_inner()
}

fn insert(
    bytes: &[u8],
    name: &str,
    rows: Vec<Vec<CellValue>>,
    overwrite: bool,
) -> XlsxResult<Vec<u8>> {
    let (output, _) = sheetstream::insert_sheet(
        Cursor::new(bytes),
        Cursor::new(Vec::new()),
        name,
        &[ColumnInfo::new("New")],
        rows,
        overwrite,
        &WriteOptions::default(),
    )?;
    Ok(output.into_inner())
}

#[test]
fn test_overwrite_leaves_other_sheets_untouched() {
    let original = two_sheet_workbook();
    let updated = insert(&original, "B", vec![vec![CellValue::from("fresh")]], true).unwrap();

    assert_eq!(
        entry(&original, "xl/worksheets/sheet1.xml"),
        entry(&updated, "xl/worksheets/sheet1.xml")
    );
    assert_eq!(
        read_all(original, ReadOptions::default(), Some("A"), &QueryOptions::with_header()),
        read_all(updated.clone(), ReadOptions::default(), Some("A"), &QueryOptions::with_header())
    );

    let rows = read_all(updated, ReadOptions::default(), Some("B"), &QueryOptions::with_header());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].keys(), &["New"]);
    assert_eq!(rows[0].get("New"), Some(&CellValue::string("fresh")));
}

#[test]
fn test_insert_appends_sheet() {
    let original = two_sheet_workbook();
    let updated = insert(
        &original,
        "C",
        vec![vec![CellValue::from(1)], vec![CellValue::from(2)]],
        false,
    )
    .unwrap();

    let mut doc = XlsxDocument::from_bytes(updated.clone(), ReadOptions::default()).unwrap();
    assert_eq!(doc.sheet_names(), vec!["A", "B", "C"]);
    assert_eq!(doc.dimension(Some("C")).unwrap().range().unwrap().to_string(), "A1:A3");

    for part in ["xl/worksheets/sheet1.xml", "xl/worksheets/sheet2.xml"] {
        assert_eq!(entry(&original, part), entry(&updated, part));
    }
    let types = String::from_utf8(entry(&updated, "[Content_Types].xml")).unwrap();
    assert!(types.contains(r#"PartName="/xl/worksheets/sheet3.xml""#));
    let rels = String::from_utf8(entry(&updated, "xl/_rels/workbook.xml.rels")).unwrap();
    assert!(rels.contains(r#"Target="worksheets/sheet3.xml""#));
}

#[test]
fn test_existing_name_is_refused() {
    let original = two_sheet_workbook();
    let err = insert(&original, "A", Vec::new(), false).unwrap_err();
    assert!(matches!(err, XlsxError::SheetAlreadyExists(name) if name == "A"));
}

#[test]
fn test_insert_into_hand_built_package() {
    let sheet = common::worksheet(
        r#"<dimension ref="A1:A1"/><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c></row></sheetData>"#,
    );
    let original = common::package(&[("Only", &sheet)], Some(&common::shared_strings(&["kept"])));
    let updated = insert(&original, "Added", vec![vec![CellValue::from(true)]], false).unwrap();

    // No styles part before: one is created and linked
    let rels = String::from_utf8(entry(&updated, "xl/_rels/workbook.xml.rels")).unwrap();
    assert!(rels.contains("styles.xml"));

    let rows = read_all(updated.clone(), ReadOptions::default(), Some("Only"), &QueryOptions::default());
    assert_eq!(rows[0].get("A"), Some(&CellValue::string("kept")));
    let rows = read_all(updated, ReadOptions::default(), Some("Added"), &QueryOptions::with_header());
    assert_eq!(rows[0].get("New"), Some(&CellValue::Bool(true)));
}

#[test]
fn test_insert_sheet_file_replaces_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    std::fs::write(&path, two_sheet_workbook()).unwrap();

    let written = sheetstream::insert_sheet_file(
        &path,
        "Totals",
        &[ColumnInfo::new("Sum")],
        vec![vec![CellValue::from(1_000_000)]],
        false,
        &WriteOptions::default(),
    )
    .unwrap();
    assert_eq!(written, 1);

    let doc = XlsxDocument::open_path(&path, ReadOptions::default()).unwrap();
    assert_eq!(doc.sheet_names(), vec!["A", "B", "Totals"]);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_failed_insert_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    let original = two_sheet_workbook();
    std::fs::write(&path, &original).unwrap();

    let rows = vec![
        Ok(vec![CellValue::from("kept?")]),
        Err(XlsxError::Cancelled),
    ];
    let err = sheetstream::try_insert_sheet_file(
        &path,
        "Partial",
        &[ColumnInfo::new("Value")],
        rows,
        false,
        &WriteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, XlsxError::Cancelled));

    assert_eq!(std::fs::read(&path).unwrap(), original);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
