//! Hand-built packages for the integration tests

#![allow(dead_code)]

use std::io::{Cursor, Write};

use sheetstream::prelude::*;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// A minimal package holding the given `(name, worksheet xml)` pairs and, optionally,
/// a shared-strings part
pub fn package(sheets: &[(&str, &str)], shared_strings: Option<&str>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#,
    )
    .unwrap();
    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#)
        .unwrap();

    let mut workbook = format!(
        r#"<workbook xmlns="{}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        MAIN_NS
    );
    let mut rels = String::from(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            name,
            i + 1,
            i + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
    }
    if shared_strings.is_some() {
        rels.push_str(r#"<Relationship Id="rId100" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#);
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", options).unwrap();
    zip.write_all(workbook.as_bytes()).unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    zip.write_all(rels.as_bytes()).unwrap();
    for (i, (_, xml)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1).as_str(), options)
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
    }
    if let Some(sst) = shared_strings {
        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        zip.write_all(sst.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Worksheet XML around the given body (dimension, sheetData, mergeCells, ...)
pub fn worksheet(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{}">{}</worksheet>"#,
        MAIN_NS, body
    )
}

/// Shared-strings part with the given entries
pub fn shared_strings(entries: &[&str]) -> String {
    let mut xml = format!(
        r#"<sst xmlns="{}" count="{}" uniqueCount="{}">"#,
        MAIN_NS,
        entries.len(),
        entries.len()
    );
    for entry in entries {
        xml.push_str(&format!("<si><t>{}</t></si>", entry));
    }
    xml.push_str("</sst>");
    xml
}

/// Read every row of a sheet
pub fn read_all(bytes: Vec<u8>, options: ReadOptions, sheet: Option<&str>, query: &QueryOptions) -> Vec<Row> {
    let mut doc = XlsxDocument::from_bytes(bytes, options).unwrap();
    let rows = doc
        .rows(sheet, query)
        .unwrap()
        .collect::<XlsxResult<Vec<_>>>()
        .unwrap();
    rows
}

/// Raw (decompressed) content of one entry
pub fn entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut content = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut content).unwrap();
    content
}
