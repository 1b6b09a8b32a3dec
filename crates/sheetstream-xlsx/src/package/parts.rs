//! Package-level parts: relationships, content types, workbook sheet list

use std::io::{BufReader, Read, Write};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::Writer;

use crate::error::XlsxResult;
use crate::xml::{attr_value, escape_xml, NS_MAIN, NS_RELATIONSHIPS, XML_DECLARATION};

pub(crate) const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub(crate) const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";

pub(crate) const CT_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";
pub(crate) const CT_XML: &str = "application/xml";
pub(crate) const CT_BIN: &str = "application/octet-stream";
pub(crate) const CT_WORKBOOK: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub(crate) const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub(crate) const CT_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
pub(crate) const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
pub(crate) const CT_DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PART: &str = "_rels/.rels";
pub(crate) const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

/// Prefix of a cell string that stands in for a sibling binary part
pub const BINARY_SENTINEL: &str = "@@@fileid@@@,";

/// Visibility of a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    /// Parse the `state` attribute; unknown values read as visible
    pub fn parse(s: &str) -> Self {
        match s {
            "hidden" => SheetState::Hidden,
            "veryHidden" => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }

    /// Attribute text
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetState::Visible => "visible",
            SheetState::Hidden => "hidden",
            SheetState::VeryHidden => "veryHidden",
        }
    }
}

/// One sheet listed by the workbook part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRecord {
    /// Sheet name
    pub name: String,
    /// Relationship id in the workbook relationships part
    pub rid: String,
    /// `sheetId` attribute
    pub sheet_id: u32,
    /// Visibility
    pub state: SheetState,
    /// Whether this is the workbook's active tab
    pub is_active: bool,
    /// Part path inside the package, resolved through the relationship
    pub path: String,
}

/// A relationship from a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    /// Match the type by its last segment, so transitional and strict URIs both match
    pub fn is(&self, rel_type: &str) -> bool {
        let suffix = rel_type.rsplit('/').next().unwrap_or(rel_type);
        self.rel_type
            .rsplit('/')
            .next()
            .map_or(false, |last| last == suffix)
    }

    pub fn is_external(&self) -> bool {
        self.target_mode.as_deref() == Some("External")
    }
}

/// Path of the relationships part belonging to `part`
pub(crate) fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the part that owns the relationship
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Express `part` relative to the directory of `source_part`
pub(crate) fn relative_target(source_part: &str, part: &str) -> String {
    let from: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let to: Vec<&str> = part.split('/').collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut segments: Vec<&str> = vec![".."; from.len() - common];
    segments.extend_from_slice(&to[common..]);
    segments.join("/")
}

pub(crate) fn parse_relationships<R: Read>(reader: R) -> XlsxResult<Vec<Relationship>> {
    let mut xml_reader = Reader::from_reader(BufReader::new(reader));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                let target = attr_value(&e, b"Target")?;
                let rel_type = attr_value(&e, b"Type")?;
                if let (Some(id), Some(target), Some(rel_type)) = (id, target, rel_type) {
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                        target_mode: attr_value(&e, b"TargetMode")?,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

pub(crate) fn relationships_xml(rels: &[Relationship]) -> String {
    let mut content = format!(
        "{}\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
        XML_DECLARATION
    );
    for rel in rels {
        content.push_str(&format!(
            "\n    <Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"",
            escape_xml(&rel.id),
            escape_xml(&rel.rel_type),
            escape_xml(&rel.target)
        ));
        if let Some(mode) = &rel.target_mode {
            content.push_str(&format!(" TargetMode=\"{}\"", escape_xml(mode)));
        }
        content.push_str("/>");
    }
    content.push_str("\n</Relationships>");
    content
}

/// First `rIdN` not used by `rels`
pub(crate) fn next_relationship_id(rels: &[Relationship]) -> String {
    let max = rels
        .iter()
        .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

/// Sheet list and workbook properties read from the workbook part
#[derive(Debug, Default)]
pub(crate) struct WorkbookInfo {
    /// Records in workbook order; `path` is still empty
    pub sheets: Vec<SheetRecord>,
    pub date1904: bool,
}

pub(crate) fn parse_workbook<R: Read>(reader: R) -> XlsxResult<WorkbookInfo> {
    let mut xml_reader = Reader::from_reader(BufReader::new(reader));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut info = WorkbookInfo::default();
    let mut active_tab = 0usize;

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr_value(&e, b"name")?.unwrap_or_default();
                    let sheet_id = attr_value(&e, b"sheetId")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    let rid = attr_value(&e, b"id")?.unwrap_or_default();
                    let state = attr_value(&e, b"state")?
                        .map(|s| SheetState::parse(&s))
                        .unwrap_or_default();
                    info.sheets.push(SheetRecord {
                        name,
                        rid,
                        sheet_id,
                        state,
                        is_active: false,
                        path: String::new(),
                    });
                }
                b"workbookPr" => {
                    info.date1904 = matches!(
                        attr_value(&e, b"date1904")?.as_deref(),
                        Some("1") | Some("true")
                    );
                }
                b"workbookView" => {
                    if let Some(tab) = attr_value(&e, b"activeTab")?.and_then(|v| v.parse().ok()) {
                        active_tab = tab;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(sheet) = info.sheets.get_mut(active_tab) {
        sheet.is_active = true;
    }
    Ok(info)
}

/// Workbook part for a package this crate assembles itself
pub(crate) fn workbook_xml(sheets: &[SheetRecord]) -> String {
    let mut content = format!(
        "{}\n<workbook xmlns=\"{}\" xmlns:r=\"{}\">\n    <bookViews>\n        <workbookView activeTab=\"{}\"/>\n    </bookViews>\n    <sheets>",
        XML_DECLARATION,
        NS_MAIN,
        NS_RELATIONSHIPS,
        sheets.iter().position(|s| s.is_active).unwrap_or(0)
    );
    for sheet in sheets {
        content.push_str(&sheet_element("", "r:id", sheet));
    }
    content.push_str("\n    </sheets>\n</workbook>");
    content
}

fn sheet_element(prefix: &str, rid_attr: &str, sheet: &SheetRecord) -> String {
    let mut element = format!(
        "\n        <{}sheet name=\"{}\" sheetId=\"{}\"",
        prefix,
        escape_xml(&sheet.name),
        sheet.sheet_id
    );
    if sheet.state != SheetState::Visible {
        element.push_str(&format!(" state=\"{}\"", sheet.state.as_str()));
    }
    element.push_str(&format!(" {}=\"{}\"/>", rid_attr, escape_xml(&sheet.rid)));
    element
}

/// Copy an existing workbook part, adding `sheet` to the end of its sheet list.
///
/// Everything else in the part (defined names, views, calc properties) is kept as is.
pub(crate) fn append_sheet_to_workbook(existing: &[u8], sheet: &SheetRecord) -> XlsxResult<Vec<u8>> {
    let mut reader = Reader::from_reader(existing);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(existing.len() + 128));

    let mut buf = Vec::new();
    let mut rel_prefix: Option<String> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) if e.local_name().as_ref() == b"workbook" => {
                for attr in e.attributes().flatten() {
                    let key = attr.key.as_ref();
                    if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                        if attr.unescape_value()? == NS_RELATIONSHIPS {
                            rel_prefix = Some(String::from_utf8_lossy(prefix).into_owned());
                        }
                    }
                }
                writer.write_event(&event)?;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheets" => {
                let prefix = element_prefix(e.name().as_ref());
                let element = sheet_with_rid(&prefix, rel_prefix.as_deref(), sheet);
                writer.get_mut().write_all(element.as_bytes())?;
                writer.write_event(&event)?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheets" => {
                let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let prefix = element_prefix(e.name().as_ref());
                let element = sheet_with_rid(&prefix, rel_prefix.as_deref(), sheet);
                let out = writer.get_mut();
                write!(out, "<{}>{}</{}>", qname, element, qname)?;
            }
            Event::Eof => break,
            _ => writer.write_event(&event)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn element_prefix(qname: &[u8]) -> String {
    match qname.iter().position(|&b| b == b':') {
        Some(i) => format!("{}:", String::from_utf8_lossy(&qname[..i])),
        None => String::new(),
    }
}

fn sheet_with_rid(prefix: &str, rel_prefix: Option<&str>, sheet: &SheetRecord) -> String {
    match rel_prefix {
        Some(p) => sheet_element(prefix, &format!("{}:id", p), sheet),
        None => {
            let element = sheet_element(prefix, "r:id", sheet);
            element.replacen(
                " r:id=",
                &format!(" xmlns:r=\"{}\" r:id=", NS_RELATIONSHIPS),
                1,
            )
        }
    }
}

/// `[Content_Types].xml`
#[derive(Debug, Clone, Default)]
pub(crate) struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Defaults every package needs
    pub fn new_package() -> Self {
        let mut types = Self::default();
        types.add_default("rels", CT_RELS);
        types.add_default("xml", CT_XML);
        types
    }

    pub fn parse<R: Read>(reader: R) -> XlsxResult<Self> {
        let mut xml_reader = Reader::from_reader(BufReader::new(reader));
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut types = Self::default();

        loop {
            match xml_reader.read_event_into(&mut buf)? {
                Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                    b"Default" => {
                        if let (Some(ext), Some(ct)) =
                            (attr_value(&e, b"Extension")?, attr_value(&e, b"ContentType")?)
                        {
                            types.add_default(&ext, &ct);
                        }
                    }
                    b"Override" => {
                        if let (Some(part), Some(ct)) =
                            (attr_value(&e, b"PartName")?, attr_value(&e, b"ContentType")?)
                        {
                            types.set_override(part.trim_start_matches('/'), &ct);
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(types)
    }

    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        if !self
            .defaults
            .iter()
            .any(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        {
            self.defaults
                .push((extension.to_string(), content_type.to_string()));
        }
    }

    /// Add or replace the override for `part` (given without a leading slash)
    pub fn set_override(&mut self, part: &str, content_type: &str) {
        match self.overrides.iter_mut().find(|(p, _)| p == part) {
            Some(entry) => entry.1 = content_type.to_string(),
            None => self
                .overrides
                .push((part.to_string(), content_type.to_string())),
        }
    }

    /// Keep only the overrides whose part passes `live`
    pub fn retain_overrides<F: Fn(&str) -> bool>(&mut self, live: F) {
        self.overrides.retain(|(part, _)| live(part));
    }

    pub fn override_for(&self, part: &str) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(p, _)| p == part)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn to_xml(&self) -> String {
        let mut content = format!(
            "{}\n<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
            XML_DECLARATION
        );
        for (ext, ct) in &self.defaults {
            content.push_str(&format!(
                "\n    <Default Extension=\"{}\" ContentType=\"{}\"/>",
                escape_xml(ext),
                escape_xml(ct)
            ));
        }
        for (part, ct) in &self.overrides {
            content.push_str(&format!(
                "\n    <Override PartName=\"/{}\" ContentType=\"{}\"/>",
                escape_xml(part),
                escape_xml(ct)
            ));
        }
        content.push_str("\n</Types>");
        content
    }
}

pub(crate) fn root_rels_xml(workbook_part: &str) -> String {
    relationships_xml(&[Relationship {
        id: "rId1".into(),
        rel_type: REL_OFFICE_DOCUMENT.into(),
        target: workbook_part.into(),
        target_mode: None,
    }])
}

pub(crate) fn shared_strings_stub_xml() -> String {
    format!(
        "{}\n<sst xmlns=\"{}\" count=\"0\" uniqueCount=\"0\"/>",
        XML_DECLARATION, NS_MAIN
    )
}

pub(crate) fn drawing_xml() -> String {
    format!(
        "{}\n<xdr:wsDr xmlns:xdr=\"http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"/>",
        XML_DECLARATION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../drawings/drawing1.xml"),
            "xl/drawings/drawing1.xml"
        );
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(
            relative_target("xl/workbook.xml", "xl/worksheets/sheet1.xml"),
            "worksheets/sheet1.xml"
        );
        assert_eq!(
            relative_target("xl/worksheets/sheet1.xml", "xl/drawings/drawing1.xml"),
            "../drawings/drawing1.xml"
        );
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(
            rels_path_for("xl/worksheets/sheet3.xml"),
            "xl/worksheets/_rels/sheet3.xml.rels"
        );
    }

    #[test]
    fn test_relationship_round_trip_and_type_suffix() {
        let rels = vec![
            Relationship {
                id: "rId1".into(),
                rel_type: REL_WORKSHEET.into(),
                target: "worksheets/sheet1.xml".into(),
                target_mode: None,
            },
            Relationship {
                id: "rId7".into(),
                rel_type: "http://purl.oclc.org/ooxml/officeDocument/relationships/styles".into(),
                target: "styles.xml".into(),
                target_mode: None,
            },
        ];
        let parsed = parse_relationships(relationships_xml(&rels).as_bytes()).unwrap();
        assert_eq!(parsed, rels);
        assert!(parsed[1].is(REL_STYLES));
        assert!(!parsed[0].is(REL_STYLES));
        assert_eq!(next_relationship_id(&parsed), "rId8");
    }

    #[test]
    fn test_parse_workbook() {
        let xml = r#"<?xml version="1.0"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <workbookPr date1904="1"/>
  <bookViews><workbookView activeTab="1"/></bookViews>
  <sheets>
    <sheet name="First" sheetId="1" r:id="rId1"/>
    <sheet name="Second &amp; more" sheetId="4" state="hidden" r:id="rId2"/>
  </sheets>
</workbook>"#;
        let info = parse_workbook(xml.as_bytes()).unwrap();
        assert!(info.date1904);
        assert_eq!(info.sheets.len(), 2);
        assert_eq!(info.sheets[1].name, "Second & more");
        assert_eq!(info.sheets[1].sheet_id, 4);
        assert_eq!(info.sheets[1].state, SheetState::Hidden);
        assert!(info.sheets[1].is_active);
        assert!(!info.sheets[0].is_active);
    }

    #[test]
    fn test_append_sheet_keeps_other_content() {
        let xml = r#"<?xml version="1.0"?><x:workbook xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:rel="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><x:sheets><x:sheet name="A" sheetId="1" rel:id="rId1"/></x:sheets><x:definedNames><x:definedName name="n">A!$A$1</x:definedName></x:definedNames></x:workbook>"#;
        let record = SheetRecord {
            name: "B".into(),
            rid: "rId9".into(),
            sheet_id: 2,
            state: SheetState::Visible,
            is_active: false,
            path: "xl/worksheets/sheet2.xml".into(),
        };
        let out = append_sheet_to_workbook(xml.as_bytes(), &record).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(r#"<x:sheet name="B" sheetId="2" rel:id="rId9"/></x:sheets>"#));
        assert!(out.contains("<x:definedName name=\"n\">A!$A$1</x:definedName>"));

        let info = parse_workbook(out.as_bytes()).unwrap();
        let names: Vec<_> = info.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(info.sheets[1].rid, "rId9");
    }

    #[test]
    fn test_content_types() {
        let mut types = ContentTypes::new_package();
        types.set_override("xl/workbook.xml", CT_WORKBOOK);
        types.set_override("xl/worksheets/sheet1.xml", CT_WORKSHEET);
        types.add_default("XML", CT_XML);

        let parsed = ContentTypes::parse(types.to_xml().as_bytes()).unwrap();
        assert_eq!(parsed.override_for("xl/workbook.xml"), Some(CT_WORKBOOK));

        let mut parsed = parsed;
        parsed.retain_overrides(|part| part != "xl/worksheets/sheet1.xml");
        assert_eq!(parsed.override_for("xl/worksheets/sheet1.xml"), None);
        assert_eq!(parsed.defaults.len(), 2);
    }
}
