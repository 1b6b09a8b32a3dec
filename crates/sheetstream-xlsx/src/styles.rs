//! XLSX styles (styles.xml) read/write helpers
//!
//! Reading only needs to know which cell formats display numbers as dates. Writing needs
//! a handful of formats (bold header, date-time, per-column custom number formats), added
//! either to a fresh style sheet or on top of an existing one.

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::Writer;
use sheetstream_core::NumberFormat;

use crate::error::XlsxResult;
use crate::xml::{attr_value, escape_xml, NS_MAIN, XML_DECLARATION};

// === Reading ===

/// Per-`cellXfs` entry flag: does the format display a date/time?
#[derive(Debug, Clone, Default)]
pub(crate) struct StyleTable {
    date_styles: Vec<bool>,
}

impl StyleTable {
    pub(crate) fn parse<R: Read>(reader: R) -> XlsxResult<Self> {
        let mut xml_reader = Reader::from_reader(BufReader::new(reader));
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut custom: HashMap<u32, String> = HashMap::new();
        let mut xf_formats: Vec<u32> = Vec::new();
        let mut in_cell_xfs = false;

        loop {
            match xml_reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"numFmt" => {
                        let id = attr_value(&e, b"numFmtId")?.and_then(|v| v.parse().ok());
                        let code = attr_value(&e, b"formatCode")?;
                        if let (Some(id), Some(code)) = (id, code) {
                            custom.insert(id, code);
                        }
                    }
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        let id = attr_value(&e, b"numFmtId")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        xf_formats.push(id);
                    }
                    _ => {}
                },
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let date_styles = xf_formats
            .into_iter()
            .map(|id| match custom.get(&id) {
                Some(code) => NumberFormat::from_string(code.as_str()).is_date_format(),
                None => NumberFormat::from_id(id).is_date_format(),
            })
            .collect();

        Ok(Self { date_styles })
    }

    /// Whether cells with style index `s` display as dates
    pub(crate) fn is_date(&self, style: usize) -> bool {
        self.date_styles.get(style).copied().unwrap_or(false)
    }
}

// === Writing ===

const BOLD_FONT: &str = r#"<font><b/><sz val="11"/><name val="Calibri"/><family val="2"/></font>"#;

/// Counts found in a style sheet before this crate adds to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StyleBase {
    fonts: u32,
    cell_xfs: u32,
    next_num_fmt: u32,
}

impl StyleBase {
    fn fresh() -> Self {
        Self {
            fonts: 1,
            cell_xfs: 1,
            next_num_fmt: NumberFormat::FIRST_CUSTOM_ID,
        }
    }

    fn scan(xml: &[u8]) -> XlsxResult<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut base = Self {
            fonts: 0,
            cell_xfs: 0,
            next_num_fmt: NumberFormat::FIRST_CUSTOM_ID,
        };
        // Depth of the enclosing list element, so nested `font`/`xf` are not counted
        let mut list: Option<(&'static [u8], usize)> = None;
        let mut depth = 0usize;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match &event {
                Event::Start(e) | Event::Empty(e) => {
                    let local = e.local_name();
                    let name = local.as_ref();
                    match (list, name) {
                        (Some((b"fonts", d)), b"font") if depth == d + 1 => base.fonts += 1,
                        (Some((b"cellXfs", d)), b"xf") if depth == d + 1 => base.cell_xfs += 1,
                        (None, b"fonts") if matches!(event, Event::Start(_)) => {
                            list = Some((b"fonts", depth))
                        }
                        (None, b"cellXfs") if matches!(event, Event::Start(_)) => {
                            list = Some((b"cellXfs", depth))
                        }
                        (_, b"numFmt") => {
                            if let Some(id) =
                                attr_value(e, b"numFmtId")?.and_then(|v| v.parse::<u32>().ok())
                            {
                                base.next_num_fmt = base.next_num_fmt.max(id + 1);
                            }
                        }
                        _ => {}
                    }
                    if matches!(event, Event::Start(_)) {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if let Some((_, d)) = list {
                        if depth == d {
                            list = None;
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct XfKey {
    num_fmt_id: u32,
    bold: bool,
}

/// Cell formats added by the writer, numbered after whatever the style sheet already has
#[derive(Debug, Clone)]
pub(crate) struct StylesBuilder {
    base: StyleBase,
    custom_formats: Vec<(u32, String)>,
    xfs: Vec<XfKey>,
    lookup: HashMap<XfKey, u32>,
}

impl StylesBuilder {
    /// Builder for a package that has no style sheet yet
    pub(crate) fn new() -> Self {
        Self::with_base(StyleBase::fresh())
    }

    /// Builder that will extend the style sheet `existing`
    pub(crate) fn extending(existing: &[u8]) -> XlsxResult<Self> {
        Ok(Self::with_base(StyleBase::scan(existing)?))
    }

    fn with_base(base: StyleBase) -> Self {
        Self {
            base,
            custom_formats: Vec::new(),
            xfs: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    fn num_fmt_id(&mut self, format: &NumberFormat) -> u32 {
        match format {
            NumberFormat::General => 0,
            NumberFormat::BuiltIn(id) => *id,
            NumberFormat::Custom(code) => {
                if let Some((id, _)) = self.custom_formats.iter().find(|(_, c)| c == code) {
                    return *id;
                }
                let id = self.base.next_num_fmt + self.custom_formats.len() as u32;
                self.custom_formats.push((id, code.clone()));
                id
            }
        }
    }

    /// Cell format index for `format`, optionally bold
    pub(crate) fn xf_for(&mut self, format: &NumberFormat, bold: bool) -> u32 {
        let key = XfKey {
            num_fmt_id: self.num_fmt_id(format),
            bold,
        };
        if !bold && key.num_fmt_id == 0 && self.base == StyleBase::fresh() {
            return 0;
        }
        if let Some(&xf) = self.lookup.get(&key) {
            return xf;
        }
        let xf = self.base.cell_xfs + self.xfs.len() as u32;
        self.xfs.push(key);
        self.lookup.insert(key, xf);
        xf
    }

    pub(crate) fn header_xf(&mut self) -> u32 {
        self.xf_for(&NumberFormat::General, true)
    }

    pub(crate) fn datetime_xf(&mut self) -> u32 {
        self.xf_for(&NumberFormat::BuiltIn(NumberFormat::ID_DATETIME), false)
    }

    fn bold_font_id(&self) -> u32 {
        self.base.fonts
    }

    fn num_fmt_elements(&self, prefix: &str) -> String {
        let mut xml = String::new();
        for (id, code) in &self.custom_formats {
            xml.push_str(&format!(
                "<{}numFmt numFmtId=\"{}\" formatCode=\"{}\"/>",
                prefix,
                id,
                escape_xml(code)
            ));
        }
        xml
    }

    fn xf_elements(&self, prefix: &str) -> String {
        let mut xml = String::new();
        for key in &self.xfs {
            let font_id = if key.bold { self.bold_font_id() } else { 0 };
            xml.push_str(&format!(
                "<{}xf numFmtId=\"{}\" fontId=\"{}\" fillId=\"0\" borderId=\"0\" xfId=\"0\"",
                prefix, key.num_fmt_id, font_id
            ));
            if key.num_fmt_id != 0 {
                xml.push_str(" applyNumberFormat=\"1\"");
            }
            if key.bold {
                xml.push_str(" applyFont=\"1\"");
            }
            xml.push_str("/>");
        }
        xml
    }

    /// A complete style sheet for a new package
    pub(crate) fn to_styles_xml(&self) -> String {
        let mut xml = format!("{}\n<styleSheet xmlns=\"{}\">", XML_DECLARATION, NS_MAIN);

        if !self.custom_formats.is_empty() {
            xml.push_str(&format!(
                "\n  <numFmts count=\"{}\">{}</numFmts>",
                self.custom_formats.len(),
                self.num_fmt_elements("")
            ));
        }

        xml.push_str(&format!(
            "\n  <fonts count=\"2\"><font><sz val=\"11\"/><name val=\"Calibri\"/><family val=\"2\"/></font>{}</fonts>",
            BOLD_FONT
        ));
        xml.push_str(
            r#"
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
        );
        xml.push_str(&format!(
            "\n  <cellXfs count=\"{}\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>{}</cellXfs>",
            1 + self.xfs.len(),
            self.xf_elements("")
        ));
        xml.push_str(
            r#"
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
  <dxfs count="0"/>
  <tableStyles count="0" defaultTableStyle="TableStyleMedium9" defaultPivotStyle="PivotStyleLight16"/>
</styleSheet>"#,
        );
        xml
    }

    /// Copy an existing style sheet, appending the bold font, the custom number formats and
    /// the cell formats handed out by this builder. Existing indices are untouched.
    pub(crate) fn extend_styles_xml(&self, existing: &[u8]) -> XlsxResult<Vec<u8>> {
        let mut reader = Reader::from_reader(existing);
        reader.trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(existing.len() + 512));

        let mut buf = Vec::new();
        let mut prefix = String::new();
        let mut saw_num_fmts = false;
        let new_fmts = self.custom_formats.len() as u32;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match &event {
                Event::Start(e) if e.local_name().as_ref() == b"styleSheet" => {
                    prefix = qname_prefix(e);
                    writer.write_event(&event)?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"numFmts" => {
                    saw_num_fmts = true;
                    writer.write_event(Event::Start(with_count(e, count_of(e)? + new_fmts)?))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"numFmts" => {
                    writer
                        .get_mut()
                        .write_all(self.num_fmt_elements(&prefix).as_bytes())?;
                    writer.write_event(&event)?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"numFmts" => {
                    saw_num_fmts = true;
                    self.write_num_fmts_block(writer.get_mut(), &prefix)?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"fonts" => {
                    if !saw_num_fmts {
                        saw_num_fmts = true;
                        self.write_num_fmts_block(writer.get_mut(), &prefix)?;
                    }
                    writer.write_event(Event::Start(with_count(e, self.base.fonts + 1)?))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"fonts" => {
                    writer
                        .get_mut()
                        .write_all(prefixed(BOLD_FONT, &prefix).as_bytes())?;
                    writer.write_event(&event)?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => {
                    let count = self.base.cell_xfs + self.xfs.len() as u32;
                    writer.write_event(Event::Start(with_count(e, count)?))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => {
                    writer
                        .get_mut()
                        .write_all(self.xf_elements(&prefix).as_bytes())?;
                    writer.write_event(&event)?;
                }
                Event::Eof => break,
                _ => writer.write_event(&event)?,
            }
            buf.clear();
        }

        Ok(writer.into_inner())
    }

    fn write_num_fmts_block<W: Write>(&self, out: &mut W, prefix: &str) -> XlsxResult<()> {
        if !self.custom_formats.is_empty() {
            write!(
                out,
                "<{p}numFmts count=\"{}\">{}</{p}numFmts>",
                self.custom_formats.len(),
                self.num_fmt_elements(prefix),
                p = prefix
            )?;
        }
        Ok(())
    }
}

fn qname_prefix(e: &BytesStart<'_>) -> String {
    let name = e.name();
    match name.prefix() {
        Some(p) => format!("{}:", String::from_utf8_lossy(p.as_ref())),
        None => String::new(),
    }
}

fn count_of(e: &BytesStart<'_>) -> XlsxResult<u32> {
    Ok(attr_value(e, b"count")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

fn with_count(e: &BytesStart<'_>, count: u32) -> XlsxResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() != b"count" {
            out.push_attribute(attr);
        }
    }
    out.push_attribute(("count", count.to_string().as_str()));
    Ok(out.into_owned())
}

fn prefixed(fragment: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return fragment.to_string();
    }
    fragment
        .replace("</", "\u{0}")
        .replace('<', &format!("<{}", prefix))
        .replace('\u{0}', &format!("</{}", prefix))
}
