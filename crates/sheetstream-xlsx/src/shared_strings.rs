//! Shared string table
//!
//! Built once per document from `xl/sharedStrings.xml`. Small tables stay in memory; a part
//! at or above the configured byte threshold is spilled to a pair of anonymous temporary
//! files (an offset/length index and the UTF-8 data) that disappear when the table drops.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use ahash::AHashMap;
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::XlsxResult;
use crate::xml::{decode_excel_escapes, read_text};

/// Index record size: u64 offset + u32 length
const INDEX_RECORD: u64 = 12;

/// Entries kept by the disk store's read cache before it is cleared
const CACHE_CAPACITY: usize = 1024;

/// Shared string table with an in-memory or disk-backed store
#[derive(Debug)]
pub struct SharedStrings {
    store: Store,
}

#[derive(Debug)]
enum Store {
    Memory(Vec<String>),
    Disk(DiskStore),
}

impl Default for SharedStrings {
    fn default() -> Self {
        Self::empty()
    }
}

impl SharedStrings {
    /// A table with no entries (package without a shared-strings part)
    pub fn empty() -> Self {
        Self {
            store: Store::Memory(Vec::new()),
        }
    }

    /// Stream the shared-strings part once. `part_size` is the part's uncompressed byte
    /// length; at or above `threshold` the disk store is used.
    pub fn build<R: Read>(reader: R, part_size: u64, threshold: u64) -> XlsxResult<Self> {
        let store = if part_size >= threshold {
            let mut sink = DiskSink::new()?;
            parse_items(reader, |s| sink.push(&s))?;
            let disk = sink.finish()?;
            debug!(
                "shared strings: {} entries spilled to disk ({} bytes part)",
                disk.len, part_size
            );
            Store::Disk(disk)
        } else {
            let mut strings = Vec::new();
            parse_items(reader, |s| {
                strings.push(s);
                Ok(())
            })?;
            debug!("shared strings: {} entries in memory", strings.len());
            Store::Memory(strings)
        };
        Ok(Self { store })
    }

    /// Look up a string by index; out of range gives `None`
    pub fn get(&self, index: usize) -> Option<Cow<'_, str>> {
        match &self.store {
            Store::Memory(strings) => strings.get(index).map(|s| Cow::Borrowed(s.as_str())),
            Store::Disk(disk) => match disk.get(index) {
                Ok(value) => value.map(Cow::Owned),
                Err(e) => {
                    warn!("shared string {} unreadable: {}", index, e);
                    None
                }
            },
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        match &self.store {
            Store::Memory(strings) => strings.len(),
            Store::Disk(disk) => disk.len,
        }
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether entries live in temporary files
    pub fn is_disk_backed(&self) -> bool {
        matches!(self.store, Store::Disk(_))
    }
}

/// Parse `<si>` items in order, handing each decoded string to `sink`.
///
/// Rich-text items concatenate their `<t>` runs; phonetic runs (`<rPh>`) are skipped.
fn parse_items<R, F>(reader: R, mut sink: F) -> XlsxResult<()>
where
    R: Read,
    F: FnMut(String) -> XlsxResult<()>,
{
    let mut xml_reader = Reader::from_reader(BufReader::new(reader));
    // Leading/trailing spaces in <t> are data
    xml_reader.trim_text(false);

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    let mut current = String::new();
    let mut in_si = false;

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => read_text(&mut xml_reader, &mut skip_buf, &mut current)?,
                b"rPh" | b"phoneticPr" => {
                    let end = e.name().as_ref().to_vec();
                    xml_reader.read_to_end_into(quick_xml::name::QName(&end), &mut skip_buf)?;
                    skip_buf.clear();
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => sink(String::new())?,
            Event::End(e) if e.local_name().as_ref() == b"si" => {
                in_si = false;
                sink(decode_excel_escapes(&current).into_owned())?;
                current.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

struct DiskSink {
    index: BufWriter<File>,
    data: BufWriter<File>,
    offset: u64,
    len: usize,
}

impl DiskSink {
    fn new() -> XlsxResult<Self> {
        Ok(Self {
            index: BufWriter::new(tempfile::tempfile()?),
            data: BufWriter::new(tempfile::tempfile()?),
            offset: 0,
            len: 0,
        })
    }

    fn push(&mut self, s: &str) -> XlsxResult<()> {
        let bytes = s.as_bytes();
        self.data.write_all(bytes)?;
        self.index.write_all(&self.offset.to_le_bytes())?;
        self.index.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.offset += bytes.len() as u64;
        self.len += 1;
        Ok(())
    }

    fn finish(self) -> XlsxResult<DiskStore> {
        let index = self.index.into_inner().map_err(|e| e.into_error())?;
        let data = self.data.into_inner().map_err(|e| e.into_error())?;
        Ok(DiskStore {
            files: RefCell::new(DiskFiles { index, data }),
            cache: RefCell::new(AHashMap::new()),
            len: self.len,
        })
    }
}

#[derive(Debug)]
struct DiskFiles {
    index: File,
    data: File,
}

#[derive(Debug)]
struct DiskStore {
    files: RefCell<DiskFiles>,
    cache: RefCell<AHashMap<usize, String>>,
    len: usize,
}

impl DiskStore {
    fn get(&self, index: usize) -> XlsxResult<Option<String>> {
        if index >= self.len {
            return Ok(None);
        }
        if let Some(hit) = self.cache.borrow().get(&index) {
            return Ok(Some(hit.clone()));
        }

        let mut files = self.files.borrow_mut();
        let mut record = [0u8; INDEX_RECORD as usize];
        files
            .index
            .seek(SeekFrom::Start(index as u64 * INDEX_RECORD))?;
        files.index.read_exact(&mut record)?;

        let mut offset = [0u8; 8];
        offset.copy_from_slice(&record[..8]);
        let mut length = [0u8; 4];
        length.copy_from_slice(&record[8..]);

        let mut bytes = vec![0u8; u32::from_le_bytes(length) as usize];
        files.data.seek(SeekFrom::Start(u64::from_le_bytes(offset)))?;
        files.data.read_exact(&mut bytes)?;
        let value = String::from_utf8_lossy(&bytes).into_owned();

        let mut cache = self.cache.borrow_mut();
        if cache.len() >= CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(index, value.clone());
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="5" uniqueCount="5">
  <si><t>Name</t></si>
  <si><t xml:space="preserve">  padded  </t></si>
  <si><r><rPr><b/></rPr><t>Rich</t></r><r><t xml:space="preserve"> text</t></r><rPh sb="0" eb="1"><t>ignored</t></rPh></si>
  <si><t>Line1_x000d__x000a_Line2 &amp; more</t></si>
  <si/>
</sst>"#;

    fn collect(table: &SharedStrings) -> Vec<String> {
        (0..table.len())
            .map(|i| table.get(i).unwrap().into_owned())
            .collect()
    }

    #[test]
    fn test_in_memory_table() {
        let table = SharedStrings::build(SST.as_bytes(), SST.len() as u64, 1 << 20).unwrap();
        assert!(!table.is_disk_backed());
        assert_eq!(
            collect(&table),
            vec!["Name", "  padded  ", "Rich text", "Line1\r\nLine2 & more", ""]
        );
        assert_eq!(table.get(5), None);
    }

    #[test]
    fn test_spillover_decodes_identically() {
        let size = SST.len() as u64;
        let under = SharedStrings::build(SST.as_bytes(), size, size + 1).unwrap();
        let over = SharedStrings::build(SST.as_bytes(), size, size).unwrap();
        assert!(!under.is_disk_backed());
        assert!(over.is_disk_backed());
        assert_eq!(collect(&under), collect(&over));
        // Cached lookups return the same value
        assert_eq!(over.get(2), under.get(2));
        assert_eq!(over.get(99), None);
    }

    #[test]
    fn test_empty_table() {
        let table = SharedStrings::empty();
        assert!(table.is_empty());
        assert_eq!(table.get(0), None);
    }
}
