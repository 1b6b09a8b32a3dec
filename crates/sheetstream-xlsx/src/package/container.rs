//! ZIP container adapter
//!
//! Reading goes through [`PackageReader`]. Writing goes through [`PackageWriter`], whose
//! entries are either streamed (compressed as they are written) or patchable (spooled to
//! a temporary buffer so earlier bytes can be rewritten, compressed when sealed).
//! [`PackageUpdater`] pairs the two to rewrite a package while raw-copying the entries it
//! does not touch.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use sheetstream_core::{CancellationToken, CompressionLevel, EntryMode};
use tempfile::SpooledTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{XlsxError, XlsxResult};

/// In-memory size a patchable entry may reach before it spills to a temporary file
const PATCH_SPOOL_LIMIT: usize = 4 * 1024 * 1024;

/// Any seekable byte source, boxed so a second package handle can be opened at runtime
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

fn check_cancelled(token: &Option<CancellationToken>) -> XlsxResult<()> {
    match token {
        Some(t) if t.is_cancelled() => Err(XlsxError::Cancelled),
        _ => Ok(()),
    }
}

/// Read side of a package
pub struct PackageReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    cancellation: Option<CancellationToken>,
}

impl<R: Read + Seek> PackageReader<R> {
    /// Open a ZIP container. Non-ZIP or truncated input is a container format error.
    pub fn open(reader: R) -> XlsxResult<Self> {
        let archive = ZipArchive::new(reader).map_err(|e| match e {
            ZipError::Io(io) if io.kind() != io::ErrorKind::UnexpectedEof => XlsxError::Io(io),
            other => XlsxError::ContainerFormat(other.to_string()),
        })?;
        debug!("opened package with {} entries", archive.len());
        Ok(Self {
            archive,
            cancellation: None,
        })
    }

    /// Check this token whenever an entry is opened
    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Whether the package has no entries
    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// All entry names
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.archive.file_names()
    }

    /// Entry names starting with `prefix`
    pub fn entries_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.archive
            .file_names()
            .filter(move |name| name.starts_with(prefix))
    }

    /// Whether an entry exists
    pub fn contains(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    /// Uncompressed size of an entry
    pub fn entry_size(&mut self, name: &str) -> XlsxResult<u64> {
        match self.archive.by_name(name) {
            Ok(file) => Ok(file.size()),
            Err(ZipError::FileNotFound) => Err(XlsxError::PartNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Open an entry for reading
    pub fn open_entry(&mut self, name: &str) -> XlsxResult<Box<dyn Read + '_>> {
        check_cancelled(&self.cancellation)?;
        match self.archive.by_name(name) {
            Ok(file) => Ok(Box::new(file)),
            Err(ZipError::FileNotFound) => Err(XlsxError::PartNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Open an entry if it exists
    pub fn open_optional(&mut self, name: &str) -> XlsxResult<Option<Box<dyn Read + '_>>> {
        if !self.contains(name) {
            return Ok(None);
        }
        self.open_entry(name).map(Some)
    }

    /// Read a whole entry into memory
    pub fn read_entry(&mut self, name: &str) -> XlsxResult<Vec<u8>> {
        let mut entry = self.open_entry(name)?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Where a document's bytes came from, so a second handle can be opened on them
#[derive(Debug, Clone)]
pub enum PackageSource {
    /// A file on disk
    Path(PathBuf),
    /// Shared in-memory bytes
    Bytes(Arc<[u8]>),
    /// A one-shot stream; no second handle is possible
    Unavailable,
}

impl PackageSource {
    /// Open an independent reader on the same package
    pub(crate) fn reopen(&self) -> XlsxResult<Option<PackageReader<Box<dyn ReadSeek>>>> {
        let reader: Box<dyn ReadSeek> = match self {
            PackageSource::Path(path) => Box::new(BufReader::new(File::open(path)?)),
            PackageSource::Bytes(bytes) => Box::new(Cursor::new(Arc::clone(bytes))),
            PackageSource::Unavailable => return Ok(None),
        };
        PackageReader::open(reader).map(Some)
    }
}

/// Output of one entry being written, as seen by the sheet writer
pub trait EntryOutput: Write {
    /// Byte offset of the next write within the entry
    fn position(&mut self) -> XlsxResult<u64>;

    /// Rewrite bytes already written at `position`, leaving the write cursor at the end
    fn overwrite(&mut self, position: u64, bytes: &[u8]) -> XlsxResult<()>;

    /// Whether [`overwrite`](EntryOutput::overwrite) is supported
    fn is_patchable(&self) -> bool;
}

fn file_options(compression: CompressionLevel) -> SimpleFileOptions {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    match compression {
        CompressionLevel::Fast => options.compression_level(Some(1)),
        CompressionLevel::Default => options,
        CompressionLevel::Best => options.compression_level(Some(9)),
    }
}

/// Write side of a package
pub struct PackageWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
    mode: EntryMode,
    entries: Vec<String>,
    cancellation: Option<CancellationToken>,
}

impl<W: Write + Seek> PackageWriter<W> {
    /// Start a new package on `writer`
    pub fn create(writer: W, mode: EntryMode, compression: CompressionLevel) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            options: file_options(compression),
            mode,
            entries: Vec::new(),
            cancellation: None,
        }
    }

    /// Check this token whenever an entry is created
    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Mode used by [`create_entry`](Self::create_entry)
    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    /// Names of the entries written so far
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether an entry has been written
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e == name)
    }

    fn register(&mut self, name: &str) -> XlsxResult<()> {
        check_cancelled(&self.cancellation)?;
        if self.contains(name) {
            return Err(XlsxError::ContainerFormat(format!(
                "entry '{}' written twice",
                name
            )));
        }
        self.entries.push(name.to_string());
        Ok(())
    }

    /// Write a complete small entry in one go
    pub fn write_entry(&mut self, name: &str, content: &[u8]) -> XlsxResult<()> {
        self.register(name)?;
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(content)?;
        Ok(())
    }

    /// Create an entry whose content is produced incrementally
    pub fn create_entry(&mut self, name: &str) -> XlsxResult<EntryWriter<'_, W>> {
        self.register(name)?;
        let inner = match self.mode {
            EntryMode::Streamed => {
                self.zip.start_file(name, self.options)?;
                EntryInner::Streamed { written: 0 }
            }
            EntryMode::Patchable => EntryInner::Patchable {
                buffer: BufWriter::new(SpooledTempFile::new(PATCH_SPOOL_LIMIT)),
            },
        };
        Ok(EntryWriter {
            zip: &mut self.zip,
            options: self.options,
            name: name.to_string(),
            inner,
        })
    }

    /// Copy every entry of `source` that `keep` accepts and that has not been written yet,
    /// without recompressing it. Returns the number of entries copied.
    pub fn copy_from<R, F>(&mut self, source: &mut PackageReader<R>, keep: F) -> XlsxResult<usize>
    where
        R: Read + Seek,
        F: Fn(&str) -> bool,
    {
        let mut copied = 0;
        for i in 0..source.archive.len() {
            check_cancelled(&self.cancellation)?;
            let file = source.archive.by_index_raw(i)?;
            let name = file.name().to_string();
            if !keep(&name) || self.contains(&name) {
                continue;
            }
            self.zip.raw_copy_file(file)?;
            self.entries.push(name);
            copied += 1;
        }
        Ok(copied)
    }

    /// Write the central directory and return the underlying writer
    pub fn finish(self) -> XlsxResult<W> {
        debug!("sealing package with {} entries", self.entries.len());
        Ok(self.zip.finish()?)
    }
}

enum EntryInner {
    Streamed { written: u64 },
    Patchable { buffer: BufWriter<SpooledTempFile> },
}

/// One entry being written. Call [`seal`](EntryWriter::seal) to commit it; dropping it
/// unsealed discards a patchable entry's buffer.
pub struct EntryWriter<'a, W: Write + Seek> {
    zip: &'a mut ZipWriter<W>,
    options: SimpleFileOptions,
    name: String,
    inner: EntryInner,
}

impl<'a, W: Write + Seek> EntryWriter<'a, W> {
    /// Entry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finish the entry, compressing buffered content. Returns the entry's byte size.
    pub fn seal(self) -> XlsxResult<u64> {
        match self.inner {
            EntryInner::Streamed { written } => Ok(written),
            EntryInner::Patchable { buffer } => {
                let mut spool = buffer.into_inner().map_err(|e| e.into_error())?;
                let size = spool.seek(SeekFrom::End(0))?;
                spool.seek(SeekFrom::Start(0))?;
                self.zip.start_file(self.name.as_str(), self.options)?;
                io::copy(&mut spool, self.zip)?;
                debug!("sealed patchable entry {} ({} bytes)", self.name, size);
                Ok(size)
            }
        }
    }
}

impl<'a, W: Write + Seek> Write for EntryWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            EntryInner::Streamed { written } => {
                let n = self.zip.write(buf)?;
                *written += n as u64;
                Ok(n)
            }
            EntryInner::Patchable { buffer } => buffer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            EntryInner::Streamed { .. } => self.zip.flush(),
            EntryInner::Patchable { buffer } => buffer.flush(),
        }
    }
}

impl<'a, W: Write + Seek> EntryOutput for EntryWriter<'a, W> {
    fn position(&mut self) -> XlsxResult<u64> {
        match &mut self.inner {
            EntryInner::Streamed { written } => Ok(*written),
            EntryInner::Patchable { buffer } => Ok(buffer.stream_position()?),
        }
    }

    fn overwrite(&mut self, position: u64, bytes: &[u8]) -> XlsxResult<()> {
        match &mut self.inner {
            EntryInner::Streamed { .. } => Err(XlsxError::InvalidOptions(format!(
                "entry '{}' is streamed and cannot be rewritten",
                self.name
            ))),
            EntryInner::Patchable { buffer } => {
                let end = buffer.stream_position()?;
                if position + bytes.len() as u64 > end {
                    return Err(XlsxError::PatchOverflow {
                        reserved: end.saturating_sub(position) as usize,
                        needed: bytes.len(),
                    });
                }
                buffer.seek(SeekFrom::Start(position))?;
                buffer.write_all(bytes)?;
                buffer.seek(SeekFrom::Start(end))?;
                Ok(())
            }
        }
    }

    fn is_patchable(&self) -> bool {
        matches!(self.inner, EntryInner::Patchable { .. })
    }
}

/// Rewrites a package into a new output
///
/// Entries written through [`target`](Self::target) replace same-named source entries;
/// entries marked with [`delete_entry`](Self::delete_entry) are dropped; everything else
/// is raw-copied by [`finish`](Self::finish).
pub struct PackageUpdater<R: Read + Seek, W: Write + Seek> {
    source: PackageReader<R>,
    target: PackageWriter<W>,
    deleted: HashSet<String>,
}

impl<R: Read + Seek, W: Write + Seek> PackageUpdater<R, W> {
    /// Pair a source package with a fresh output
    pub fn new(source: PackageReader<R>, target: PackageWriter<W>) -> Self {
        Self {
            source,
            target,
            deleted: HashSet::new(),
        }
    }

    /// The package being updated
    pub fn source(&mut self) -> &mut PackageReader<R> {
        &mut self.source
    }

    /// The output package
    pub fn target(&mut self) -> &mut PackageWriter<W> {
        &mut self.target
    }

    /// Both sides at once
    pub fn split(&mut self) -> (&mut PackageReader<R>, &mut PackageWriter<W>) {
        (&mut self.source, &mut self.target)
    }

    /// Leave an existing entry out of the output
    pub fn delete_entry(&mut self, name: &str) {
        self.deleted.insert(name.to_string());
    }

    /// Whether an entry will exist in the output: written already, or present in the
    /// source and neither deleted nor replaced
    pub fn is_live(&self, name: &str) -> bool {
        self.target.contains(name) || (self.source.contains(name) && !self.deleted.contains(name))
    }

    /// Copy the untouched entries and seal the output
    pub fn finish(mut self) -> XlsxResult<W> {
        let deleted = std::mem::take(&mut self.deleted);
        let copied = self
            .target
            .copy_from(&mut self.source, |name| !deleted.contains(name))?;
        debug!("copied {} untouched entries", copied);
        self.target.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(mode: EntryMode) -> Vec<u8> {
        let mut package = PackageWriter::create(Cursor::new(Vec::new()), mode, CompressionLevel::Fast);
        package.write_entry("a.txt", b"alpha").unwrap();
        {
            let mut entry = package.create_entry("b.txt").unwrap();
            entry.write_all(b"[    ] tail").unwrap();
            if entry.is_patchable() {
                entry.overwrite(1, b"done").unwrap();
            }
            entry.seal().unwrap();
        }
        package.finish().unwrap().into_inner()
    }

    fn read(bytes: Vec<u8>, name: &str) -> String {
        let mut reader = PackageReader::open(Cursor::new(bytes)).unwrap();
        String::from_utf8(reader.read_entry(name).unwrap()).unwrap()
    }

    #[test]
    fn test_patchable_entry_is_rewritten_before_sealing() {
        let bytes = build(EntryMode::Patchable);
        assert_eq!(read(bytes.clone(), "a.txt"), "alpha");
        assert_eq!(read(bytes, "b.txt"), "[done] tail");
    }

    #[test]
    fn test_streamed_entry_rejects_overwrite() {
        let mut package =
            PackageWriter::create(Cursor::new(Vec::new()), EntryMode::Streamed, CompressionLevel::Fast);
        let mut entry = package.create_entry("s.txt").unwrap();
        entry.write_all(b"abc").unwrap();
        assert_eq!(entry.position().unwrap(), 3);
        assert!(entry.overwrite(0, b"x").is_err());
        entry.seal().unwrap();
        let bytes = package.finish().unwrap().into_inner();
        assert_eq!(read(bytes, "s.txt"), "abc");
    }

    #[test]
    fn test_overwrite_past_end_is_rejected() {
        let mut package = PackageWriter::create(
            Cursor::new(Vec::new()),
            EntryMode::Patchable,
            CompressionLevel::Fast,
        );
        let mut entry = package.create_entry("p.txt").unwrap();
        entry.write_all(b"12").unwrap();
        assert!(matches!(
            entry.overwrite(1, b"abc"),
            Err(XlsxError::PatchOverflow { .. })
        ));
    }

    #[test]
    fn test_not_a_zip() {
        let result = PackageReader::open(Cursor::new(b"definitely not a zip".to_vec()));
        assert!(matches!(result, Err(XlsxError::ContainerFormat(_))));
    }

    #[test]
    fn test_truncated_zip() {
        let mut bytes = build(EntryMode::Patchable);
        bytes.truncate(bytes.len() / 2);
        let result = PackageReader::open(Cursor::new(bytes));
        assert!(matches!(result, Err(XlsxError::ContainerFormat(_))));
    }

    #[test]
    fn test_missing_part() {
        let mut reader = PackageReader::open(Cursor::new(build(EntryMode::Patchable))).unwrap();
        assert!(matches!(
            reader.open_entry("nope.xml"),
            Err(XlsxError::PartNotFound(_))
        ));
        assert_eq!(reader.entries_with_prefix("a").count(), 1);
    }

    #[test]
    fn test_updater_replaces_deletes_and_copies() {
        let source = PackageReader::open(Cursor::new(build(EntryMode::Patchable))).unwrap();
        let target = PackageWriter::create(
            Cursor::new(Vec::new()),
            EntryMode::Patchable,
            CompressionLevel::Fast,
        );
        let mut updater = PackageUpdater::new(source, target);
        updater.target().write_entry("b.txt", b"replaced").unwrap();
        updater.delete_entry("a.txt");
        assert!(!updater.is_live("a.txt"));
        assert!(updater.is_live("b.txt"));
        let bytes = updater.finish().unwrap().into_inner();

        let mut reader = PackageReader::open(Cursor::new(bytes)).unwrap();
        assert!(!reader.contains("a.txt"));
        assert_eq!(reader.read_entry("b.txt").unwrap(), b"replaced");
    }

    #[test]
    fn test_cancelled_entry_open() {
        let token = CancellationToken::new();
        let mut reader = PackageReader::open(Cursor::new(build(EntryMode::Patchable)))
            .unwrap()
            .with_cancellation(Some(token.clone()));
        token.cancel();
        assert!(matches!(reader.open_entry("a.txt"), Err(XlsxError::Cancelled)));
    }
}
