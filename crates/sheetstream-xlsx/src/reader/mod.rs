//! XLSX reader
//!
//! [`XlsxDocument`] opens a package, resolves its sheets and loads the shared strings and
//! cell formats once. Rows are then pulled lazily, one worksheet at a time, through
//! [`XlsxDocument::rows`].

mod prescan;
mod worksheet;

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use log::debug;
use sheetstream_core::{QueryOptions, ReadOptions};

use crate::error::{XlsxError, XlsxResult};
use crate::package::{read_manifest, PackageReader, PackageSource, SheetRecord};
use crate::shared_strings::SharedStrings;
use crate::styles::StyleTable;

pub use prescan::{scan_dimension, scan_merges, DimensionResult, MergeRegistry};
pub use worksheet::RowIter;

use worksheet::{BinaryResolver, DecodeContext, RowWindow};

/// An open spreadsheet package
pub struct XlsxDocument<R: Read + Seek> {
    package: PackageReader<R>,
    options: ReadOptions,
    sheets: Vec<SheetRecord>,
    date1904: bool,
    shared_strings: SharedStrings,
    styles: StyleTable,
    binaries: BinaryResolver,
}

impl XlsxDocument<BufReader<File>> {
    /// Open a package on disk. Embedded binaries can be resolved.
    pub fn open_path<P: AsRef<Path>>(path: P, options: ReadOptions) -> XlsxResult<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        Self::open_with_source(file, PackageSource::Path(path.to_path_buf()), options)
    }
}

impl XlsxDocument<Cursor<Arc<[u8]>>> {
    /// Open a package held in memory. Embedded binaries can be resolved.
    pub fn from_bytes<B: Into<Arc<[u8]>>>(bytes: B, options: ReadOptions) -> XlsxResult<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        let source = PackageSource::Bytes(Arc::clone(&bytes));
        Self::open_with_source(Cursor::new(bytes), source, options)
    }
}

impl<R: Read + Seek> XlsxDocument<R> {
    /// Open a package from any seekable stream. Embedded-binary sentinels stay unresolved,
    /// since no second handle on the stream can be opened.
    pub fn open(reader: R, options: ReadOptions) -> XlsxResult<Self> {
        Self::open_with_source(reader, PackageSource::Unavailable, options)
    }

    fn open_with_source(reader: R, source: PackageSource, options: ReadOptions) -> XlsxResult<Self> {
        let mut package =
            PackageReader::open(reader)?.with_cancellation(options.cancellation.clone());
        let manifest = read_manifest(&mut package)?;

        let styles = match manifest.styles_part() {
            Some(part) => match package.open_optional(&part)? {
                Some(entry) => StyleTable::parse(entry)?,
                None => StyleTable::default(),
            },
            None => StyleTable::default(),
        };

        let shared_strings = match manifest.shared_strings_part() {
            Some(part) if package.contains(&part) => {
                let size = package.entry_size(&part)?;
                let entry = package.open_entry(&part)?;
                SharedStrings::build(entry, size, options.shared_string_cache_threshold)?
            }
            _ => SharedStrings::empty(),
        };

        Ok(Self {
            package,
            sheets: manifest.sheets,
            date1904: manifest.date1904,
            shared_strings,
            styles,
            binaries: BinaryResolver::new(source),
            options,
        })
    }

    /// Worksheets in workbook order
    pub fn sheets(&self) -> &[SheetRecord] {
        &self.sheets
    }

    /// Worksheet names in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Find a sheet by exact name, then by configured alias, then ignoring case
    pub fn sheet(&self, name: &str) -> XlsxResult<&SheetRecord> {
        let exact = |wanted: &str| self.sheets.iter().find(|s| s.name == wanted);
        exact(name)
            .or_else(|| {
                self.options
                    .sheet_aliases
                    .get(name)
                    .and_then(|real| exact(real.as_str()))
            })
            .or_else(|| {
                self.sheets
                    .iter()
                    .find(|s| s.name.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| XlsxError::SheetNotFound(name.to_string()))
    }

    /// The named sheet, or the first one
    fn select(&self, name: Option<&str>) -> XlsxResult<SheetRecord> {
        match name {
            Some(name) => self.sheet(name).cloned(),
            None => self
                .sheets
                .first()
                .cloned()
                .ok_or_else(|| XlsxError::PartNotFound("worksheet".into())),
        }
    }

    /// Whether serial dates count from 1904
    pub fn date1904(&self) -> bool {
        self.date1904
    }

    /// The document's shared string table
    pub fn shared_strings(&self) -> &SharedStrings {
        &self.shared_strings
    }

    /// Extent of a worksheet (`None` = first sheet)
    pub fn dimension(&mut self, sheet: Option<&str>) -> XlsxResult<DimensionResult> {
        let record = self.select(sheet)?;
        let entry = self.package.open_entry(&record.path)?;
        scan_dimension(entry, &record.name)
    }

    /// Merge regions of a worksheet (`None` = first sheet)
    pub fn merges(&mut self, sheet: Option<&str>) -> XlsxResult<MergeRegistry> {
        let record = self.select(sheet)?;
        let entry = self.package.open_entry(&record.path)?;
        scan_merges(entry, &record.name)
    }

    /// Pull the rows of a worksheet (`None` = first sheet) within the query window
    pub fn rows(&mut self, sheet: Option<&str>, query: &QueryOptions) -> XlsxResult<RowIter<'_>> {
        query.validate().map_err(XlsxError::InvalidOptions)?;
        let record = self.select(sheet)?;

        let dimension = self.dimension(Some(&record.name))?;
        let merges = if self.options.fill_merged_cells {
            let registry = self.merges(Some(&record.name))?;
            (!registry.is_empty()).then_some(registry)
        } else {
            None
        };
        debug!(
            "sheet '{}': reading {} (declared={}, merges={})",
            record.name,
            dimension
                .range()
                .map_or_else(|| "empty".to_string(), |r| r.to_string()),
            dimension.declared,
            merges.as_ref().map_or(0, |m| m.regions().len())
        );

        let last_col = dimension.max_column_index.map(|dim_last| match query.end_column {
            Some(end) => (end - 1).min(dim_last),
            None => dim_last,
        });
        let window = RowWindow {
            first_row: query.start_row - 1,
            last_row: query.end_row.map(|end| end - 1),
            first_col: query.start_column - 1,
            last_col,
            has_header: query.has_header,
            ignore_empty_rows: self.options.ignore_empty_rows,
            dimension_last_col: dimension.max_column_index,
            explicit_refs: (!dimension.declared && dimension.max_column_index.is_some())
                .then_some(dimension.explicit_cell_refs),
        };

        let Self {
            package,
            options,
            date1904,
            shared_strings,
            styles,
            binaries,
            ..
        } = self;
        let context = DecodeContext {
            shared_strings,
            styles,
            date1904: *date1904,
            binaries: options.resolve_embedded_binaries.then_some(binaries),
        };
        let entry = package.open_entry(&record.path)?;
        Ok(RowIter::new(
            entry,
            &record.name,
            context,
            window,
            merges,
            options.cancellation.clone(),
        ))
    }
}
