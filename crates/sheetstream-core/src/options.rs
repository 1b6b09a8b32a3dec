//! Reader and writer options

use crate::cancel::CancellationToken;
use std::collections::HashMap;

/// Default size of the shared-strings part above which strings spill to disk (5 MiB)
pub const DEFAULT_SHARED_STRING_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Options for opening a document for reading
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReadOptions {
    /// Give every cell covered by a merge region the value of the region's anchor
    pub fill_merged_cells: bool,
    /// Skip rows that are absent from the file instead of yielding them empty
    pub ignore_empty_rows: bool,
    /// Byte size of the shared-strings part at which the disk-backed store is used
    pub shared_string_cache_threshold: u64,
    /// Replace embedded-binary sentinels with the bytes of the referenced part
    pub resolve_embedded_binaries: bool,
    /// Alternative sheet names (alias → real sheet name)
    pub sheet_aliases: HashMap<String, String>,
    /// Cancellation checked between rows and cells
    #[cfg_attr(feature = "serde", serde(skip))]
    pub cancellation: Option<CancellationToken>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fill_merged_cells: false,
            ignore_empty_rows: false,
            shared_string_cache_threshold: DEFAULT_SHARED_STRING_THRESHOLD,
            resolve_embedded_binaries: true,
            sheet_aliases: HashMap::new(),
            cancellation: None,
        }
    }
}

impl ReadOptions {
    /// Register an alias for a sheet name
    pub fn with_alias<A: Into<String>, N: Into<String>>(mut self, alias: A, name: N) -> Self {
        self.sheet_aliases.insert(alias.into(), name.into());
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Per-query options: header mode and the row/column window
///
/// All coordinates are 1-based and inclusive. `None` for an end means "last populated".
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct QueryOptions {
    /// First row in the window supplies the column keys and is not yielded
    pub has_header: bool,
    /// First row of the window
    pub start_row: u32,
    /// First column of the window
    pub start_column: u32,
    /// Last row of the window
    pub end_row: Option<u32>,
    /// Last column of the window
    pub end_column: Option<u32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            has_header: false,
            start_row: 1,
            start_column: 1,
            end_row: None,
            end_column: None,
        }
    }
}

impl QueryOptions {
    /// Query with a header row
    pub fn with_header() -> Self {
        Self {
            has_header: true,
            ..Self::default()
        }
    }

    /// Check the window is well formed, returning a description of the first problem
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.start_row == 0 || self.start_column == 0 {
            return Err("start_row and start_column are 1-based".into());
        }
        if let Some(end) = self.end_row {
            if end < self.start_row {
                return Err(format!("end_row {} is before start_row {}", end, self.start_row));
            }
        }
        if let Some(end) = self.end_column {
            if end < self.start_column {
                return Err(format!(
                    "end_column {} is before start_column {}",
                    end, self.start_column
                ));
            }
        }
        Ok(())
    }
}

/// How a newly created package entry accepts its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryMode {
    /// Forward-only, compressed as it is written
    Streamed,
    /// Buffered until the entry is sealed, so earlier bytes can be overwritten
    #[default]
    Patchable,
}

/// Deflate compression level for written entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompressionLevel {
    /// Fastest compression
    #[default]
    Fast,
    /// Library default
    Default,
    /// Smallest output
    Best,
}

/// Options for the streaming writer
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WriteOptions {
    /// How worksheet entries are written
    pub entry_mode: EntryMode,
    /// Compression level for every entry
    pub compression: CompressionLevel,
    /// Write the column headers as row 1
    pub write_header: bool,
    /// Size columns from their content (requires patchable entries)
    pub auto_column_width: bool,
    /// Lower bound for auto widths
    pub min_column_width: f64,
    /// Upper bound for auto widths
    pub max_column_width: f64,
    /// Rows frozen at the top
    pub freeze_rows: u32,
    /// Columns frozen at the left
    pub freeze_columns: u32,
    /// Add an auto-filter over the written range (needs a header row)
    pub auto_filter: bool,
    /// Write `Empty` values as explicit empty cells instead of omitting them
    pub write_empty_cells: bool,
    /// Cancellation checked between rows and cells
    #[cfg_attr(feature = "serde", serde(skip))]
    pub cancellation: Option<CancellationToken>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            entry_mode: EntryMode::Patchable,
            compression: CompressionLevel::Fast,
            write_header: true,
            auto_column_width: false,
            min_column_width: 9.28,
            max_column_width: 200.0,
            freeze_rows: 0,
            freeze_columns: 0,
            auto_filter: true,
            write_empty_cells: false,
            cancellation: None,
        }
    }
}

impl WriteOptions {
    /// Check option combinations, returning a description of the first problem
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.auto_column_width && self.entry_mode == EntryMode::Streamed {
            return Err("auto column width needs patchable entries".into());
        }
        if !(self.min_column_width > 0.0 && self.min_column_width <= self.max_column_width) {
            return Err(format!(
                "column width bounds {}..{} are invalid",
                self.min_column_width, self.max_column_width
            ));
        }
        if self.max_column_width > 255.0 {
            return Err("max_column_width cannot exceed 255".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let read = ReadOptions::default();
        assert_eq!(read.shared_string_cache_threshold, 5 * 1024 * 1024);
        assert!(!read.fill_merged_cells);

        let query = QueryOptions::default();
        assert_eq!((query.start_row, query.start_column), (1, 1));
        assert!(query.validate().is_ok());

        let write = WriteOptions::default();
        assert_eq!(write.entry_mode, EntryMode::Patchable);
        assert!(write.validate().is_ok());
    }

    #[test]
    fn test_invalid_combinations() {
        let query = QueryOptions {
            start_row: 5,
            end_row: Some(2),
            ..QueryOptions::default()
        };
        assert!(query.validate().is_err());

        let write = WriteOptions {
            entry_mode: EntryMode::Streamed,
            auto_column_width: true,
            ..WriteOptions::default()
        };
        assert!(write.validate().is_err());
    }
}
