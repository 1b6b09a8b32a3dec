//! XLSX error types

use thiserror::Error;

/// Result type for XLSX operations
pub type XlsxResult<T> = std::result::Result<T, XlsxError>;

/// Errors that can occur during XLSX reading/writing
#[derive(Debug, Error)]
pub enum XlsxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The stream is not a ZIP container, or is truncated
    #[error("Invalid container: {0}")]
    ContainerFormat(String),

    /// A required part is missing from the package
    #[error("Missing required part: {0}")]
    PartNotFound(String),

    /// No sheet with that name (or alias)
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Inserting a sheet whose name is taken, without overwrite
    #[error("Sheet already exists: {0}")]
    SheetAlreadyExists(String),

    /// The declared `<dimension ref>` cannot be parsed
    #[error("Malformed dimension '{value}' in sheet '{sheet}'")]
    MalformedDimension { sheet: String, value: String },

    /// A worksheet mixes cells with and without `r` attributes
    #[error("Mixed cell addressing in sheet '{sheet}' at row {row}")]
    MixedCellAddressing { sheet: String, row: u32 },

    /// Deferred text is wider than the space reserved for it
    #[error("Patch overflow: {needed} bytes do not fit in {reserved} reserved")]
    PatchOverflow { reserved: usize, needed: usize },

    /// The operation was cancelled through its token
    #[error("Operation cancelled")]
    Cancelled,

    /// Options or arguments that cannot work together
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] sheetstream_core::Error),
}

impl From<quick_xml::events::attributes::AttrError> for XlsxError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        XlsxError::Xml(quick_xml::Error::InvalidAttr(e))
    }
}
