//! Column types

use crate::number_format::NumberFormat;

/// Column metadata supplied to the streaming writer
///
/// The order of the columns handed to the writer is the order of the cells in every row.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnInfo {
    /// Header text written in the first row
    pub header: String,
    /// Fixed width in character units (None = default or auto width)
    pub width: Option<f64>,
    /// Column is hidden
    pub hidden: bool,
    /// Custom number format for the column's cells
    pub number_format: Option<NumberFormat>,
}

impl ColumnInfo {
    /// Create column metadata with just a header
    pub fn new<S: Into<String>>(header: S) -> Self {
        Self {
            header: header.into(),
            width: None,
            hidden: false,
            number_format: None,
        }
    }

    /// Set a fixed width
    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    /// Hide the column
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Set a custom number format
    pub fn with_number_format(mut self, format: NumberFormat) -> Self {
        self.number_format = Some(format);
        self
    }

    /// Check if this column needs a `<col>` element of its own
    pub fn has_custom_settings(&self) -> bool {
        self.width.is_some() || self.hidden
    }
}

impl From<&str> for ColumnInfo {
    fn from(header: &str) -> Self {
        ColumnInfo::new(header)
    }
}

impl From<String> for ColumnInfo {
    fn from(header: String) -> Self {
        ColumnInfo::new(header)
    }
}
