//! Row types

use crate::cell::CellValue;
use std::sync::Arc;

/// One worksheet row as produced by the pull reader
///
/// Values are dense over the queried column window. Keys are shared by every row of
/// one query: column letters, or header text when the query reads a header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    number: u32,
    keys: Arc<[String]>,
    values: Vec<CellValue>,
}

impl Row {
    /// Create a row. `number` is 1-based.
    pub fn new(number: u32, keys: Arc<[String]>, values: Vec<CellValue>) -> Self {
        Self {
            number,
            keys,
            values,
        }
    }

    /// 1-based row number in the worksheet
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Column keys, in column order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Cell values, in column order
    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    /// Consume the row, returning its values
    pub fn into_values(self) -> Vec<CellValue> {
        self.values
    }

    /// Get a value by key (column letter or header text)
    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }

    /// Get a value by position within the column window
    pub fn get_index(&self, index: usize) -> Option<&CellValue> {
        self.values.get(index)
    }

    /// Iterate `(key, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Number of cells in the row
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no cells at all
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check if every cell in the row is empty
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(CellValue::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_key_and_index() {
        let keys: Arc<[String]> = vec!["Name".to_string(), "Age".to_string()].into();
        let row = Row::new(2, keys, vec![CellValue::from("Jack"), CellValue::from(25)]);

        assert_eq!(row.number(), 2);
        assert_eq!(row.get("Age"), Some(&CellValue::Number(25.0)));
        assert_eq!(row.get_index(0), Some(&CellValue::string("Jack")));
        assert_eq!(row.get("Missing"), None);
        assert!(!row.is_blank());
    }

    #[test]
    fn test_blank_row() {
        let keys: Arc<[String]> = vec!["A".to_string()].into();
        let row = Row::new(7, keys, vec![CellValue::Empty]);
        assert!(row.is_blank());
        assert!(!row.is_empty());
    }
}
