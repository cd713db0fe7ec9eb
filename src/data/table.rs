//! Column-oriented table of named numeric columns.
//!
//! Formulas refer to columns by name; every column has the same number of rows.

use serde::{Deserialize, Serialize};

use crate::error::MupeError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, values)` pairs.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, MupeError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), MupeError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(MupeError::DuplicateColumn(name));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != values.len() {
                return Err(MupeError::ColumnLength {
                    name,
                    expected: first.len(),
                    found: values.len(),
                });
            }
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|idx| self.columns[idx].as_slice())
    }

    /// Column by position. Panics if `idx >= n_cols()`.
    pub fn column_at(&self, idx: usize) -> &[f64] {
        &self.columns[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_share_row_count() {
        let mut table = DataTable::from_columns([("x1", vec![1.0, 2.0, 3.0])]).unwrap();
        let err = table.push_column("y", vec![1.0]).unwrap_err();
        assert_eq!(
            err,
            MupeError::ColumnLength {
                name: "y".to_string(),
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut table = DataTable::from_columns([("x1", vec![1.0])]).unwrap();
        let err = table.push_column("x1", vec![2.0]).unwrap_err();
        assert_eq!(err, MupeError::DuplicateColumn("x1".to_string()));
    }

    #[test]
    fn lookup_by_name() {
        let table = DataTable::from_columns([("x1", vec![1.0, 2.0]), ("y", vec![3.0, 4.0])]).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.n_cols(), 2);
        assert_eq!(table.column("y"), Some(&[3.0, 4.0][..]));
        assert_eq!(table.column("x2"), None);
        assert_eq!(table.column_index("y"), Some(1));
    }
}
