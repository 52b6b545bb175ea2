//! Column storage: scalar columns and fixed-width array columns.

use cf_core::{Error, Result};

/// One named column of event data.
///
/// All values are `f64`; booleans and small integers (categories, counts,
/// indices) are stored as their numeric values. Array columns are
/// rectangular: every row holds exactly `width` values, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// One value per row.
    Scalar(Vec<f64>),
    /// `width` values per row, stored row-major.
    Array {
        /// Number of values per row.
        width: usize,
        /// Row-major storage of length `width * n_rows`.
        data: Vec<f64>,
    },
}

impl Column {
    /// Build a scalar column.
    pub fn scalar(values: Vec<f64>) -> Column {
        Column::Scalar(values)
    }

    /// Build a fixed-width array column from row-major data.
    pub fn array(width: usize, data: Vec<f64>) -> Result<Column> {
        if width == 0 {
            return Err(Error::Validation("array column width must be > 0".into()));
        }
        if data.len() % width != 0 {
            return Err(Error::Validation(format!(
                "array column data length {} is not a multiple of width {}",
                data.len(),
                width
            )));
        }
        Ok(Column::Array { width, data })
    }

    /// Number of rows in the column.
    pub fn n_rows(&self) -> usize {
        match self {
            Column::Scalar(v) => v.len(),
            Column::Array { width, data } => data.len() / width,
        }
    }

    /// Whether this is an array column.
    pub fn is_array(&self) -> bool {
        matches!(self, Column::Array { .. })
    }

    /// Raw storage, row-major for array columns.
    pub fn values(&self) -> &[f64] {
        match self {
            Column::Scalar(v) => v,
            Column::Array { data, .. } => data,
        }
    }

    /// One row of an array column.
    ///
    /// Panics if `row` is out of range or this is a scalar column; callers
    /// validate the column kind first.
    pub fn row_slice(&self, row: usize) -> &[f64] {
        match self {
            Column::Array { width, data } => &data[row * width..(row + 1) * width],
            Column::Scalar(_) => panic!("row_slice on a scalar column"),
        }
    }

    /// New column keeping only rows where `keep` is true.
    pub(crate) fn filter_rows(&self, keep: &[bool]) -> Column {
        match self {
            Column::Scalar(v) => Column::Scalar(
                v.iter()
                    .zip(keep)
                    .filter_map(|(x, k)| k.then_some(*x))
                    .collect(),
            ),
            Column::Array { width, data } => {
                let mut out = Vec::with_capacity(keep.iter().filter(|k| **k).count() * width);
                for (row, k) in keep.iter().enumerate() {
                    if *k {
                        out.extend_from_slice(&data[row * width..(row + 1) * width]);
                    }
                }
                Column::Array {
                    width: *width,
                    data: out,
                }
            }
        }
    }
}
