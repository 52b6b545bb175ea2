//! Columnar event tables (Structure-of-Arrays / SoA).

use std::collections::HashMap;
use std::sync::Arc;

use cf_core::{Error, Result};

use crate::column::Column;
use crate::expr::{ArraySlice, CompiledExpr};

/// An immutable columnar view of a set of events.
///
/// Tables are cheap to extend: [`EventTable::define`] shares the existing
/// columns with the parent view and only materializes the new one.
/// [`EventTable::filter`] materializes every surviving column.
#[derive(Debug, Clone)]
pub struct EventTable {
    n_rows: usize,
    names: Vec<String>,
    columns: Vec<Arc<Column>>,
    index: HashMap<String, usize>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl EventTable {
    /// Create a table from already materialized columns.
    ///
    /// Column names must be valid identifiers so expressions can refer to
    /// them, and every column must hold the same number of rows.
    pub fn from_columns(columns: impl IntoIterator<Item = (String, Column)>) -> Result<Self> {
        let mut names = Vec::new();
        let mut cols: Vec<Arc<Column>> = Vec::new();
        let mut index = HashMap::new();
        let mut n_rows: Option<usize> = None;

        for (name, col) in columns {
            if !is_identifier(&name) {
                return Err(Error::Validation(format!(
                    "column name '{name}' is not a valid identifier"
                )));
            }
            if index.contains_key(&name) {
                return Err(Error::DuplicateColumn(name));
            }
            let n = col.n_rows();
            if let Some(ne) = n_rows {
                if n != ne {
                    return Err(Error::Validation(format!(
                        "column length mismatch for '{}': expected {}, got {}",
                        name, ne, n
                    )));
                }
            } else {
                n_rows = Some(n);
            }
            index.insert(name.clone(), cols.len());
            names.push(name);
            cols.push(Arc::new(col));
        }

        if cols.is_empty() {
            return Err(Error::Validation(
                "event table requires at least one column".into(),
            ));
        }

        Ok(Self {
            n_rows: n_rows.unwrap_or(0),
            names,
            columns: cols,
            index,
        })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Column names in definition order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Whether a column with this name is visible.
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|i| &*self.columns[*i])
    }

    /// The values of a scalar column.
    pub fn scalar(&self, name: &str) -> Result<&[f64]> {
        match self.column(name) {
            Some(Column::Scalar(v)) => Ok(v),
            Some(Column::Array { .. }) => Err(Error::Validation(format!(
                "column '{name}' is an array column, expected a scalar"
            ))),
            None => Err(Error::UnknownColumn(name.to_string())),
        }
    }

    /// The row-major data and width of an array column.
    pub fn array(&self, name: &str) -> Result<(&[f64], usize)> {
        match self.column(name) {
            Some(Column::Array { width, data }) => Ok((data, *width)),
            Some(Column::Scalar(_)) => Err(Error::Validation(format!(
                "column '{name}' is a scalar column, expected an array"
            ))),
            None => Err(Error::UnknownColumn(name.to_string())),
        }
    }

    /// Resolve an expression's column references against this table.
    fn bind<'a>(
        &'a self,
        expr: &CompiledExpr,
    ) -> Result<(Vec<&'a [f64]>, Vec<ArraySlice<'a>>)> {
        let mut scalars = Vec::with_capacity(expr.required_scalars.len());
        for name in &expr.required_scalars {
            match self.column(name) {
                Some(Column::Scalar(v)) => scalars.push(v.as_slice()),
                Some(Column::Array { .. }) => {
                    return Err(Error::Expression(format!(
                        "array column '{name}' must be indexed"
                    )));
                }
                None => return Err(Error::UnknownColumn(name.clone())),
            }
        }
        let mut arrays = Vec::with_capacity(expr.required_arrays.len());
        for name in &expr.required_arrays {
            match self.column(name) {
                Some(Column::Array { width, data }) => arrays.push(ArraySlice {
                    data,
                    width: *width,
                }),
                Some(Column::Scalar(_)) => {
                    return Err(Error::Expression(format!(
                        "scalar column '{name}' cannot be indexed"
                    )));
                }
                None => return Err(Error::UnknownColumn(name.clone())),
            }
        }
        Ok((scalars, arrays))
    }

    /// Evaluate an expression over every row of this table.
    pub fn evaluate(&self, expr: &CompiledExpr) -> Result<Vec<f64>> {
        let (scalars, arrays) = self.bind(expr)?;
        Ok(expr.eval_bulk(self.n_rows, &scalars, &arrays))
    }

    /// New table with an extra scalar column computed from an expression.
    ///
    /// The existing columns are shared with this table, not copied.
    pub fn define(&self, name: &str, expr: &CompiledExpr) -> Result<EventTable> {
        let values = self.evaluate(expr)?;
        self.define_values(name, Column::Scalar(values))
    }

    /// New table with an extra column of precomputed values.
    pub fn define_values(&self, name: &str, column: Column) -> Result<EventTable> {
        if !is_identifier(name) {
            return Err(Error::Validation(format!(
                "column name '{name}' is not a valid identifier"
            )));
        }
        if self.has_column(name) {
            return Err(Error::DuplicateColumn(name.to_string()));
        }
        if column.n_rows() != self.n_rows {
            return Err(Error::Validation(format!(
                "column length mismatch for '{}': expected {}, got {}",
                name,
                self.n_rows,
                column.n_rows()
            )));
        }
        let mut names = self.names.clone();
        let mut columns = self.columns.clone();
        let mut index = self.index.clone();
        index.insert(name.to_string(), columns.len());
        names.push(name.to_string());
        columns.push(Arc::new(column));
        Ok(EventTable {
            n_rows: self.n_rows,
            names,
            columns,
            index,
        })
    }

    /// New table keeping only the rows where `predicate` is true.
    ///
    /// A row survives when the predicate evaluates > 0.0; NaN fails.
    pub fn filter(&self, predicate: &CompiledExpr) -> Result<EventTable> {
        let values = self.evaluate(predicate)?;
        let keep: Vec<bool> = values.iter().map(|v| *v > 0.0).collect();
        let n_kept = keep.iter().filter(|k| **k).count();
        let columns: Vec<Arc<Column>> = self
            .columns
            .iter()
            .map(|c| Arc::new(c.filter_rows(&keep)))
            .collect();
        Ok(EventTable {
            n_rows: n_kept,
            names: self.names.clone(),
            columns,
            index: self.index.clone(),
        })
    }
}
