//! Reductions over event tables: counts, sums, and weighted sums.

use cf_core::Result;

use crate::table::EventTable;

impl EventTable {
    /// Unweighted row count.
    pub fn count(&self) -> usize {
        self.n_rows()
    }

    /// Sum of a scalar column.
    pub fn sum(&self, name: &str) -> Result<f64> {
        Ok(self.scalar(name)?.iter().sum())
    }

    /// Mean of a scalar column. NaN for an empty table.
    pub fn mean(&self, name: &str) -> Result<f64> {
        let v = self.scalar(name)?;
        Ok(v.iter().sum::<f64>() / v.len() as f64)
    }

    /// Sum of `value * weight` over all rows.
    pub fn weighted_sum(&self, value: &str, weight: &str) -> Result<f64> {
        let v = self.scalar(value)?;
        let w = self.scalar(weight)?;
        Ok(v.iter().zip(w).map(|(a, b)| a * b).sum())
    }

    /// Sum of the weight column, or the plain row count when `weight` is
    /// `None`. This is the yield entering cutflow tables.
    pub fn weighted_count(&self, weight: Option<&str>) -> Result<f64> {
        match weight {
            Some(w) => self.sum(w),
            None => Ok(self.n_rows() as f64),
        }
    }
}
