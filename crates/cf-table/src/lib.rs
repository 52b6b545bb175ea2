//! # cf-table
//!
//! Columnar event tables and the selection expression engine.
//!
//! An [`EventTable`] holds scalar and fixed-width array columns of `f64`
//! values. Tables are immutable: [`EventTable::define`] and
//! [`EventTable::filter`] return new views, sharing unchanged column
//! storage with the parent.
//!
//! Expressions come in two forms: strings compiled with
//! [`CompiledExpr::compile`] (`"jet_pt[0] > 400 && njet >= 2"`), and the
//! typed builder in [`builder`] which checks column names against a
//! table's schema at construction time.
//!
//! ## Example
//!
//! ```
//! use cf_table::{Column, CompiledExpr, EventTable};
//!
//! # fn main() -> cf_core::Result<()> {
//! let t = EventTable::from_columns(vec![
//!     ("pt".to_string(), Column::scalar(vec![450.0, 320.0, 510.0])),
//!     ("weight".to_string(), Column::scalar(vec![0.9, 1.1, 1.0])),
//! ])?;
//! let sel = CompiledExpr::compile("pt > 400")?;
//! let passed = t.filter(&sel)?;
//! assert_eq!(passed.count(), 2);
//! assert!((passed.sum("weight")? - 1.9).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod column;
pub mod expr;
pub mod reduce;
pub mod table;

pub use builder::{lit, ArrayCol, TypedExpr};
pub use column::Column;
pub use expr::{ArraySlice, CompiledExpr};
pub use table::EventTable;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
