//! # cf-engine
//!
//! Cut graph construction and evaluation for columnar event analysis.
//!
//! This crate provides:
//! - A persistent [`CutGraph`] of define and filter nodes over
//!   [`cf_table::EventTable`] views, addressed by [`Cursor`]s
//! - A linear [`Session`] front that chains operations from an active
//!   cursor while saved cursors branch the graph
//! - Ordered [`VarGroup`]/[`CutGroup`] batches, cutflow reports, and
//!   N minus one selections
//! - Deterministic per-event draws powering data-driven
//!   [`CategoryReweighter`] migrations
//! - Systematic weight columns assembled by [`WeightBuilder`]
//!
//! ```
//! use cf_engine::Session;
//! use cf_table::{Column, EventTable};
//!
//! # fn main() -> cf_core::Result<()> {
//! let table = EventTable::from_columns(vec![
//!     ("pt".to_string(), Column::scalar(vec![450.0, 320.0, 510.0])),
//!     ("eta".to_string(), Column::scalar(vec![0.5, -2.6, 1.1])),
//! ])?;
//!
//! let mut session = Session::new(table);
//! session.define("abs_eta", "abs(eta)")?;
//! session.cut("pt_cut", "pt > 400")?;
//! session.cut("eta_cut", "abs_eta < 2.4")?;
//! assert_eq!(session.count(), 2);
//!
//! println!("{}", session.cutflow(None)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cutflow;
pub mod draw;
pub mod graph;
pub mod groups;
pub mod nminus1;
pub mod node;
pub mod reweight;
pub mod session;
pub mod weights;

pub use cutflow::{cutflow, CutflowReport, CutflowStep};
pub use draw::{event_id_from_f64, uniform, DEFAULT_SEED};
pub use graph::CutGraph;
pub use groups::{CutGroup, GroupRef, VarGroup};
pub use nminus1::nminus_one;
pub use node::{Cursor, NodeOp};
pub use reweight::{CategoryReweighter, Efficiencies, WorkingPoints};
pub use session::Session;
pub use weights::{Correction, WeightBuilder, NOMINAL_WEIGHT};

/// Version of the cf-engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
