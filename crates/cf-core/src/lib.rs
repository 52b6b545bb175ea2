//! # cf-core
//!
//! Shared error handling and configuration for the cutflow workspace.
//!
//! This crate provides:
//! - The workspace-wide error type and `Result` alias
//! - Analysis configuration loaded from JSON (cuts, triggers,
//!   luminosities, classifier working points, correction sources)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;

pub use config::{
    AnalysisConfig, ClassifierConfig, CorrectionKind, CorrectionSpec, CutValue, TargetEfficiencies,
};
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
