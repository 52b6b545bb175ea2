//! Error types shared across the cutflow workspace.

use thiserror::Error;

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// An expression or operation referenced a column that is not visible
    /// in the view it was evaluated against.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// A definition tried to reuse a column name that is already visible.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    /// A cursor minted by one engine instance was handed to another.
    #[error("foreign node: cursor belongs to engine {cursor_engine}, not engine {engine}")]
    ForeignNode {
        /// Identifier of the engine the cursor was used with.
        engine: u64,
        /// Identifier of the engine the cursor was minted by.
        cursor_engine: u64,
    },

    /// An efficiency is degenerate (nothing passes, or nothing fails) or a
    /// migration target cannot be reached from the simulated sample.
    #[error("degenerate efficiency: {0}")]
    DegenerateEfficiency(String),

    /// Expression parse or shape error.
    #[error("expression error: {0}")]
    Expression(String),

    /// Input validation error.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = Error::UnknownColumn("jet_pt".into());
        assert_eq!(e.to_string(), "unknown column 'jet_pt'");

        let e = Error::ForeignNode {
            engine: 3,
            cursor_engine: 1,
        };
        assert_eq!(
            e.to_string(),
            "foreign node: cursor belongs to engine 1, not engine 3"
        );
    }

    #[test]
    fn io_error_converts() {
        fn fails() -> Result<()> {
            let _ = std::fs::File::open("/nonexistent/path/for/test")?;
            Ok(())
        }
        assert!(matches!(fails(), Err(Error::Io(_))));
    }
}
