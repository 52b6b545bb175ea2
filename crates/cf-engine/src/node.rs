//! Nodes of the cut graph and the cursors that address them.

use std::sync::Arc;

use cf_table::EventTable;

/// Address of one node in one [`crate::CutGraph`].
///
/// A cursor is a plain value: copy it, store it, and come back to it
/// later. Every graph operation that takes a cursor checks that it was
/// minted by the same graph and rejects it otherwise, so a cursor can
/// never silently resolve inside a different engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub(crate) engine: u64,
    pub(crate) node: u32,
}

/// The operation that produced a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOp {
    /// The ingested table a graph starts from.
    Root,
    /// A derived column appended to the parent view.
    Define {
        /// Name of the new column.
        name: String,
        /// Expression text, or a descriptive label for computed columns.
        expr: String,
    },
    /// A selection stage that kept the rows passing a predicate.
    Filter {
        /// Name of the cut.
        name: String,
        /// Predicate text.
        predicate: String,
    },
}

impl NodeOp {
    /// The cut or column name, if this operation has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeOp::Root => None,
            NodeOp::Define { name, .. } | NodeOp::Filter { name, .. } => Some(name),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<u32>,
    pub(crate) op: NodeOp,
    pub(crate) table: Arc<EventTable>,
}
