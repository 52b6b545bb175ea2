//! The persistent cut graph.
//!
//! A [`CutGraph`] starts from one ingested [`EventTable`] and grows an
//! append-only tree of derived views. Each `define` appends a column,
//! each `cut` keeps the passing rows; both return a [`Cursor`] to the
//! new node. Branch points need no bookkeeping: keep the cursor where
//! the branches split and operate from it as often as needed. Nodes are
//! never mutated or discarded, so any cursor stays valid for the life
//! of the graph.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cf_core::{Error, Result};
use cf_table::{Column, CompiledExpr, EventTable};

use crate::groups::GroupRef;
use crate::node::{Cursor, Node, NodeOp};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Append-only tree of selection stages over one event sample.
#[derive(Debug)]
pub struct CutGraph {
    id: u64,
    nodes: Vec<Node>,
}

impl CutGraph {
    /// New graph rooted at an ingested table.
    pub fn new(table: EventTable) -> Self {
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "cut graph {}: root with {} rows, {} columns",
            id,
            table.n_rows(),
            table.column_names().len()
        );
        CutGraph {
            id,
            nodes: vec![Node {
                parent: None,
                op: NodeOp::Root,
                table: Arc::new(table),
            }],
        }
    }

    /// Identifier of this graph instance, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cursor at the root node.
    pub fn root(&self) -> Cursor {
        Cursor {
            engine: self.id,
            node: 0,
        }
    }

    /// Number of nodes in the graph.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn resolve(&self, at: Cursor) -> Result<&Node> {
        if at.engine != self.id {
            return Err(Error::ForeignNode {
                engine: self.id,
                cursor_engine: at.engine,
            });
        }
        // Nodes are append-only and cursors are only minted here, so an
        // engine-matched cursor always addresses an existing node.
        Ok(&self.nodes[at.node as usize])
    }

    fn push(&mut self, parent: Cursor, op: NodeOp, table: EventTable) -> Cursor {
        let node = self.nodes.len() as u32;
        self.nodes.push(Node {
            parent: Some(parent.node),
            op,
            table: Arc::new(table),
        });
        Cursor {
            engine: self.id,
            node,
        }
    }

    /// Append a derived column and return the cursor of the new node.
    pub fn define(&mut self, at: Cursor, name: &str, expr: &str) -> Result<Cursor> {
        let compiled = CompiledExpr::compile(expr)?;
        self.define_expr(at, name, &compiled)
    }

    /// Append a derived column from a pre-compiled expression.
    pub fn define_expr(&mut self, at: Cursor, name: &str, expr: &CompiledExpr) -> Result<Cursor> {
        let table = self.resolve(at)?.table.define(name, expr)?;
        log::debug!("graph {}: define '{}' = {}", self.id, name, expr.source());
        Ok(self.push(
            at,
            NodeOp::Define {
                name: name.to_string(),
                expr: expr.source().to_string(),
            },
            table,
        ))
    }

    /// Append a column of precomputed values.
    ///
    /// `label` stands in for the expression text in the node's
    /// provenance record.
    pub fn define_values(
        &mut self,
        at: Cursor,
        name: &str,
        values: Column,
        label: &str,
    ) -> Result<Cursor> {
        let table = self.resolve(at)?.table.define_values(name, values)?;
        log::debug!("graph {}: define '{}' = {}", self.id, name, label);
        Ok(self.push(
            at,
            NodeOp::Define {
                name: name.to_string(),
                expr: label.to_string(),
            },
            table,
        ))
    }

    /// Apply a named cut and return the cursor of the surviving rows.
    pub fn cut(&mut self, at: Cursor, name: &str, predicate: &str) -> Result<Cursor> {
        let compiled = CompiledExpr::compile(predicate)?;
        self.cut_expr(at, name, &compiled)
    }

    /// Apply a named cut from a pre-compiled predicate.
    pub fn cut_expr(&mut self, at: Cursor, name: &str, predicate: &CompiledExpr) -> Result<Cursor> {
        let parent = self.resolve(at)?;
        let before = parent.table.n_rows();
        let table = parent.table.filter(predicate)?;
        let after = table.n_rows();
        log::debug!(
            "graph {}: cut '{}' kept {} of {} rows",
            self.id,
            name,
            after,
            before
        );
        if after == 0 && before > 0 {
            log::warn!("graph {}: cut '{}' removed all {} rows", self.id, name, before);
        }
        Ok(self.push(
            at,
            NodeOp::Filter {
                name: name.to_string(),
                predicate: predicate.source().to_string(),
            },
            table,
        ))
    }

    /// Apply groups of definitions and cuts in order, returning the final
    /// cursor.
    pub fn apply<'a>(
        &mut self,
        at: Cursor,
        groups: impl IntoIterator<Item = GroupRef<'a>>,
    ) -> Result<Cursor> {
        let mut cursor = at;
        for group in groups {
            match group {
                GroupRef::Vars(vars) => {
                    for (name, expr) in vars.iter() {
                        cursor = self.define(cursor, name, expr)?;
                    }
                }
                GroupRef::Cuts(cuts) => {
                    for (name, predicate) in cuts.iter() {
                        cursor = self.cut(cursor, name, predicate)?;
                    }
                }
            }
        }
        Ok(cursor)
    }

    /// The event view at a node.
    pub fn table(&self, at: Cursor) -> Result<&EventTable> {
        Ok(&self.resolve(at)?.table)
    }

    /// Column names visible at a node, in definition order.
    pub fn column_names(&self, at: Cursor) -> Result<&[String]> {
        Ok(self.resolve(at)?.table.column_names())
    }

    /// Unweighted row count at a node.
    pub fn count(&self, at: Cursor) -> Result<usize> {
        Ok(self.resolve(at)?.table.n_rows())
    }

    /// Sum of the weight column at a node, or the row count when
    /// `weight` is `None`.
    pub fn weighted_count(&self, at: Cursor, weight: Option<&str>) -> Result<f64> {
        self.resolve(at)?.table.weighted_count(weight)
    }

    /// Weighted fraction of rows at a node that satisfy a predicate.
    ///
    /// Reads only; no node is appended. Fails with
    /// [`Error::DegenerateEfficiency`] when the node's total yield is
    /// not positive.
    pub fn pass_efficiency(
        &self,
        at: Cursor,
        predicate: &str,
        weight: Option<&str>,
    ) -> Result<f64> {
        let table = &self.resolve(at)?.table;
        let total = table.weighted_count(weight)?;
        if !(total > 0.0) {
            return Err(Error::DegenerateEfficiency(format!(
                "cannot measure an efficiency from a sample with total yield {total}"
            )));
        }
        let compiled = CompiledExpr::compile(predicate)?;
        Ok(table.filter(&compiled)?.weighted_count(weight)? / total)
    }

    /// The operation that produced a node.
    pub fn operation(&self, at: Cursor) -> Result<&NodeOp> {
        Ok(&self.resolve(at)?.op)
    }

    /// Cursor of a node's parent, or `None` at the root.
    pub fn parent(&self, at: Cursor) -> Result<Option<Cursor>> {
        Ok(self.resolve(at)?.parent.map(|node| Cursor {
            engine: self.id,
            node,
        }))
    }

    /// Cursors from the root to `at`, inclusive, in application order.
    pub fn lineage(&self, at: Cursor) -> Result<Vec<Cursor>> {
        self.resolve(at)?;
        let mut path = vec![at];
        let mut cursor = at;
        while let Some(parent) = self.resolve(cursor)?.parent {
            cursor = Cursor {
                engine: self.id,
                node: parent,
            };
            path.push(cursor);
        }
        path.reverse();
        Ok(path)
    }
}
