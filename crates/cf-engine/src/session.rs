//! Linear analysis sessions over a cut graph.
//!
//! A [`Session`] pairs a [`CutGraph`] with an active cursor so the
//! common straight-line flow (define, cut, define, cut) reads without
//! threading cursors by hand. Saved cursors still branch: grab
//! [`Session::active_node`], keep chaining, then jump back with
//! [`Session::set_active_node`] to grow a sibling branch.

use std::collections::BTreeMap;

use cf_core::{Error, Result};
use cf_table::{CompiledExpr, EventTable};

use crate::cutflow::{cutflow, CutflowReport};
use crate::graph::CutGraph;
use crate::groups::{CutGroup, GroupRef};
use crate::nminus1::nminus_one;
use crate::node::Cursor;
use crate::weights::WeightBuilder;

/// A cut graph plus the cursor new operations chain from.
#[derive(Debug)]
pub struct Session {
    graph: CutGraph,
    active: Cursor,
}

impl Session {
    /// Start a session on a fresh graph rooted at this table.
    pub fn new(table: EventTable) -> Self {
        let graph = CutGraph::new(table);
        let active = graph.root();
        Session { graph, active }
    }

    /// Adopt an existing graph, activating the given node.
    pub fn from_graph(graph: CutGraph, at: Cursor) -> Result<Self> {
        graph.table(at)?;
        Ok(Session { graph, active: at })
    }

    /// The underlying graph.
    pub fn graph(&self) -> &CutGraph {
        &self.graph
    }

    /// Mutable access to the underlying graph. Operations made through
    /// it do not move the session's active cursor.
    pub fn graph_mut(&mut self) -> &mut CutGraph {
        &mut self.graph
    }

    /// The cursor the next operation will chain from.
    pub fn active_node(&self) -> Cursor {
        self.active
    }

    /// Move the active cursor to a previously obtained node.
    pub fn set_active_node(&mut self, at: Cursor) -> Result<()> {
        self.graph.table(at)?;
        self.active = at;
        Ok(())
    }

    /// Define a column at the active node and advance to the new node.
    pub fn define(&mut self, name: &str, expr: &str) -> Result<Cursor> {
        self.active = self.graph.define(self.active, name, expr)?;
        Ok(self.active)
    }

    /// [`Session::define`] with a precompiled expression.
    pub fn define_expr(&mut self, name: &str, expr: &CompiledExpr) -> Result<Cursor> {
        self.active = self.graph.define_expr(self.active, name, expr)?;
        Ok(self.active)
    }

    /// Define a column holding the same constant in every row.
    pub fn define_constant(&mut self, name: &str, value: f64) -> Result<Cursor> {
        if !value.is_finite() {
            return Err(Error::Validation(format!(
                "constant column '{name}' must be finite, got {value}"
            )));
        }
        self.define(name, &format!("{value}"))
    }

    /// Apply a named cut at the active node and advance.
    pub fn cut(&mut self, name: &str, predicate: &str) -> Result<Cursor> {
        self.active = self.graph.cut(self.active, name, predicate)?;
        Ok(self.active)
    }

    /// [`Session::cut`] with a precompiled predicate.
    pub fn cut_expr(&mut self, name: &str, predicate: &CompiledExpr) -> Result<Cursor> {
        self.active = self.graph.cut_expr(self.active, name, predicate)?;
        Ok(self.active)
    }

    /// Apply groups of definitions and cuts in order, advancing past
    /// all of them.
    pub fn apply<'a>(
        &mut self,
        groups: impl IntoIterator<Item = GroupRef<'a>>,
    ) -> Result<Cursor> {
        self.active = self.graph.apply(self.active, groups)?;
        Ok(self.active)
    }

    /// The event view at the active node.
    pub fn table(&self) -> &EventTable {
        // The active cursor is only ever set through validated paths.
        match self.graph.table(self.active) {
            Ok(table) => table,
            Err(_) => unreachable!(),
        }
    }

    /// Rows surviving at the active node.
    pub fn count(&self) -> usize {
        self.table().n_rows()
    }

    /// Weighted yield at the active node.
    pub fn weighted_count(&self, weight: Option<&str>) -> Result<f64> {
        self.table().weighted_count(weight)
    }

    /// Column names visible at the active node.
    pub fn column_names(&self) -> &[String] {
        self.table().column_names()
    }

    /// Whether a column is visible at the active node.
    pub fn has_column(&self, name: &str) -> bool {
        self.table().has_column(name)
    }

    /// Conjunction of the listed flag columns that exist at the active
    /// node, as a predicate string. Missing flags are skipped with a
    /// warning; `None` when none of them exist.
    pub fn all_of(&self, flags: &[&str]) -> Option<String> {
        self.join_flags(flags, " && ")
    }

    /// Disjunction of the listed flag columns that exist at the active
    /// node. Missing flags are skipped; `None` when none exist.
    pub fn any_of(&self, flags: &[&str]) -> Option<String> {
        self.join_flags(flags, " || ")
    }

    fn join_flags(&self, flags: &[&str], sep: &str) -> Option<String> {
        let table = self.table();
        let mut present = Vec::new();
        for flag in flags {
            if table.has_column(flag) {
                present.push(*flag);
            } else {
                log::warn!("flag column '{flag}' not found, skipping");
            }
        }
        if present.is_empty() {
            None
        } else {
            Some(present.join(sep))
        }
    }

    /// Pick one object out of a collection of array columns.
    ///
    /// Every array column named `<src>_<suffix>` (unless the suffix is
    /// listed in `skip`) yields a scalar column `<dst>_<suffix>` holding
    /// the element selected by `index`, which may be any scalar
    /// expression. Fails when the collection has no array columns to
    /// pick from.
    pub fn object_from_collection(
        &mut self,
        dst: &str,
        src: &str,
        index: &str,
        skip: &[&str],
    ) -> Result<Cursor> {
        let prefix = format!("{src}_");
        let table = self.table();
        let mut defs = Vec::new();
        for name in table.column_names() {
            let Some(suffix) = name.strip_prefix(&prefix) else {
                continue;
            };
            if skip.contains(&suffix) {
                continue;
            }
            match table.column(name) {
                Some(c) if c.is_array() => {
                    defs.push((format!("{dst}_{suffix}"), format!("{name}[{index}]")));
                }
                _ => {}
            }
        }
        if defs.is_empty() {
            return Err(Error::Validation(format!(
                "no array columns with prefix '{prefix}' to pick '{dst}' from"
            )));
        }
        log::debug!(
            "picking object '{}' from '{}' via {} column(s)",
            dst,
            src,
            defs.len()
        );
        for (name, expr) in &defs {
            self.define(name, expr)?;
        }
        Ok(self.active)
    }

    /// Define nominal and varied weight columns at the active node.
    pub fn make_weight_cols(
        &mut self,
        builder: &WeightBuilder,
        extra: Option<&str>,
    ) -> Result<Cursor> {
        self.active = builder.make_weight_cols(&mut self.graph, self.active, extra)?;
        Ok(self.active)
    }

    /// Branch N minus one selections off the active node. The active
    /// cursor stays put.
    pub fn nminus_one(&mut self, cuts: &CutGroup) -> Result<BTreeMap<String, Cursor>> {
        nminus_one(&mut self.graph, self.active, cuts)
    }

    /// Cutflow along the lineage of the active node.
    pub fn cutflow(&self, weight: Option<&str>) -> Result<CutflowReport> {
        cutflow(&self.graph, self.active, weight)
    }
}
