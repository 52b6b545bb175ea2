//! Cutflow reports derived from a node's ancestry.

use std::fmt;

use cf_core::Result;

use crate::graph::CutGraph;
use crate::node::{Cursor, NodeOp};

/// Yield after one cut of a lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct CutflowStep {
    /// Cut name.
    pub cut: String,
    /// Weighted yield after this cut.
    pub passed: f64,
}

/// Yields along the path from the root to a node, one entry per cut.
///
/// Definition stages do not change the yield and are not listed.
#[derive(Debug, Clone, PartialEq)]
pub struct CutflowReport {
    /// Weighted yield at the root of the lineage.
    pub initial: f64,
    /// One entry per cut, in application order.
    pub steps: Vec<CutflowStep>,
}

impl CutflowReport {
    /// Yield after the final cut (the initial yield if there are none).
    pub fn final_yield(&self) -> f64 {
        self.steps.last().map_or(self.initial, |s| s.passed)
    }

    /// Overall efficiency relative to the initial yield.
    pub fn efficiency(&self) -> f64 {
        self.final_yield() / self.initial
    }
}

impl fmt::Display for CutflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<28}{:>14.3}{:>10}", "initial", self.initial, "")?;
        for step in &self.steps {
            writeln!(
                f,
                "{:<28}{:>14.3}{:>10.4}",
                step.cut,
                step.passed,
                step.passed / self.initial
            )?;
        }
        Ok(())
    }
}

/// Walk the ancestry of `at` and report the yield after every cut.
///
/// When `weight` is given, the column must be visible along the whole
/// lineage; columns defined at the root always are.
pub fn cutflow(graph: &CutGraph, at: Cursor, weight: Option<&str>) -> Result<CutflowReport> {
    let path = graph.lineage(at)?;
    let initial = graph.weighted_count(path[0], weight)?;
    let mut steps = Vec::new();
    for cursor in &path {
        if let NodeOp::Filter { name, .. } = graph.operation(*cursor)? {
            steps.push(CutflowStep {
                cut: name.clone(),
                passed: graph.weighted_count(*cursor, weight)?,
            });
        }
    }
    Ok(CutflowReport { initial, steps })
}
