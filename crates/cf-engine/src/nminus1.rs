//! N-1 expansion of a cut group.
//!
//! For a group of k cuts this produces k+1 branches from a common
//! starting node: the `"full"` branch with every cut applied, and one
//! `"minus_<cut>"` branch per cut with that cut left out. Comparing a
//! distribution between `"full"` and `"minus_x"` shows what cut `x`
//! alone removes.

use std::collections::BTreeMap;

use cf_core::Result;

use crate::graph::CutGraph;
use crate::groups::CutGroup;
use crate::node::Cursor;

/// Expand `cuts` into the full branch and one leave-one-out branch per
/// cut, all rooted at `start`.
///
/// Keys of the returned map are `"full"` and `"minus_<cut>"`. Relative
/// cut order within every branch follows the group's insertion order.
/// An empty group yields just `{"full": start}`.
pub fn nminus_one(
    graph: &mut CutGraph,
    start: Cursor,
    cuts: &CutGroup,
) -> Result<BTreeMap<String, Cursor>> {
    let mut branches = BTreeMap::new();

    let full = graph.apply(start, [cuts.as_group()])?;
    branches.insert("full".to_string(), full);

    for (skipped, _) in cuts.iter() {
        let mut cursor = start;
        for (name, predicate) in cuts.iter() {
            if name == skipped {
                continue;
            }
            cursor = graph.cut(cursor, name, predicate)?;
        }
        branches.insert(format!("minus_{skipped}"), cursor);
    }

    Ok(branches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_table::{Column, EventTable};

    fn graph() -> CutGraph {
        // Rows chosen so each cut removes a distinct subset.
        let t = EventTable::from_columns(vec![
            (
                "pt".to_string(),
                Column::scalar(vec![500.0, 200.0, 500.0, 500.0, 500.0]),
            ),
            (
                "eta".to_string(),
                Column::scalar(vec![0.1, 0.1, 3.0, 0.1, 0.1]),
            ),
            (
                "msd".to_string(),
                Column::scalar(vec![100.0, 100.0, 100.0, 20.0, 100.0]),
            ),
        ])
        .unwrap();
        CutGraph::new(t)
    }

    fn cuts() -> CutGroup {
        let mut g = CutGroup::new("sel");
        g.add("pt_cut", "pt > 400");
        g.add("eta_cut", "abs(eta) < 2.4");
        g.add("msd_cut", "msd > 50");
        g
    }

    #[test]
    fn produces_full_and_one_branch_per_cut() {
        let mut g = graph();
        let start = g.root();
        let branches = nminus_one(&mut g, start, &cuts()).unwrap();

        assert_eq!(branches.len(), 4);
        let keys: Vec<_> = branches.keys().cloned().collect();
        assert!(keys.contains(&"full".to_string()));
        assert!(keys.contains(&"minus_pt_cut".to_string()));
        assert!(keys.contains(&"minus_eta_cut".to_string()));
        assert!(keys.contains(&"minus_msd_cut".to_string()));

        // Row 0 and row 4 pass everything; each minus branch recovers
        // exactly the row its skipped cut rejects.
        assert_eq!(g.count(branches["full"]).unwrap(), 2);
        assert_eq!(g.count(branches["minus_pt_cut"]).unwrap(), 3);
        assert_eq!(g.count(branches["minus_eta_cut"]).unwrap(), 3);
        assert_eq!(g.count(branches["minus_msd_cut"]).unwrap(), 3);
    }

    #[test]
    fn full_branch_never_exceeds_minus_branches() {
        let mut g = graph();
        let start = g.root();
        let branches = nminus_one(&mut g, start, &cuts()).unwrap();
        let full = g.count(branches["full"]).unwrap();
        for (key, cursor) in &branches {
            assert!(
                g.count(*cursor).unwrap() >= full,
                "branch {key} smaller than full"
            );
        }
    }

    #[test]
    fn branch_lineage_preserves_relative_order() {
        let mut g = graph();
        let start = g.root();
        let branches = nminus_one(&mut g, start, &cuts()).unwrap();

        let names_along = |cursor: Cursor| -> Vec<String> {
            g.lineage(cursor)
                .unwrap()
                .iter()
                .filter_map(|c| g.operation(*c).unwrap().name().map(String::from))
                .collect()
        };

        assert_eq!(
            names_along(branches["full"]),
            vec!["pt_cut", "eta_cut", "msd_cut"]
        );
        assert_eq!(
            names_along(branches["minus_eta_cut"]),
            vec!["pt_cut", "msd_cut"]
        );
        assert_eq!(
            names_along(branches["minus_pt_cut"]),
            vec!["eta_cut", "msd_cut"]
        );
    }

    #[test]
    fn branches_share_the_starting_node() {
        let mut g = graph();
        let pre = g.cut(g.root(), "presel", "pt > 100").unwrap();
        let branches = nminus_one(&mut g, pre, &cuts()).unwrap();
        for cursor in branches.values() {
            let path = g.lineage(*cursor).unwrap();
            assert!(path.contains(&pre));
        }
        // Starting node itself is untouched.
        assert_eq!(g.count(pre).unwrap(), 5);
    }

    #[test]
    fn empty_group_yields_only_full() {
        let mut g = graph();
        let start = g.root();
        let branches = nminus_one(&mut g, start, &CutGroup::new("empty")).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches["full"], start);
    }

    #[test]
    fn single_cut_group() {
        let mut g = graph();
        let start = g.root();
        let mut one = CutGroup::new("one");
        one.add("pt_cut", "pt > 400");
        let branches = nminus_one(&mut g, start, &one).unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(g.count(branches["full"]).unwrap(), 4);
        // Skipping the only cut leaves the start unchanged.
        assert_eq!(branches["minus_pt_cut"], start);
        assert_eq!(g.count(branches["minus_pt_cut"]).unwrap(), 5);
    }
}
