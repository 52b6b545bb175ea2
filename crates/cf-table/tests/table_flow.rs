//! Integration tests: chained define/filter flows over a synthetic sample.

use approx::assert_relative_eq;
use cf_table::{Column, CompiledExpr, EventTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dijet-like sample: two jets per event plus an event weight.
fn synthetic_sample(n: usize, seed: u64) -> EventTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut jet_pt = Vec::with_capacity(2 * n);
    let mut jet_eta = Vec::with_capacity(2 * n);
    let mut weight = Vec::with_capacity(n);
    for _ in 0..n {
        for _ in 0..2 {
            jet_pt.push(250.0 + 600.0 * rng.gen::<f64>());
            jet_eta.push(-3.0 + 6.0 * rng.gen::<f64>());
        }
        weight.push(0.5 + rng.gen::<f64>());
    }
    EventTable::from_columns(vec![
        ("jet_pt".to_string(), Column::array(2, jet_pt).unwrap()),
        ("jet_eta".to_string(), Column::array(2, jet_eta).unwrap()),
        ("weight".to_string(), Column::scalar(weight)),
    ])
    .unwrap()
}

#[test]
fn chained_define_and_filter() {
    let t = synthetic_sample(500, 7);

    let ht = CompiledExpr::compile("jet_pt[0] + jet_pt[1]").unwrap();
    let t = t.define("ht", &ht).unwrap();

    let pre = CompiledExpr::compile(
        "jet_pt[0] > 350 && jet_pt[1] > 350 && abs(jet_eta[0]) < 2.4 && abs(jet_eta[1]) < 2.4",
    )
    .unwrap();
    let selected = t.filter(&pre).unwrap();

    assert!(selected.n_rows() > 0);
    assert!(selected.n_rows() < t.n_rows());

    // Every surviving row satisfies the predicate.
    let ok = selected.evaluate(&pre).unwrap();
    assert!(ok.iter().all(|v| *v == 1.0));

    // ht survived the filter and stays consistent with its inputs.
    let ht_vals = selected.scalar("ht").unwrap();
    let (pt, width) = selected.array("jet_pt").unwrap();
    for (row, ht) in ht_vals.iter().enumerate() {
        assert_relative_eq!(*ht, pt[row * width] + pt[row * width + 1]);
    }
}

#[test]
fn filter_then_define_sees_filtered_rows() {
    let t = synthetic_sample(200, 11);
    let cut = CompiledExpr::compile("jet_pt[0] > 600").unwrap();
    let f = t.filter(&cut).unwrap();
    let e = CompiledExpr::compile("jet_pt[0] / 1000").unwrap();
    let f = f.define("lead_tev", &e).unwrap();
    assert_eq!(f.scalar("lead_tev").unwrap().len(), f.n_rows());
    assert!(f.scalar("lead_tev").unwrap().iter().all(|v| *v > 0.6));
}

#[test]
fn large_table_bulk_evaluation() {
    // Enough rows to exercise the parallel evaluation path.
    let t = synthetic_sample(40_000, 3);
    let e = CompiledExpr::compile("sqrt(jet_pt[0] * jet_pt[1]) > 400").unwrap();
    let vals = t.evaluate(&e).unwrap();
    assert_eq!(vals.len(), t.n_rows());

    // Serial spot check of a few rows.
    let (pt, width) = t.array("jet_pt").unwrap();
    for row in [0usize, 1_234, 39_999] {
        let expect = if (pt[row * width] * pt[row * width + 1]).sqrt() > 400.0 {
            1.0
        } else {
            0.0
        };
        assert_eq!(vals[row], expect, "row {row}");
    }

    let selected = t.filter(&e).unwrap();
    let total: f64 = selected.sum("weight").unwrap();
    assert!(total > 0.0);
    assert!(selected.n_rows() < t.n_rows());
}

#[test]
fn weighted_yields_match_manual_loop() {
    let t = synthetic_sample(1_000, 19);
    let cut = CompiledExpr::compile("jet_pt[0] > 500").unwrap();

    let mask = t.evaluate(&cut).unwrap();
    let w = t.scalar("weight").unwrap();
    let manual: f64 = mask
        .iter()
        .zip(w)
        .filter_map(|(m, w)| (*m > 0.0).then_some(*w))
        .sum();

    let selected = t.filter(&cut).unwrap();
    assert_relative_eq!(selected.weighted_count(Some("weight")).unwrap(), manual);
}
