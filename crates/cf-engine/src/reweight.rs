//! Data-driven category reweighting.
//!
//! A classifier working point splits events into categories (fail/pass,
//! or fail/loose/tight with two thresholds). Simulation rarely
//! reproduces the category fractions measured in data, so simulated
//! events are migrated between categories until the expected fractions
//! match the measured targets: each event keeps or changes its category
//! based on a deterministic per-event draw, with probabilities chosen so
//! that the expectation over the sample lands on the target.
//!
//! Demoted events always fall to the fail category; promotions source
//! from the fail category, tight before loose when both must grow.

use cf_core::{AnalysisConfig, Error, Result};
use cf_table::Column;

use crate::draw::{event_id_from_f64, uniform, DEFAULT_SEED};
use crate::graph::CutGraph;
use crate::node::Cursor;

/// Discriminant thresholds defining a classifier's categories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkingPoints {
    /// One threshold: fail (0) and pass (1).
    One(f64),
    /// Two ascending thresholds: fail (0), loose (1), and tight (2).
    Two {
        /// Lower threshold, opening the loose category.
        loose: f64,
        /// Upper threshold, opening the tight category.
        pass: f64,
    },
}

impl WorkingPoints {
    /// Single working point.
    pub fn one(wp: f64) -> Result<Self> {
        if !wp.is_finite() {
            return Err(Error::Validation("working point must be finite".into()));
        }
        Ok(WorkingPoints::One(wp))
    }

    /// Two ascending working points.
    pub fn two(loose: f64, pass: f64) -> Result<Self> {
        if !loose.is_finite() || !pass.is_finite() {
            return Err(Error::Validation("working points must be finite".into()));
        }
        if loose >= pass {
            return Err(Error::Validation(format!(
                "working points must be ascending: {loose} >= {pass}"
            )));
        }
        Ok(WorkingPoints::Two { loose, pass })
    }

    /// Working points of a configured classifier.
    pub fn from_config(config: &AnalysisConfig, classifier: &str) -> Result<Self> {
        let clf = config.classifiers.get(classifier).ok_or_else(|| {
            Error::Validation(format!("classifier '{classifier}' is not configured"))
        })?;
        match clf.working_points.as_slice() {
            [wp] => WorkingPoints::one(*wp),
            [lo, hi] => WorkingPoints::two(*lo, *hi),
            _ => Err(Error::Validation(format!(
                "classifier '{classifier}' has an invalid working point list"
            ))),
        }
    }

    /// Number of categories (2 or 3).
    pub fn n_categories(&self) -> usize {
        match self {
            WorkingPoints::One(_) => 2,
            WorkingPoints::Two { .. } => 3,
        }
    }

    /// Expression mapping the discriminant to its category number.
    fn category_expr(&self, discriminant: &str) -> String {
        match self {
            WorkingPoints::One(wp) => format!("({discriminant} >= {wp})"),
            WorkingPoints::Two { loose, pass } => {
                format!("({discriminant} >= {loose}) + ({discriminant} >= {pass})")
            }
        }
    }

    fn pass_expr(&self, discriminant: &str) -> String {
        match self {
            WorkingPoints::One(wp) => format!("{discriminant} >= {wp}"),
            WorkingPoints::Two { pass, .. } => format!("{discriminant} >= {pass}"),
        }
    }

    fn loose_expr(&self, discriminant: &str) -> Option<String> {
        match self {
            WorkingPoints::One(_) => None,
            WorkingPoints::Two { loose, pass } => Some(format!(
                "({discriminant} >= {loose}) && ({discriminant} < {pass})"
            )),
        }
    }
}

/// Category fractions of a sample: measured from simulation or supplied
/// as the target to migrate towards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Efficiencies {
    /// Fraction in the loose category; `None` for single-threshold
    /// classifiers.
    pub loose: Option<f64>,
    /// Fraction in the passing (tight) category.
    pub pass: f64,
}

impl Efficiencies {
    /// Fractions for a single-threshold classifier.
    pub fn single(pass: f64) -> Self {
        Efficiencies { loose: None, pass }
    }

    /// Fractions for a two-threshold classifier.
    pub fn with_loose(loose: f64, pass: f64) -> Self {
        Efficiencies {
            loose: Some(loose),
            pass,
        }
    }

    /// Migration divides by these fractions and their complements, so
    /// each one must lie strictly inside (0, 1).
    fn validate(&self, wps: &WorkingPoints, what: &str) -> Result<()> {
        let check = |name: &str, v: f64| -> Result<()> {
            if !(v > 0.0 && v < 1.0) {
                return Err(Error::DegenerateEfficiency(format!(
                    "{what} {name} efficiency {v} outside (0, 1)"
                )));
            }
            Ok(())
        };
        check("pass", self.pass)?;
        match (wps, self.loose) {
            (WorkingPoints::One(_), None) => Ok(()),
            (WorkingPoints::One(_), Some(_)) => Err(Error::Validation(format!(
                "{what} efficiencies carry a loose fraction but the classifier has one working point"
            ))),
            (WorkingPoints::Two { .. }, None) => Err(Error::Validation(format!(
                "{what} efficiencies lack the loose fraction required by two working points"
            ))),
            (WorkingPoints::Two { .. }, Some(loose)) => {
                check("loose", loose)?;
                if loose + self.pass >= 1.0 {
                    return Err(Error::DegenerateEfficiency(format!(
                        "{what} loose + pass fractions leave no failing events: {} + {}",
                        loose, self.pass
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Migration probabilities for a single-threshold classifier.
struct TwoCatPlan {
    keep_pass: f64,
    promote_fail: f64,
}

/// Migration probabilities for a two-threshold classifier.
struct ThreeCatPlan {
    keep_tight: f64,
    keep_loose: f64,
    promote_tight: f64,
    promote_loose_after_tight: f64,
}

enum Plan {
    Two(TwoCatPlan),
    Three(ThreeCatPlan),
}

/// Migrates events between classifier categories so the sample's
/// expected category fractions match a measured target.
#[derive(Debug, Clone)]
pub struct CategoryReweighter {
    classifier: String,
    region: String,
    wps: WorkingPoints,
    discriminant: String,
    event_id: String,
    seed: u64,
}

impl CategoryReweighter {
    /// New reweighter for one classifier in one region.
    ///
    /// `discriminant` names the scalar column holding the classifier
    /// output; `event_id` names the column carrying the stable event
    /// identifier that keys the per-event draws.
    pub fn new(
        classifier: impl Into<String>,
        region: impl Into<String>,
        wps: WorkingPoints,
        discriminant: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        CategoryReweighter {
            classifier: classifier.into(),
            region: region.into(),
            wps,
            discriminant: discriminant.into(),
            event_id: event_id.into(),
            seed: DEFAULT_SEED,
        }
    }

    /// Build from a configured classifier; the region must be present in
    /// the classifier's target table.
    pub fn from_config(
        config: &AnalysisConfig,
        classifier: &str,
        region: &str,
        discriminant: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Result<Self> {
        let wps = WorkingPoints::from_config(config, classifier)?;
        let clf = &config.classifiers[classifier];
        if !clf.targets.contains_key(region) {
            return Err(Error::Validation(format!(
                "classifier '{classifier}' has no targets for region '{region}'"
            )));
        }
        Ok(CategoryReweighter::new(
            classifier,
            region,
            wps,
            discriminant,
            event_id,
        ))
    }

    /// Replace the draw seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The configured target efficiencies for this classifier and region.
    pub fn target_from_config(&self, config: &AnalysisConfig) -> Result<Efficiencies> {
        let clf = config.classifiers.get(&self.classifier).ok_or_else(|| {
            Error::Validation(format!(
                "classifier '{}' is not configured",
                self.classifier
            ))
        })?;
        let t = clf.targets.get(&self.region).ok_or_else(|| {
            Error::Validation(format!(
                "classifier '{}' has no targets for region '{}'",
                self.classifier, self.region
            ))
        })?;
        Ok(Efficiencies {
            loose: t.loose,
            pass: t.pass,
        })
    }

    /// Name of the original category column this reweighter defines.
    pub fn category_column(&self) -> String {
        format!("{}_cat", self.classifier)
    }

    /// Name of the migrated category column.
    pub fn updated_column(&self) -> String {
        format!("{}_cat_updated", self.classifier)
    }

    /// Define the original category column from the discriminant.
    pub fn tag(&self, graph: &mut CutGraph, at: Cursor) -> Result<Cursor> {
        let expr = self.wps.category_expr(&self.discriminant);
        graph.define(at, &self.category_column(), &expr)
    }

    /// Measure the sample's category fractions from the discriminant.
    ///
    /// Side-effect free: the graph is only read. The fractions are
    /// weighted when a weight column is given.
    pub fn simulated_efficiencies(
        &self,
        graph: &CutGraph,
        at: Cursor,
        weight: Option<&str>,
    ) -> Result<Efficiencies> {
        let pass = graph.pass_efficiency(at, &self.wps.pass_expr(&self.discriminant), weight)?;
        let loose = match self.wps.loose_expr(&self.discriminant) {
            Some(expr) => Some(graph.pass_efficiency(at, &expr, weight)?),
            None => None,
        };
        Ok(Efficiencies { loose, pass })
    }

    fn plan(&self, sim: &Efficiencies, target: &Efficiencies) -> Result<Plan> {
        sim.validate(&self.wps, "simulated")?;
        target.validate(&self.wps, "target")?;
        match self.wps {
            WorkingPoints::One(_) => {
                let s = sim.pass;
                let t = target.pass;
                Ok(Plan::Two(TwoCatPlan {
                    keep_pass: if t < s { t / s } else { 1.0 },
                    promote_fail: if t > s { (t - s) / (1.0 - s) } else { 0.0 },
                }))
            }
            WorkingPoints::Two { .. } => {
                let (l_sim, t_sim) = (sim.loose.unwrap(), sim.pass);
                let (l_tgt, t_tgt) = (target.loose.unwrap(), target.pass);
                let keep_tight = if t_tgt < t_sim { t_tgt / t_sim } else { 1.0 };
                let keep_loose = if l_tgt < l_sim { l_tgt / l_sim } else { 1.0 };
                let grow_tight = (t_tgt - t_sim).max(0.0);
                let grow_loose = (l_tgt - l_sim).max(0.0);
                // Strictly positive after validation.
                let fail_sim = 1.0 - l_sim - t_sim;
                let promote_tight = grow_tight / fail_sim;
                let promote_loose = grow_loose / fail_sim;
                if promote_tight > 1.0 || promote_tight + promote_loose > 1.0 {
                    return Err(Error::DegenerateEfficiency(format!(
                        "'{}' in region '{}': target exceeds the failing fraction \
                         available for promotion ({:.4} + {:.4} of {:.4})",
                        self.classifier, self.region, grow_tight, grow_loose, fail_sim
                    )));
                }
                let promote_loose_after_tight = if promote_tight < 1.0 {
                    promote_loose / (1.0 - promote_tight)
                } else {
                    0.0
                };
                Ok(Plan::Three(ThreeCatPlan {
                    keep_tight,
                    keep_loose,
                    promote_tight,
                    promote_loose_after_tight,
                }))
            }
        }
    }

    /// Migrate categories towards the target fractions.
    ///
    /// Requires the original category column (see
    /// [`CategoryReweighter::tag`]) and appends the migrated column in a
    /// new node. Each event's decision is keyed by its identifier, so
    /// the outcome is independent of how the sample is partitioned.
    pub fn migrate(
        &self,
        graph: &mut CutGraph,
        at: Cursor,
        sim: &Efficiencies,
        target: &Efficiencies,
    ) -> Result<Cursor> {
        let updated_name = self.updated_column();
        let table = graph.table(at)?;
        if table.has_column(&updated_name) {
            return Err(Error::DuplicateColumn(updated_name));
        }
        let plan = self.plan(sim, target)?;
        let categories = table.scalar(&self.category_column())?;
        let ids = table.scalar(&self.event_id)?;
        let context = format!("{}/{}", self.classifier, self.region);

        let n_cats = self.wps.n_categories();
        let mut before = [0usize; 3];
        let mut after = [0usize; 3];
        let mut updated = Vec::with_capacity(categories.len());
        for (row, (&cat, &id)) in categories.iter().zip(ids).enumerate() {
            let id = event_id_from_f64(id)?;
            let cat = if cat >= 0.0 && cat.fract() == 0.0 && (cat as usize) < n_cats {
                cat as usize
            } else {
                return Err(Error::Validation(format!(
                    "unexpected category value {cat} at row {row} of '{}'",
                    self.category_column()
                )));
            };
            before[cat] += 1;
            let u = uniform(self.seed, id, &context, 0);
            let new_cat = match &plan {
                Plan::Two(p) => match cat {
                    1 => {
                        if u < p.keep_pass {
                            1
                        } else {
                            0
                        }
                    }
                    _ => {
                        if u < p.promote_fail {
                            1
                        } else {
                            0
                        }
                    }
                },
                Plan::Three(p) => match cat {
                    2 => {
                        if u < p.keep_tight {
                            2
                        } else {
                            0
                        }
                    }
                    1 => {
                        if u < p.keep_loose {
                            1
                        } else {
                            0
                        }
                    }
                    _ => {
                        if u < p.promote_tight {
                            2
                        } else if p.promote_loose_after_tight > 0.0
                            && uniform(self.seed, id, &context, 1)
                                < p.promote_loose_after_tight
                        {
                            1
                        } else {
                            0
                        }
                    }
                },
            };
            after[new_cat] += 1;
            updated.push(new_cat as f64);
        }

        log::debug!(
            "category migration {}: {:?} -> {:?} of {} rows",
            context,
            &before[..n_cats],
            &after[..n_cats],
            categories.len()
        );

        let label = format!("category_migration({context})");
        graph.define_values(at, &updated_name, Column::scalar(updated), &label)
    }

    /// Tag, measure, and migrate in one step.
    ///
    /// Returns the cursor after migration and the measured simulated
    /// efficiencies.
    pub fn run(
        &self,
        graph: &mut CutGraph,
        at: Cursor,
        weight: Option<&str>,
        target: &Efficiencies,
    ) -> Result<(Cursor, Efficiencies)> {
        let tagged = self.tag(graph, at)?;
        let sim = self.simulated_efficiencies(graph, tagged, weight)?;
        let cursor = self.migrate(graph, tagged, &sim, target)?;
        Ok((cursor, sim))
    }
}
