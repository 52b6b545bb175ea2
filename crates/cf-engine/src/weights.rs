//! Systematic weight assembly.
//!
//! Correction sources provide per-event factors as columns named
//! `<source>__nom`, `<source>__up`, and `<source>__down`. The
//! [`WeightBuilder`] turns a set of registered sources into a nominal
//! event weight plus one up and one down variation per source that
//! carries an uncertainty, so downstream yields can be varied one
//! source at a time.

use cf_core::{CorrectionKind, CorrectionSpec, Error, Result};

use crate::graph::CutGraph;
use crate::node::Cursor;

/// Column name of the nominal event weight.
pub const NOMINAL_WEIGHT: &str = "weight__nominal";

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One registered correction source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    name: String,
    kind: CorrectionKind,
}

impl Correction {
    /// New correction source. The name must be a plain identifier since
    /// column names are derived from it.
    pub fn new(name: impl Into<String>, kind: CorrectionKind) -> Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(Error::Validation(format!(
                "correction name '{name}' is not a valid identifier"
            )));
        }
        Ok(Correction { name, kind })
    }

    /// Source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How this source enters the weight product.
    pub fn kind(&self) -> CorrectionKind {
        self.kind
    }

    /// Input column holding the nominal factor.
    pub fn nominal_column(&self) -> String {
        format!("{}__nom", self.name)
    }

    /// Input column holding the upward variation.
    pub fn up_column(&self) -> String {
        format!("{}__up", self.name)
    }

    /// Input column holding the downward variation.
    pub fn down_column(&self) -> String {
        format!("{}__down", self.name)
    }

    fn has_nominal(&self) -> bool {
        matches!(self.kind, CorrectionKind::Weight | CorrectionKind::Corr)
    }

    fn has_variations(&self) -> bool {
        matches!(self.kind, CorrectionKind::Weight | CorrectionKind::Uncert)
    }
}

/// Assembles nominal and varied event weight columns from registered
/// correction sources.
#[derive(Debug, Clone, Default)]
pub struct WeightBuilder {
    corrections: Vec<Correction>,
}

impl WeightBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        WeightBuilder::default()
    }

    /// Builder preloaded from configured correction specs, in order.
    pub fn from_config(specs: &[CorrectionSpec]) -> Result<Self> {
        let mut builder = WeightBuilder::new();
        for spec in specs {
            builder.register(Correction::new(spec.name.clone(), spec.kind)?)?;
        }
        Ok(builder)
    }

    /// Register a correction source. Registration order fixes the order
    /// in which variation columns are defined.
    pub fn register(&mut self, correction: Correction) -> Result<&mut Self> {
        if self.corrections.iter().any(|c| c.name == correction.name) {
            return Err(Error::Validation(format!(
                "correction '{}' is already registered",
                correction.name
            )));
        }
        self.corrections.push(correction);
        Ok(self)
    }

    /// Registered sources in registration order.
    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    /// Names of the weight columns [`WeightBuilder::make_weight_cols`]
    /// will define, in definition order.
    pub fn weight_columns(&self) -> Vec<String> {
        let mut names = vec![NOMINAL_WEIGHT.to_string()];
        for c in &self.corrections {
            if c.has_variations() {
                names.push(format!("weight__{}_up", c.name));
                names.push(format!("weight__{}_down", c.name));
            }
        }
        names
    }

    fn nominal_factors(&self, extra: Option<&str>) -> Vec<String> {
        let mut factors = Vec::new();
        if let Some(expr) = extra {
            factors.push(format!("({expr})"));
        }
        for c in &self.corrections {
            if c.has_nominal() {
                factors.push(c.nominal_column());
            }
        }
        factors
    }

    fn product(factors: &[String]) -> String {
        if factors.is_empty() {
            "1.0".to_string()
        } else {
            factors.join(" * ")
        }
    }

    /// Define the nominal weight and all per-source variations.
    ///
    /// The nominal weight is the product of `extra` (an expression, for
    /// example a generator weight times a cross-section scale) and the
    /// nominal factor of every source that has one. Each source with
    /// variations then gets `weight__<source>_up` and
    /// `weight__<source>_down` columns: a [`CorrectionKind::Weight`]
    /// source swaps its own nominal factor for the varied one, while a
    /// [`CorrectionKind::Uncert`] source multiplies its variation on top
    /// of the full nominal product.
    ///
    /// Fails with [`Error::UnknownColumn`] when a required input column
    /// is missing from the node.
    pub fn make_weight_cols(
        &self,
        graph: &mut CutGraph,
        at: Cursor,
        extra: Option<&str>,
    ) -> Result<Cursor> {
        let nominal = Self::product(&self.nominal_factors(extra));
        let mut cursor = graph.define(at, NOMINAL_WEIGHT, &nominal)?;
        for c in &self.corrections {
            if !c.has_variations() {
                continue;
            }
            let (up, down) = match c.kind {
                CorrectionKind::Weight => {
                    let swap = |varied: String| {
                        let factors: Vec<String> = self
                            .nominal_factors(extra)
                            .into_iter()
                            .map(|f| if f == c.nominal_column() { varied.clone() } else { f })
                            .collect();
                        Self::product(&factors)
                    };
                    (swap(c.up_column()), swap(c.down_column()))
                }
                CorrectionKind::Uncert => (
                    format!("{} * {}", NOMINAL_WEIGHT, c.up_column()),
                    format!("{} * {}", NOMINAL_WEIGHT, c.down_column()),
                ),
                CorrectionKind::Corr => unreachable!("corr sources have no variations"),
            };
            cursor = graph.define(cursor, &format!("weight__{}_up", c.name), &up)?;
            cursor = graph.define(cursor, &format!("weight__{}_down", c.name), &down)?;
        }
        log::debug!(
            "defined {} weight columns from {} correction sources",
            self.weight_columns().len(),
            self.corrections.len()
        );
        Ok(cursor)
    }
}
