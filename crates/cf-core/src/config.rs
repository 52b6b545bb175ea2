//! Analysis configuration loaded from JSON.
//!
//! A configuration file carries the numeric inputs a selection needs but
//! that should not be hard-coded: cut thresholds, trigger lists per era,
//! luminosities, cross sections, classifier working points with their
//! per-region target efficiencies, and the list of registered correction
//! sources.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A cut threshold: either a single lower bound or a `[lo, hi]` window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CutValue {
    /// Single scalar threshold.
    Scalar(f64),
    /// Two-sided window `[lo, hi]`.
    Window([f64; 2]),
}

impl CutValue {
    /// The scalar threshold, or an error if this is a window.
    pub fn scalar(&self) -> Result<f64> {
        match self {
            CutValue::Scalar(v) => Ok(*v),
            CutValue::Window(_) => Err(Error::Validation(
                "expected a scalar cut value, found a window".into(),
            )),
        }
    }

    /// The `[lo, hi]` window, or an error if this is a scalar.
    pub fn window(&self) -> Result<[f64; 2]> {
        match self {
            CutValue::Window(w) => Ok(*w),
            CutValue::Scalar(_) => Err(Error::Validation(
                "expected a window cut value, found a scalar".into(),
            )),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            CutValue::Scalar(v) => v.is_finite(),
            CutValue::Window(w) => w[0].is_finite() && w[1].is_finite(),
        }
    }
}

/// How a correction source enters the event weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionKind {
    /// Varied weight: nominal, up, and down columns all multiply in.
    Weight,
    /// Pure uncertainty: nominal weight is 1, only the variations matter.
    Uncert,
    /// Flat correction: a nominal column with no variations.
    Corr,
}

/// A registered correction source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionSpec {
    /// Source name; weight columns derive from it.
    pub name: String,
    /// How the source enters the weight product.
    pub kind: CorrectionKind,
}

/// Target efficiencies for one region of a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEfficiencies {
    /// Target efficiency of the intermediate category, if the classifier
    /// has two working points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loose: Option<f64>,
    /// Target efficiency of the passing category.
    pub pass: f64,
}

/// Working points and per-region targets for one classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Ascending discriminant thresholds; one or two entries.
    pub working_points: Vec<f64>,
    /// Target efficiencies keyed by region name.
    pub targets: BTreeMap<String, TargetEfficiencies>,
}

/// Top-level analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Named cut thresholds.
    #[serde(default)]
    pub cuts: BTreeMap<String, CutValue>,
    /// Trigger flag columns keyed by era.
    #[serde(default)]
    pub triggers: BTreeMap<String, Vec<String>>,
    /// Integrated luminosity keyed by era.
    #[serde(default)]
    pub luminosity: BTreeMap<String, f64>,
    /// Cross sections keyed by sample name.
    #[serde(default)]
    pub cross_sections: BTreeMap<String, f64>,
    /// Classifier working points and targets.
    #[serde(default)]
    pub classifiers: BTreeMap<String, ClassifierConfig>,
    /// Registered correction sources, in application order.
    #[serde(default)]
    pub corrections: Vec<CorrectionSpec>,
}

impl AnalysisConfig {
    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: AnalysisConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let cfg: AnalysisConfig = serde_json::from_reader(std::io::BufReader::new(file))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check internal consistency of the configuration.
    pub fn validate(&self) -> Result<()> {
        for (name, cut) in &self.cuts {
            if !cut.is_finite() {
                return Err(Error::Validation(format!(
                    "cut '{name}' has a non-finite value"
                )));
            }
            if let CutValue::Window([lo, hi]) = cut {
                if lo >= hi {
                    return Err(Error::Validation(format!(
                        "cut '{name}' window is not ascending: [{lo}, {hi}]"
                    )));
                }
            }
        }
        for (era, lumi) in &self.luminosity {
            if !lumi.is_finite() || *lumi <= 0.0 {
                return Err(Error::Validation(format!(
                    "luminosity for era '{era}' must be finite and positive, got {lumi}"
                )));
            }
        }
        for (sample, xsec) in &self.cross_sections {
            if !xsec.is_finite() || *xsec <= 0.0 {
                return Err(Error::Validation(format!(
                    "cross section for '{sample}' must be finite and positive, got {xsec}"
                )));
            }
        }
        for (name, clf) in &self.classifiers {
            clf.validate(name)?;
        }
        let mut seen = std::collections::BTreeSet::new();
        for spec in &self.corrections {
            if spec.name.is_empty() {
                return Err(Error::Validation("correction with empty name".into()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::Validation(format!(
                    "correction '{}' registered twice",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// Per-event normalization `lumi * xsec / gen_event_sumw` for a sample.
    ///
    /// Data samples carry unit weight and should not call this.
    pub fn xsec_scale(&self, era: &str, sample: &str, gen_event_sumw: f64) -> Result<f64> {
        let lumi = self
            .luminosity
            .get(era)
            .ok_or_else(|| Error::Validation(format!("no luminosity for era '{era}'")))?;
        let xsec = self
            .cross_sections
            .get(sample)
            .ok_or_else(|| Error::Validation(format!("no cross section for '{sample}'")))?;
        if gen_event_sumw == 0.0 {
            return Err(Error::Validation(format!(
                "gen_event_sumw is zero for '{sample}'"
            )));
        }
        Ok(lumi * xsec / gen_event_sumw)
    }
}

impl ClassifierConfig {
    fn validate(&self, name: &str) -> Result<()> {
        match self.working_points.as_slice() {
            [wp] => {
                if !wp.is_finite() {
                    return Err(Error::Validation(format!(
                        "classifier '{name}' has a non-finite working point"
                    )));
                }
            }
            [lo, hi] => {
                if !lo.is_finite() || !hi.is_finite() {
                    return Err(Error::Validation(format!(
                        "classifier '{name}' has a non-finite working point"
                    )));
                }
                if lo >= hi {
                    return Err(Error::Validation(format!(
                        "classifier '{name}' working points must be ascending: {lo} >= {hi}"
                    )));
                }
            }
            wps => {
                return Err(Error::Validation(format!(
                    "classifier '{name}' must have one or two working points, got {}",
                    wps.len()
                )));
            }
        }
        let two = self.working_points.len() == 2;
        for (region, t) in &self.targets {
            if !t.pass.is_finite() || t.pass < 0.0 || t.pass > 1.0 {
                return Err(Error::Validation(format!(
                    "classifier '{name}' region '{region}': pass target {} outside [0, 1]",
                    t.pass
                )));
            }
            match (two, t.loose) {
                (true, Some(loose)) => {
                    if !loose.is_finite() || loose < 0.0 || loose > 1.0 {
                        return Err(Error::Validation(format!(
                            "classifier '{name}' region '{region}': loose target {loose} outside [0, 1]"
                        )));
                    }
                    if loose + t.pass > 1.0 {
                        return Err(Error::Validation(format!(
                            "classifier '{name}' region '{region}': loose + pass targets exceed 1"
                        )));
                    }
                }
                (true, None) => {
                    return Err(Error::Validation(format!(
                        "classifier '{name}' region '{region}': two working points require a loose target"
                    )));
                }
                (false, Some(_)) => {
                    return Err(Error::Validation(format!(
                        "classifier '{name}' region '{region}': loose target given but only one working point"
                    )));
                }
                (false, None) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{
        "cuts": {
            "pt": 350.0,
            "mt": [105.0, 210.0],
            "deep_wqq": 0.8
        },
        "triggers": {
            "17": ["HLT_PFHT1050", "HLT_AK8PFJet500"]
        },
        "luminosity": { "17": 41530.0 },
        "cross_sections": { "ttbar": 377.96 },
        "classifiers": {
            "deep_hbb": {
                "working_points": [0.8, 0.98],
                "targets": {
                    "signal": { "loose": 0.30, "pass": 0.55 }
                }
            }
        },
        "corrections": [
            { "name": "pileup", "kind": "weight" },
            { "name": "pdf", "kind": "uncert" }
        ]
    }"#;

    #[test]
    fn parses_and_validates() {
        let cfg = AnalysisConfig::from_json_str(EXAMPLE).unwrap();
        assert_eq!(cfg.cuts["pt"].scalar().unwrap(), 350.0);
        assert_eq!(cfg.cuts["mt"].window().unwrap(), [105.0, 210.0]);
        assert!(cfg.cuts["mt"].scalar().is_err());
        assert_eq!(cfg.triggers["17"].len(), 2);
        assert_eq!(cfg.classifiers["deep_hbb"].working_points, vec![0.8, 0.98]);
        assert_eq!(cfg.corrections[1].kind, CorrectionKind::Uncert);
    }

    #[test]
    fn xsec_scale_divides_by_sumw() {
        let cfg = AnalysisConfig::from_json_str(EXAMPLE).unwrap();
        let scale = cfg.xsec_scale("17", "ttbar", 1.0e6).unwrap();
        assert!((scale - 41530.0 * 377.96 / 1.0e6).abs() < 1e-12);
        assert!(cfg.xsec_scale("17", "ttbar", 0.0).is_err());
        assert!(cfg.xsec_scale("16", "ttbar", 1.0).is_err());
        assert!(cfg.xsec_scale("17", "tW", 1.0).is_err());
    }

    #[test]
    fn rejects_bad_working_points() {
        let bad = r#"{
            "classifiers": {
                "t": { "working_points": [0.9, 0.5], "targets": {} }
            }
        }"#;
        assert!(AnalysisConfig::from_json_str(bad).is_err());

        let bad = r#"{
            "classifiers": {
                "t": { "working_points": [], "targets": {} }
            }
        }"#;
        assert!(AnalysisConfig::from_json_str(bad).is_err());
    }

    #[test]
    fn rejects_inconsistent_targets() {
        // Two working points but no loose target.
        let bad = r#"{
            "classifiers": {
                "t": {
                    "working_points": [0.8, 0.98],
                    "targets": { "signal": { "pass": 0.5 } }
                }
            }
        }"#;
        assert!(AnalysisConfig::from_json_str(bad).is_err());

        // Loose + pass above unity.
        let bad = r#"{
            "classifiers": {
                "t": {
                    "working_points": [0.8, 0.98],
                    "targets": { "signal": { "loose": 0.6, "pass": 0.5 } }
                }
            }
        }"#;
        assert!(AnalysisConfig::from_json_str(bad).is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let bad = r#"{ "cuts": {}, "not_a_field": 1 }"#;
        assert!(AnalysisConfig::from_json_str(bad).is_err());
    }

    #[test]
    fn rejects_duplicate_corrections() {
        let bad = r#"{
            "corrections": [
                { "name": "pileup", "kind": "weight" },
                { "name": "pileup", "kind": "corr" }
            ]
        }"#;
        assert!(AnalysisConfig::from_json_str(bad).is_err());
    }

    #[test]
    fn round_trips_through_serde() {
        let cfg = AnalysisConfig::from_json_str(EXAMPLE).unwrap();
        let s = serde_json::to_string(&cfg).unwrap();
        let back = AnalysisConfig::from_json_str(&s).unwrap();
        assert_eq!(cfg, back);
    }
}
