// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Classification of filtered loci.
//!
//! The pipeline only sees the `LocusClassifier` trait. `ScoringModels` is the
//! implementation used by the command line: calibration models per variant
//! class, loaded from JSON, plus a set of hard filters used for loci without
//! a diploid model.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use bio::stats::{PHREDProb, Prob};

use crate::errors::Error;
use crate::variants::{FilterFlag, IndelLocus, LocusInfo, SiteLocus};

/// Upper bound for reported quality scores.
pub const MAX_QUAL: f64 = 999.0;

/// Capability that maps a fully prefiltered locus to a score and pass/fail
/// filters. Implementations may only modify the filters and the score of the
/// given locus.
pub trait LocusClassifier {
    /// Full classification of a diploid site locus.
    fn classify_site(&self, locus: &mut SiteLocus);

    /// Full classification of a diploid indel locus.
    fn classify_indel(&self, locus: &mut IndelLocus);

    /// Simplified classification used for continuous-genotype sites.
    fn default_classify_site(&self, locus: &mut SiteLocus);

    /// Simplified classification used for continuous-genotype indels.
    fn default_classify_indel(&self, locus: &mut IndelLocus);
}

/// Node of a binary decision tree over named locus features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecisionNode {
    Split {
        feature: String,
        threshold: f64,
        left: Box<DecisionNode>,
        right: Box<DecisionNode>,
    },
    Leaf {
        value: f64,
    },
}

impl DecisionNode {
    /// Follow the tree down to a leaf. Features missing from the locus are
    /// taken as 0.0, values at or below a split threshold go left.
    pub fn evaluate(&self, features: &BTreeMap<String, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                DecisionNode::Leaf { value } => return *value,
                DecisionNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(feature).cloned().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            DecisionNode::Leaf { value } if !(0.0..=1.0).contains(value) => {
                Err(Error::InvalidScoringModel {
                    msg: format!("leaf value {} is not a probability", value),
                }
                .into())
            }
            DecisionNode::Leaf { .. } => Ok(()),
            DecisionNode::Split { left, right, .. } => {
                left.validate()?;
                right.validate()
            }
        }
    }
}

/// Forest of decision trees with a decision threshold on the mean leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, new, Getters, CopyGetters)]
pub struct CalibrationModel {
    #[getset(get_copy = "pub")]
    threshold: f64,
    #[getset(get = "pub")]
    trees: Vec<DecisionNode>,
}

impl CalibrationModel {
    /// Mean leaf value over all trees, i.e. the probability that the locus
    /// is a true variant.
    pub fn score(&self, features: &BTreeMap<String, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees
            .iter()
            .map(|tree| tree.evaluate(features))
            .sum::<f64>()
            / self.trees.len() as f64
    }

    fn classify(&self, info: &mut LocusInfo) {
        let score = self.score(info.features());
        info.set_score(Some(score_to_qual(score)));
        if score < self.threshold && !relative_eq!(score, self.threshold) {
            info.filters_mut().set(FilterFlag::LowScore);
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidScoringModel {
                msg: format!("{} model threshold must be within [0, 1]", name),
            }
            .into());
        }
        if self.trees.is_empty() {
            return Err(Error::InvalidScoringModel {
                msg: format!("{} model does not contain any trees", name),
            }
            .into());
        }
        for tree in &self.trees {
            tree.validate()?;
        }
        Ok(())
    }
}

/// Hard filters applied by the default classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct DefaultFilters {
    #[serde(default = "default_min_gq")]
    min_gq: u32,
    #[serde(default)]
    max_depth: Option<u32>,
}

fn default_min_gq() -> u32 {
    15
}

impl Default for DefaultFilters {
    fn default() -> Self {
        DefaultFilters {
            min_gq: default_min_gq(),
            max_depth: None,
        }
    }
}

impl DefaultFilters {
    pub fn new(min_gq: u32, max_depth: Option<u32>) -> Self {
        DefaultFilters { min_gq, max_depth }
    }

    fn apply(&self, info: &mut LocusInfo) {
        let mut high_depth = false;
        for sample in info.samples_mut() {
            if sample.gq.map_or(false, |gq| gq < self.min_gq) {
                sample.filters.set(FilterFlag::LowGQ);
            }
            if self.max_depth.map_or(false, |max| sample.depth > max) {
                high_depth = true;
            }
        }
        if high_depth {
            info.filters_mut().set(FilterFlag::HighDepth);
        }
    }
}

/// Scoring models for site and indel loci.
///
/// Without a model for a variant class, diploid loci of that class fall back
/// to the default classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct ScoringModels {
    #[serde(default)]
    site: Option<CalibrationModel>,
    #[serde(default)]
    indel: Option<CalibrationModel>,
    #[serde(default)]
    defaults: DefaultFilters,
}

impl ScoringModels {
    pub fn new(
        site: Option<CalibrationModel>,
        indel: Option<CalibrationModel>,
        defaults: DefaultFilters,
    ) -> Result<Self> {
        let models = ScoringModels {
            site,
            indel,
            defaults,
        };
        models.validate()?;
        Ok(models)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(
            File::open(path)
                .with_context(|| format!("Unable to open scoring models {}.", path.display()))?,
        );
        let models: ScoringModels = serde_json::from_reader(reader)
            .with_context(|| format!("Unable to parse scoring models {}.", path.display()))?;
        models.validate()?;
        info!(
            "Loaded scoring models from {} (site model: {}, indel model: {}).",
            path.display(),
            models.site.is_some(),
            models.indel.is_some()
        );
        Ok(models)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let models: ScoringModels = serde_json::from_str(json)?;
        models.validate()?;
        Ok(models)
    }

    fn validate(&self) -> Result<()> {
        if let Some(model) = &self.site {
            model.validate("site")?;
        }
        if let Some(model) = &self.indel {
            model.validate("indel")?;
        }
        Ok(())
    }
}

impl LocusClassifier for ScoringModels {
    fn classify_site(&self, locus: &mut SiteLocus) {
        match &self.site {
            Some(model) => model.classify(locus.info_mut()),
            None => self.default_classify_site(locus),
        }
    }

    fn classify_indel(&self, locus: &mut IndelLocus) {
        match &self.indel {
            Some(model) => model.classify(locus.info_mut()),
            None => self.default_classify_indel(locus),
        }
    }

    fn default_classify_site(&self, locus: &mut SiteLocus) {
        self.defaults.apply(locus.info_mut());
    }

    fn default_classify_indel(&self, locus: &mut IndelLocus) {
        self.defaults.apply(locus.info_mut());
    }
}

/// PHRED scaled probability of the locus not being a true variant.
pub fn score_to_qual(score: f64) -> f64 {
    let qual = *PHREDProb::from(Prob((1.0 - score).max(0.0)));
    qual.min(MAX_QUAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::{Genotype, Genotyping, SampleCall};

    const MODELS: &str = r#"{
        "site": {
            "threshold": 0.5,
            "trees": [
                {
                    "feature": "GQX",
                    "threshold": 20.0,
                    "left": {"value": 0.1},
                    "right": {"value": 0.9}
                },
                {"value": 0.7}
            ]
        },
        "defaults": {"min_gq": 10, "max_depth": 100}
    }"#;

    const THRESHOLD_OUT_OF_RANGE: &str =
        r#"{"site": {"threshold": 2.0, "trees": [{"value": 0.5}]}}"#;
    const NO_TREES: &str = r#"{"site": {"threshold": 0.5, "trees": []}}"#;
    const LEAF_OUT_OF_RANGE: &str = r#"{"indel": {"threshold": 0.5, "trees": [{"value": 1.5}]}}"#;

    fn site(gqx: f64, gq: u32, depth: u32) -> SiteLocus {
        let sample = SampleCall::new(Genotype::new(vec![0, 1], false), Some(gq), depth);
        SiteLocus::new(
            LocusInfo::new(10, vec![sample], Genotyping::Diploid).with_feature("GQX", gqx),
            "A".to_owned(),
            vec!["T".to_owned()],
        )
    }

    #[test]
    fn test_tree_evaluation() {
        let models = ScoringModels::from_json(MODELS).unwrap();
        let model = models.site().as_ref().unwrap();
        let mut features = BTreeMap::new();
        features.insert("GQX".to_owned(), 30.0);
        assert_relative_eq!(model.score(&features), 0.8);
        // missing features are taken as zero
        assert_relative_eq!(model.score(&BTreeMap::new()), 0.4);
    }

    #[test]
    fn test_classify_site_with_model() {
        let models = ScoringModels::from_json(MODELS).unwrap();

        let mut good = site(30.0, 5, 10);
        models.classify_site(&mut good);
        assert!(good.info().filters().is_pass());
        assert_relative_eq!(
            good.info().score().unwrap(),
            10.0 * 5.0f64.log10(),
            epsilon = 1e-9
        );
        // model path does not apply the default hard filters
        assert!(good.info().samples()[0].filters.is_pass());

        let mut bad = site(10.0, 50, 10);
        models.classify_site(&mut bad);
        assert!(bad.info().filters().is_set(FilterFlag::LowScore));
    }

    #[test]
    fn test_default_classification() {
        let models = ScoringModels::from_json(MODELS).unwrap();
        let mut locus = site(30.0, 5, 150);
        models.default_classify_site(&mut locus);
        assert!(locus.info().samples()[0].filters.is_set(FilterFlag::LowGQ));
        assert!(locus.info().filters().is_set(FilterFlag::HighDepth));
        assert_eq!(locus.info().score(), None);
    }

    #[test]
    fn test_missing_indel_model_falls_back() {
        let models = ScoringModels::from_json(MODELS).unwrap();
        let sample = SampleCall::new(Genotype::new(vec![0, 1], false), Some(3), 10);
        let mut indel = IndelLocus::new(
            LocusInfo::new(10, vec![sample], Genotyping::Diploid),
            vec![],
        );
        models.classify_indel(&mut indel);
        assert!(indel.info().samples()[0].filters.is_set(FilterFlag::LowGQ));
    }

    #[test]
    fn test_invalid_models() {
        assert!(ScoringModels::from_json(THRESHOLD_OUT_OF_RANGE).is_err());
        assert!(ScoringModels::from_json(NO_TREES).is_err());
        assert!(ScoringModels::from_json(LEAF_OUT_OF_RANGE).is_err());
        let empty = ScoringModels::from_json("{}").unwrap();
        assert_eq!(empty.defaults().min_gq(), 15);
    }

    #[test]
    fn test_score_to_qual() {
        assert_relative_eq!(score_to_qual(0.9), 10.0, epsilon = 1e-9);
        assert_relative_eq!(score_to_qual(1.0), MAX_QUAL);
    }
}
