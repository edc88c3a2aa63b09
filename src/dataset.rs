//! In-memory datasets, the per-dataset tallies the analysis driver
//! accumulates, and the sample loop itself.

use std::fmt;

use log::debug;

use crate::error::Error;
use crate::forest::Forest;
use crate::perturbation::{AdversarialRegion, Perturbation};
use crate::stability::{verify_forest, Stability, StabilityOptions, StabilityReport};
use crate::tier::Tiers;

/// A row-major matrix of numeric features with one label per row.
///
/// Parsers are external collaborators; they populate this structure and
/// hand it to the driver.
#[derive(Clone, Debug)]
pub struct Dataset {
    n_features: usize,
    features: Vec<f64>,
    labels: Vec<String>,
}

impl Dataset {
    pub fn new(n_features: usize, features: Vec<f64>, labels: Vec<String>) -> Result<Self, Error> {
        if n_features == 0 {
            return Err(Error::MalformedDataset("zero feature dimensions"));
        }
        if features.len() != n_features * labels.len() {
            return Err(Error::MalformedDataset(
                "feature matrix does not match the row count",
            ));
        }
        Ok(Dataset {
            n_features,
            features,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.features[index * self.n_features..(index + 1) * self.n_features]
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub fn rows(&self) -> impl Iterator<Item = (&[f64], &str)> {
        (0..self.len()).map(|i| (self.row(i), self.label(i)))
    }
}

/// Per-dataset verdict tallies.
///
/// A sample is *correct* when the classifier assigns it exactly its
/// ground-truth label, *robust* when correct and stable, and *fragile*
/// when correct but unstable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnalysisCounters {
    pub total: usize,
    pub correct: usize,
    pub stable: usize,
    pub unstable: usize,
    pub unknown: usize,
    pub robust: usize,
    pub fragile: usize,
}

impl AnalysisCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample's verdict into the tallies.
    pub fn record(&mut self, forest: &Forest, report: &StabilityReport, label: &str) {
        self.total += 1;
        let correct = report.labels.len() == 1
            && report
                .labels
                .iter()
                .next()
                .map(|&i| forest.labels()[i].as_str())
                == Some(label);
        if correct {
            self.correct += 1;
        }
        match report.stability {
            Stability::Stable => {
                self.stable += 1;
                if correct {
                    self.robust += 1;
                }
            }
            Stability::Unstable => {
                self.unstable += 1;
                if correct {
                    self.fragile += 1;
                }
            }
            Stability::Unknown => self.unknown += 1,
        }
    }
}

/// Verify every sample of `dataset` under the same perturbation shape and
/// accumulate the tallies.
///
/// Each row becomes the reference sample of its own adversarial region;
/// samples are analysed sequentially and independently. Returns the
/// per-sample reports alongside the counters.
pub fn analyze_dataset(
    forest: &Forest,
    dataset: &Dataset,
    perturbation: &Perturbation,
    tiers: &Tiers,
    options: &StabilityOptions,
) -> Result<(Vec<StabilityReport>, AnalysisCounters), Error> {
    let mut reports = Vec::with_capacity(dataset.len());
    let mut counters = AnalysisCounters::new();
    for (index, (sample, label)) in dataset.rows().enumerate() {
        let region = AdversarialRegion::new(sample.to_vec(), perturbation.clone())?;
        let report = verify_forest(forest, &region, tiers, options)?;
        debug!(
            "sample {index}: {:?} in {:?}",
            report.stability, report.elapsed
        );
        counters.record(forest, &report, label);
        reports.push(report);
    }
    Ok((reports, counters))
}

impl fmt::Display for AnalysisCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples: {} correct, {} stable, {} unstable, {} unknown ({} robust, {} fragile)",
            self.total,
            self.correct,
            self.stable,
            self.unstable,
            self.unknown,
            self.robust,
            self.fragile
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use super::*;
    use crate::forest::VotingScheme;
    use crate::tree::{DecisionTree, Node};

    fn tiny_forest() -> Forest {
        let tree = DecisionTree::new(
            vec![Node::Leaf {
                scores: vec![3, 1],
                n_samples: 4,
            }],
            1,
            vec!["A".to_string(), "B".to_string()],
        )
        .unwrap();
        Forest::new(vec![tree], VotingScheme::Max).unwrap()
    }

    fn report(stability: Stability, labels: &[usize]) -> StabilityReport {
        StabilityReport {
            stability,
            sample: vec![0.0],
            labels: labels.iter().copied().collect::<BTreeSet<_>>(),
            witness: None,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn dataset_shape_is_validated() {
        assert!(Dataset::new(2, vec![1.0; 6], vec!["A".into(), "B".into(), "A".into()]).is_ok());
        assert!(matches!(
            Dataset::new(2, vec![1.0; 5], vec!["A".into(), "B".into()]),
            Err(Error::MalformedDataset(_))
        ));
        assert!(matches!(
            Dataset::new(0, vec![], vec![]),
            Err(Error::MalformedDataset(_))
        ));
    }

    #[test]
    fn rows_are_row_major() {
        let data = Dataset::new(
            2,
            vec![1.0, 2.0, 3.0, 4.0],
            vec!["A".into(), "B".into()],
        )
        .unwrap();
        assert_eq!(data.row(0), &[1.0, 2.0]);
        assert_eq!(data.row(1), &[3.0, 4.0]);
        assert_eq!(data.label(1), "B");
        assert_eq!(data.rows().count(), 2);
    }

    #[test]
    fn counters_distinguish_robust_from_fragile() {
        let forest = tiny_forest();
        let mut counters = AnalysisCounters::new();
        // correct and stable: robust
        counters.record(&forest, &report(Stability::Stable, &[0]), "A");
        // correct but unstable: fragile
        counters.record(&forest, &report(Stability::Unstable, &[0]), "A");
        // misclassified and stable
        counters.record(&forest, &report(Stability::Stable, &[0]), "B");
        // tied prediction is never "correct"
        counters.record(&forest, &report(Stability::Unknown, &[0, 1]), "A");
        assert_eq!(
            counters,
            AnalysisCounters {
                total: 4,
                correct: 2,
                stable: 2,
                unstable: 1,
                unknown: 1,
                robust: 1,
                fragile: 1,
            }
        );
    }

    #[test]
    fn dataset_analysis_tallies_every_row() {
        // a stump classifier and four reference samples straddling it
        let tree = DecisionTree::new(
            vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Leaf {
                    scores: vec![10, 0],
                    n_samples: 10,
                },
                Node::Leaf {
                    scores: vec![0, 10],
                    n_samples: 10,
                },
            ],
            1,
            vec!["A".to_string(), "B".to_string()],
        )
        .unwrap();
        let forest = Forest::new(vec![tree], VotingScheme::Max).unwrap();
        let dataset = Dataset::new(
            1,
            vec![0.0, 0.45, 1.0, 0.55],
            vec!["A".into(), "A".into(), "B".into(), "A".into()],
        )
        .unwrap();
        let (reports, counters) = analyze_dataset(
            &forest,
            &dataset,
            &Perturbation::l_inf(0.1).unwrap(),
            &Tiers::untiered(1),
            &crate::StabilityOptions::default(),
        )
        .unwrap();
        assert_eq!(reports.len(), 4);
        // 0.0 and 1.0 sit deep inside a leaf, 0.45 and 0.55 straddle it
        assert_eq!(reports[0].stability, Stability::Stable);
        assert_eq!(reports[1].stability, Stability::Unstable);
        assert_eq!(reports[2].stability, Stability::Stable);
        assert_eq!(reports[3].stability, Stability::Unstable);
        assert_eq!(
            counters,
            AnalysisCounters {
                total: 4,
                correct: 3,
                stable: 2,
                unstable: 2,
                unknown: 0,
                robust: 2,
                fragile: 1,
            }
        );
    }

    #[test]
    fn display_summarises_the_tallies() {
        let mut counters = AnalysisCounters::new();
        counters.record(&tiny_forest(), &report(Stability::Stable, &[0]), "A");
        assert_eq!(
            counters.to_string(),
            "1 samples: 1 correct, 1 stable, 0 unstable, 0 unknown (1 robust, 0 fragile)"
        );
    }
}
