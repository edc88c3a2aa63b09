//! # Forest Stability
//!
//! Certifies the **local robustness** of tree-ensemble classifiers (single
//! decision trees and random forests) under adversarial perturbations of
//! numeric samples. Given a classifier, a reference sample, and a
//! perturbation region, the verifier returns one of three verdicts:
//! [`Stable`](Stability::Stable) (the classifier assigns the same label
//! set to every point of the region), [`Unstable`](Stability::Unstable)
//! (a concrete counter-example point is exhibited), or
//! [`Unknown`](Stability::Unknown) (the wall-clock budget ran out).
//!
//! The analysis is an abstract interpretation over hyperrectangles: a
//! best-first search refines the region and the ensemble simultaneously,
//! bounding the reachable leaves of every not-yet-fixed tree with sound
//! interval arithmetic and pruning sub-regions that cannot change the
//! verdict.
//!
//! Includes optional serde support for the model types with the `serde`
//! feature.
//!
//! ## Example
//!
//! ```rust
//! use forest_stability::{
//!     verify_forest, AdversarialRegion, DecisionTree, Forest, Node, Perturbation, Stability,
//!     StabilityOptions, Tiers, VotingScheme,
//! };
//!
//! // a decision stump: feature 0 at threshold 0.5, pure leaves
//! let tree = DecisionTree::new(
//!     vec![
//!         Node::Split { feature: 0, threshold: 0.5, left: 1, right: 2 },
//!         Node::Leaf { scores: vec![10, 0], n_samples: 10 },
//!         Node::Leaf { scores: vec![0, 10], n_samples: 10 },
//!     ],
//!     1,
//!     vec!["A".to_string(), "B".to_string()],
//! )
//! .unwrap();
//! let forest = Forest::new(vec![tree], VotingScheme::Max).unwrap();
//!
//! // an L-infinity ball of radius 0.3 around the reference sample 0.0
//! let region = AdversarialRegion::new(vec![0.0], Perturbation::l_inf(0.3).unwrap()).unwrap();
//!
//! // the ball lies entirely inside the left leaf: the prediction is stable
//! let report = verify_forest(
//!     &forest,
//!     &region,
//!     &Tiers::untiered(1),
//!     &StabilityOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(report.stability, Stability::Stable);
//!
//! // radius 0.6 reaches across the threshold: a counter-example exists
//! let region = AdversarialRegion::new(vec![0.0], Perturbation::l_inf(0.6).unwrap()).unwrap();
//! let report = verify_forest(
//!     &forest,
//!     &region,
//!     &Tiers::untiered(1),
//!     &StabilityOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(report.stability, Stability::Unstable);
//! let witness = report.witness.unwrap();
//! assert_ne!(forest.classify(&witness.point), report.labels);
//! ```

pub use crate::dataset::{analyze_dataset, AnalysisCounters, Dataset};
pub use crate::error::Error;
pub use crate::forest::{Forest, VotingScheme};
pub use crate::hyperrect::Hyperrectangle;
pub use crate::interval::Interval;
pub use crate::perturbation::{AdversarialRegion, Perturbation};
pub use crate::stability::{
    verify_forest, verify_tree, Stability, StabilityOptions, StabilityReport, Witness,
};
pub use crate::tier::Tiers;
pub use crate::tree::{DecisionTree, LabelSet, Node};

pub mod dataset;
pub mod error;
pub mod forest;
pub mod hyperrect;
pub mod interval;
pub mod perturbation;
mod score;
pub mod search;
pub mod stability;
pub mod tier;
pub mod tree;

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use crate::{DecisionTree, Forest, Node, VotingScheme};

    #[test]
    fn forests_round_trip_through_json() {
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
        let json = serde_json::to_string(&forest).unwrap();
        let back: Forest = serde_json::from_str(&json).unwrap();
        for x in [-1.0, 0.25, 0.5, 0.75, 2.0] {
            assert_eq!(back.classify(&[x]), forest.classify(&[x]));
        }
    }
}
