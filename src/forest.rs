//! Forests: ordered tree ensembles sharing a label table, aggregated by a
//! voting scheme.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tree::{argmax_f64, DecisionTree, LabelSet, Node};

/// How per-tree predictions are aggregated into a forest prediction.
///
/// `Max` and `Average` require counting leaves, `Softargmax` requires log
/// leaves; the pairing is validated when the forest is assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VotingScheme {
    /// One vote per tree for each label tying for the tree's argmax.
    Max,
    /// Mean of the trees' normalised leaf probabilities.
    Average,
    /// Softmax over the summed per-tree log-probabilities.
    Softargmax,
}

/// An ordered collection of decision trees over one feature space and one
/// label table.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Forest {
    trees: Vec<DecisionTree>,
    voting: VotingScheme,
}

impl Forest {
    /// Assemble a forest, validating that every tree agrees on the feature
    /// space and label table and stores leaves the voting scheme can read.
    pub fn new(trees: Vec<DecisionTree>, voting: VotingScheme) -> Result<Self, Error> {
        let first = trees.first().ok_or(Error::EmptyForest)?;
        let n_features = first.n_features();
        let labels = first.labels().to_vec();
        for (index, tree) in trees.iter().enumerate() {
            if tree.n_features() != n_features {
                return Err(Error::FeatureCountMismatch {
                    tree: index,
                    expected: n_features,
                    found: tree.n_features(),
                });
            }
            if tree.labels() != labels.as_slice() {
                return Err(Error::LabelTableMismatch { tree: index });
            }
            let compatible = tree.nodes().iter().all(|node| match (voting, node) {
                (_, Node::Split { .. }) => true,
                (VotingScheme::Max | VotingScheme::Average, Node::Leaf { .. }) => true,
                (VotingScheme::Softargmax, Node::LogLeaf { .. }) => true,
                _ => false,
            });
            if !compatible {
                return Err(Error::LeafVotingMismatch {
                    tree: index,
                    scheme: voting,
                });
            }
        }
        Ok(Forest { trees, voting })
    }

    /// Wrap a single tree, inferring the voting scheme from its leaf kind.
    pub fn single(tree: DecisionTree) -> Result<Self, Error> {
        let voting = if tree
            .nodes()
            .iter()
            .any(|node| matches!(node, Node::LogLeaf { .. }))
        {
            VotingScheme::Softargmax
        } else {
            VotingScheme::Max
        };
        Forest::new(vec![tree], voting)
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn voting(&self) -> VotingScheme {
        self.voting
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.trees[0].n_features()
    }

    pub fn labels(&self) -> &[String] {
        self.trees[0].labels()
    }

    pub fn n_labels(&self) -> usize {
        self.trees[0].n_labels()
    }

    /// The voted score vector at `x`.
    pub fn decision_function(&self, x: &[f64]) -> Vec<f64> {
        let k = self.n_labels();
        match self.voting {
            VotingScheme::Max => {
                let mut votes = vec![0.0; k];
                for tree in &self.trees {
                    // ties hand a vote to every tying label
                    for label in tree.classify(x) {
                        votes[label] += 1.0;
                    }
                }
                votes
            }
            VotingScheme::Average => {
                let mut sums = vec![0.0; k];
                for tree in &self.trees {
                    for (i, p) in tree.decision_function(x).into_iter().enumerate() {
                        sums[i] += p;
                    }
                }
                let t = self.trees.len() as f64;
                sums.iter_mut().for_each(|s| *s /= t);
                sums
            }
            VotingScheme::Softargmax => {
                let mut sums = vec![0.0; k];
                for tree in &self.trees {
                    for (i, s) in tree.decision_function(x).into_iter().enumerate() {
                        sums[i] += s;
                    }
                }
                let exps: Vec<f64> = sums.iter().map(|&s| s.exp()).collect();
                let z: f64 = exps.iter().sum();
                exps.into_iter().map(|e| e / z).collect()
            }
        }
    }

    /// Labels tying for the maximum of the voted score vector.
    pub fn classify(&self, x: &[f64]) -> LabelSet {
        argmax_f64(&self.decision_function(x))
    }
}
