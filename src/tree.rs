//! Decision trees: sum-typed nodes in a per-tree arena, concrete
//! classification, and the reachable-leaf engine.

use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hyperrect::Hyperrectangle;
use crate::search::depth_first;

/// A set of label positions into a classifier's label table.
pub type LabelSet = BTreeSet<usize>;

/// One node of a decision tree.
///
/// Children of a [`Node::Split`] are indices into the owning tree's node
/// arena; the arena index doubles as the node's identifier. Counting leaves
/// carry per-label sample counts, log leaves carry per-label
/// log-probabilities.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Node {
    Leaf {
        scores: Vec<u32>,
        n_samples: u32,
    },
    LogLeaf {
        scores: Vec<f64>,
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Node::Split { .. })
    }

    /// Labels tying for the best score at a leaf.
    ///
    /// Panics on a split node.
    pub(crate) fn argmax_labels(&self) -> LabelSet {
        match self {
            Node::Leaf { scores, .. } => {
                let best = scores.iter().copied().max().expect("leaf scores are never empty");
                scores
                    .iter()
                    .enumerate()
                    .filter(|&(_, &s)| s == best)
                    .map(|(i, _)| i)
                    .collect()
            }
            Node::LogLeaf { scores, .. } => argmax_f64(scores),
            Node::Split { .. } => panic!("argmax of a split node"),
        }
    }
}

/// Indices of the maximal entries of `scores`.
pub(crate) fn argmax_f64(scores: &[f64]) -> LabelSet {
    let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    scores
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s == best)
        .map(|(i, _)| i)
        .collect()
}

/// A rooted binary decision tree over a fixed feature space and label
/// table. The root is node `0`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
    labels: Vec<String>,
    depth: usize,
}

impl DecisionTree {
    /// Assemble a tree from its node arena, validating every structural
    /// invariant: child indices in bounds, exactly one parent per node,
    /// split features inside the feature space, score vectors as long as
    /// the label table, and leaf sample counts equal to their score sums.
    pub fn new(nodes: Vec<Node>, n_features: usize, labels: Vec<String>) -> Result<Self, Error> {
        if nodes.is_empty() {
            return Err(Error::MalformedTree("empty node arena"));
        }
        if n_features == 0 {
            return Err(Error::MalformedTree("zero feature dimensions"));
        }
        if labels.is_empty() {
            return Err(Error::MalformedTree("empty label table"));
        }
        let k = labels.len();
        let mut visited = vec![false; nodes.len()];
        let mut stack = vec![(0usize, 0usize)];
        let mut depth = 0;
        while let Some((id, d)) = stack.pop() {
            let node = nodes
                .get(id)
                .ok_or(Error::MalformedTree("child index out of bounds"))?;
            if std::mem::replace(&mut visited[id], true) {
                return Err(Error::MalformedTree("node reachable through two parents"));
            }
            depth = depth.max(d);
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(Error::MalformedTree("split feature out of range"));
                    }
                    if !threshold.is_finite() {
                        return Err(Error::MalformedTree("split threshold not finite"));
                    }
                    stack.push((*left, d + 1));
                    stack.push((*right, d + 1));
                }
                Node::Leaf { scores, n_samples } => {
                    if scores.len() != k {
                        return Err(Error::MalformedTree(
                            "leaf score vector length differs from label table",
                        ));
                    }
                    if *n_samples == 0 {
                        return Err(Error::MalformedTree("leaf with no samples"));
                    }
                    if scores.iter().sum::<u32>() != *n_samples {
                        return Err(Error::MalformedTree(
                            "leaf sample count differs from score sum",
                        ));
                    }
                }
                Node::LogLeaf { scores, weight } => {
                    if scores.len() != k {
                        return Err(Error::MalformedTree(
                            "log leaf score vector length differs from label table",
                        ));
                    }
                    if !weight.is_finite() || scores.iter().any(|s| !s.is_finite()) {
                        return Err(Error::MalformedTree("log leaf with non-finite scores"));
                    }
                }
            }
        }
        if visited.iter().any(|&v| !v) {
            return Err(Error::MalformedTree("unreachable node in arena"));
        }
        Ok(DecisionTree {
            nodes,
            n_features,
            labels,
            depth,
        })
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_labels(&self) -> usize {
        self.labels.len()
    }

    /// Length of the longest root-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn leaf_id_for(&self, x: &[f64]) -> usize {
        assert_eq!(x.len(), self.n_features, "sample dimension mismatch");
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if x[*feature] <= *threshold { *left } else { *right };
                }
                _ => return id,
            }
        }
    }

    /// Labels tying for the best score at the leaf `x` falls into.
    pub fn classify(&self, x: &[f64]) -> LabelSet {
        self.nodes[self.leaf_id_for(x)].argmax_labels()
    }

    /// Per-label scores at the leaf `x` falls into: normalised
    /// probabilities for a counting leaf, stored log-probabilities for a
    /// log leaf.
    pub fn decision_function(&self, x: &[f64]) -> Vec<f64> {
        match &self.nodes[self.leaf_id_for(x)] {
            Node::Leaf { scores, n_samples } => scores
                .iter()
                .map(|&s| s as f64 / *n_samples as f64)
                .collect(),
            Node::LogLeaf { scores, .. } => scores.clone(),
            Node::Split { .. } => unreachable!("walk ends at a leaf"),
        }
    }

    /// Visit every leaf whose guard path is jointly satisfiable with
    /// `region`, reusing `stack` as the traversal's working storage.
    pub(crate) fn for_each_reachable_leaf<F>(
        &self,
        region: &Hyperrectangle,
        stack: &mut Vec<usize>,
        mut f: F,
    ) where
        F: FnMut(usize, &Node),
    {
        debug_assert!(!region.is_bottom(), "reachable-leaf walk on a bottom region");
        stack.clear();
        stack.push(self.root());
        depth_first(stack, |id, stack| match &self.nodes[id] {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let iv = region.interval(*feature);
                // the guard sends x <= threshold left, everything else right
                if iv.lo <= *threshold {
                    stack.push(*left);
                }
                if iv.hi > *threshold {
                    stack.push(*right);
                }
            }
            node => f(id, node),
        });
    }

    /// Identifiers of all leaves reachable under `region`.
    pub fn reachable_leaves(&self, region: &Hyperrectangle) -> Vec<usize> {
        let mut stack = Vec::with_capacity(self.depth + 1);
        let mut out = Vec::new();
        self.for_each_reachable_leaf(region, &mut stack, |id, _| out.push(id));
        out
    }
}
