//! Sound interval overapproximation of forest scores over a region.
//!
//! A decorator at depth `d` has fixed the leaf of the first `d` trees;
//! their contribution is a concrete running total. The remaining trees are
//! abstract: each contributes a per-label interval derived from its leaves
//! reachable under the decorator's region. The result is an interval score
//! vector covering the voted scores of every point of the region.

use crate::forest::{Forest, VotingScheme};
use crate::hyperrect::Hyperrectangle;
use crate::interval::{round_down, round_up, Interval};
use crate::tree::{LabelSet, Node};

/// Working buffers of one sample's analysis, sized once to the forest's
/// maximum tree depth and label count and reused across refinement steps.
pub(crate) struct AnalysisScratch {
    /// Explicit stack of the reachable-leaf walks.
    pub stack: Vec<usize>,
    lo: Vec<f64>,
    hi: Vec<f64>,
    all: Vec<bool>,
    any: Vec<bool>,
}

impl AnalysisScratch {
    pub fn for_forest(forest: &Forest) -> Self {
        let depth = forest.trees().iter().map(|t| t.depth()).max().unwrap_or(0);
        let k = forest.n_labels();
        AnalysisScratch {
            stack: Vec::with_capacity(depth + 1),
            lo: vec![0.0; k],
            hi: vec![0.0; k],
            all: vec![false; k],
            any: vec![false; k],
        }
    }
}

/// Fold a fixed leaf's concrete contribution into a decorator's running
/// totals: votes under `Max`, probability sums under `Average`, log-score
/// sums under `Softargmax`.
pub(crate) fn accumulate_leaf(voting: VotingScheme, totals: &mut [f64], leaf: &Node) {
    match (voting, leaf) {
        (VotingScheme::Max, Node::Leaf { scores, .. }) => {
            let best = scores.iter().copied().max().expect("leaf scores are never empty");
            for (i, &s) in scores.iter().enumerate() {
                if s == best {
                    totals[i] += 1.0;
                }
            }
        }
        (VotingScheme::Average, Node::Leaf { scores, n_samples }) => {
            for (i, &s) in scores.iter().enumerate() {
                totals[i] += s as f64 / *n_samples as f64;
            }
        }
        (VotingScheme::Softargmax, Node::LogLeaf { scores, .. }) => {
            for (i, &s) in scores.iter().enumerate() {
                totals[i] += s;
            }
        }
        _ => unreachable!("leaf kind is validated against the voting scheme"),
    }
}

/// Interval score vector covering every point of `region`, with trees
/// `0..depth` fixed (collapsed into `concrete`) and trees `depth..`
/// abstract.
pub(crate) fn overapproximate(
    forest: &Forest,
    depth: usize,
    concrete: &[f64],
    region: &Hyperrectangle,
    scratch: &mut AnalysisScratch,
) -> Vec<Interval> {
    let k = forest.n_labels();
    let abstract_trees = &forest.trees()[depth..];
    let mut scores: Vec<Interval> = concrete.iter().map(|&c| Interval::point(c)).collect();
    match forest.voting() {
        VotingScheme::Max => {
            for tree in abstract_trees {
                let AnalysisScratch {
                    stack, all, any, ..
                } = scratch;
                all.iter_mut().for_each(|b| *b = true);
                any.iter_mut().for_each(|b| *b = false);
                let mut reachable = 0usize;
                tree.for_each_reachable_leaf(region, stack, |_, leaf| {
                    reachable += 1;
                    let Node::Leaf { scores, .. } = leaf else {
                        unreachable!("max voting walks counting leaves")
                    };
                    let best = scores.iter().copied().max().expect("leaf scores are never empty");
                    for (i, &s) in scores.iter().enumerate() {
                        if s == best {
                            any[i] = true;
                        } else {
                            all[i] = false;
                        }
                    }
                });
                assert!(reachable > 0, "no reachable leaves over a non-bottom region");
                for i in 0..k {
                    // a guaranteed vote iff the label wins every reachable
                    // leaf, a possible vote iff it wins any
                    let vote = Interval::new(
                        if all[i] { 1.0 } else { 0.0 },
                        if any[i] { 1.0 } else { 0.0 },
                    );
                    scores[i] = scores[i].add(&vote);
                }
            }
            scores
        }
        VotingScheme::Average => {
            for tree in abstract_trees {
                let AnalysisScratch { stack, lo, hi, .. } = scratch;
                lo.iter_mut().for_each(|v| *v = f64::INFINITY);
                hi.iter_mut().for_each(|v| *v = f64::NEG_INFINITY);
                let mut reachable = 0usize;
                tree.for_each_reachable_leaf(region, stack, |_, leaf| {
                    reachable += 1;
                    let Node::Leaf { scores, n_samples } = leaf else {
                        unreachable!("average voting walks counting leaves")
                    };
                    for (i, &s) in scores.iter().enumerate() {
                        let p = s as f64 / *n_samples as f64;
                        lo[i] = lo[i].min(p);
                        hi[i] = hi[i].max(p);
                    }
                });
                assert!(reachable > 0, "no reachable leaves over a non-bottom region");
                for i in 0..k {
                    scores[i] = scores[i].add(&Interval::new(lo[i], hi[i]));
                }
            }
            let t = forest.len() as f64;
            scores.iter().map(|s| s.scale(1.0 / t)).collect()
        }
        VotingScheme::Softargmax => {
            for tree in abstract_trees {
                let AnalysisScratch { stack, lo, hi, .. } = scratch;
                lo.iter_mut().for_each(|v| *v = f64::INFINITY);
                hi.iter_mut().for_each(|v| *v = f64::NEG_INFINITY);
                let mut reachable = 0usize;
                tree.for_each_reachable_leaf(region, stack, |_, leaf| {
                    reachable += 1;
                    let Node::LogLeaf { scores, .. } = leaf else {
                        unreachable!("softargmax voting walks log leaves")
                    };
                    for (i, &s) in scores.iter().enumerate() {
                        lo[i] = lo[i].min(s);
                        hi[i] = hi[i].max(s);
                    }
                });
                assert!(reachable > 0, "no reachable leaves over a non-bottom region");
                for i in 0..k {
                    scores[i] = scores[i].add(&Interval::new(lo[i], hi[i]));
                }
            }
            // interval softmax: each lower bound divides by the largest
            // possible normaliser, each upper bound by the smallest
            let exps: Vec<Interval> = scores.iter().map(|s| s.exp()).collect();
            let mut z_lo = 0.0;
            let mut z_hi = 0.0;
            for e in &exps {
                z_lo = round_down(z_lo + e.lo);
                z_hi = round_up(z_hi + e.hi);
            }
            exps.iter()
                .map(|e| Interval::new(round_down(e.lo / z_hi), round_up(e.hi / z_lo)))
                .collect()
        }
    }
}

/// Labels not strictly dominated by any other label: the decorator's
/// overapproximated label set.
pub(crate) fn label_set(scores: &[Interval]) -> LabelSet {
    (0..scores.len())
        .filter(|&i| {
            scores
                .iter()
                .enumerate()
                .all(|(j, other)| j == i || !scores[i].is_strictly_less_than(other))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::tree::DecisionTree;

    fn labels(k: usize) -> Vec<String> {
        (0..k).map(|i| format!("L{i}")).collect()
    }

    fn counting_stump(feature: usize, left: Vec<u32>, right: Vec<u32>) -> DecisionTree {
        let (ls, rs) = (left.iter().sum(), right.iter().sum());
        let k = left.len();
        DecisionTree::new(
            vec![
                Node::Split {
                    feature,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Leaf {
                    scores: left,
                    n_samples: ls,
                },
                Node::Leaf {
                    scores: right,
                    n_samples: rs,
                },
            ],
            2,
            labels(k),
        )
        .unwrap()
    }

    fn log_stump(feature: usize, left: Vec<f64>, right: Vec<f64>) -> DecisionTree {
        let k = left.len();
        DecisionTree::new(
            vec![
                Node::Split {
                    feature,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::LogLeaf {
                    scores: left,
                    weight: 1.0,
                },
                Node::LogLeaf {
                    scores: right,
                    weight: 1.0,
                },
            ],
            2,
            labels(k),
        )
        .unwrap()
    }

    fn unit_region() -> Hyperrectangle {
        Hyperrectangle::new(vec![Interval::new(0.0, 1.0), Interval::new(0.0, 1.0)])
    }

    // outward rounding leaves the computed bounds a few ulps away from the
    // exact values
    fn assert_close(got: Interval, lo: f64, hi: f64) {
        assert!(
            (got.lo - lo).abs() < 1e-9 && (got.hi - hi).abs() < 1e-9,
            "expected ~[{lo},{hi}], got {got}"
        );
    }

    #[test]
    fn max_overapproximation_brackets_possible_votes() {
        let forest = Forest::new(
            vec![
                counting_stump(0, vec![10, 0], vec![0, 10]),
                counting_stump(1, vec![10, 0], vec![10, 0]),
            ],
            VotingScheme::Max,
        )
        .unwrap();
        let mut scratch = AnalysisScratch::for_forest(&forest);
        let scores = overapproximate(&forest, 0, &[0.0, 0.0], &unit_region(), &mut scratch);
        // tree 0 can vote either way, tree 1 always votes label 0
        assert_close(scores[0], 1.0, 2.0);
        assert_close(scores[1], 0.0, 1.0);
        assert_eq!(label_set(&scores), LabelSet::from([0, 1]));
    }

    #[test]
    fn narrow_region_collapses_the_overapproximation() {
        let forest = Forest::new(
            vec![
                counting_stump(0, vec![10, 0], vec![0, 10]),
                counting_stump(1, vec![10, 0], vec![10, 0]),
            ],
            VotingScheme::Max,
        )
        .unwrap();
        let mut scratch = AnalysisScratch::for_forest(&forest);
        let region =
            Hyperrectangle::new(vec![Interval::new(0.0, 0.4), Interval::new(0.0, 1.0)]);
        let scores = overapproximate(&forest, 0, &[0.0, 0.0], &region, &mut scratch);
        assert_close(scores[0], 2.0, 2.0);
        assert_close(scores[1], 0.0, 0.0);
        assert_eq!(label_set(&scores), LabelSet::from([0]));
    }

    #[test]
    fn fixed_leaves_contribute_concrete_points() {
        let forest = Forest::new(
            vec![
                counting_stump(0, vec![10, 0], vec![0, 10]),
                counting_stump(1, vec![10, 0], vec![0, 10]),
            ],
            VotingScheme::Max,
        )
        .unwrap();
        let mut scratch = AnalysisScratch::for_forest(&forest);
        // tree 0 fixed on its left leaf
        let mut totals = vec![0.0, 0.0];
        accumulate_leaf(VotingScheme::Max, &mut totals, forest.trees()[0].node(1));
        assert_eq!(totals, vec![1.0, 0.0]);
        let region =
            Hyperrectangle::new(vec![Interval::new(0.0, 0.4), Interval::new(0.0, 1.0)]);
        let scores = overapproximate(&forest, 1, &totals, &region, &mut scratch);
        assert_close(scores[0], 1.0, 2.0);
        assert_close(scores[1], 0.0, 1.0);
    }

    #[test]
    fn dominated_labels_are_filtered() {
        let scores = vec![
            Interval::new(0.4, 0.9),
            Interval::new(0.2, 0.5),
            Interval::new(0.0, 0.3),
        ];
        // label 2 is strictly below label 0's lower bound
        assert_eq!(label_set(&scores), LabelSet::from([0, 1]));
    }

    fn random_region<R: Rng>(rng: &mut R) -> Hyperrectangle {
        Hyperrectangle::new(
            (0..2)
                .map(|_| {
                    let a: f64 = rng.gen_range(0.0..1.0);
                    let b: f64 = rng.gen_range(0.0..1.0);
                    Interval::new(a.min(b), a.max(b))
                })
                .collect(),
        )
    }

    #[test]
    fn overapproximation_contains_concrete_scores_under_every_scheme() {
        let rng = &mut rand::thread_rng();
        let counting = |rng: &mut rand::rngs::ThreadRng| {
            let leaf = |rng: &mut rand::rngs::ThreadRng| {
                let a = rng.gen_range(1..20);
                let b = rng.gen_range(1..20);
                vec![a, b]
            };
            counting_stump(rng.gen_range(0..2), leaf(rng), leaf(rng))
        };
        let logged = |rng: &mut rand::rngs::ThreadRng| {
            let leaf = |rng: &mut rand::rngs::ThreadRng| {
                vec![-rng.gen_range(0.01..3.0), -rng.gen_range(0.01..3.0)]
            };
            log_stump(rng.gen_range(0..2), leaf(rng), leaf(rng))
        };
        for _ in 0..40 {
            let forests = [
                Forest::new(vec![counting(rng), counting(rng), counting(rng)], VotingScheme::Max)
                    .unwrap(),
                Forest::new(
                    vec![counting(rng), counting(rng), counting(rng)],
                    VotingScheme::Average,
                )
                .unwrap(),
                Forest::new(vec![logged(rng), logged(rng), logged(rng)], VotingScheme::Softargmax)
                    .unwrap(),
            ];
            let region = random_region(rng);
            for forest in &forests {
                let mut scratch = AnalysisScratch::for_forest(forest);
                let zeros = vec![0.0; forest.n_labels()];
                let scores = overapproximate(forest, 0, &zeros, &region, &mut scratch);
                for _ in 0..50 {
                    let x = region.sample(rng);
                    let concrete = forest.decision_function(&x);
                    for (i, &c) in concrete.iter().enumerate() {
                        assert!(
                            scores[i].contains(c),
                            "{:?} voting lost score {c} of label {i} in {}",
                            forest.voting(),
                            scores[i]
                        );
                    }
                    // the concrete argmax set never leaves the abstraction
                    let concrete_labels = forest.classify(&x);
                    assert!(concrete_labels.is_subset(&label_set(&scores)));
                }
            }
        }
    }
}
