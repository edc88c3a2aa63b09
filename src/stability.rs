//! The stability verifier: best-first refinement of decorators until a
//! counter-example appears, the frontier drains, or the wall clock runs
//! out.
//!
//! A *decorator* is a partial choice of leaves across a prefix of the
//! forest's trees together with the hyperrectangle induced by the guards
//! on the way to those leaves. Refining a decorator traverses the next
//! tree, splitting the region at every straddled threshold; each reachable
//! leaf yields a child decorator whose overapproximated label set decides
//! its fate: a counter-example when it no longer intersects the reference
//! labels, proven robust when it matches them exactly, or pushed back onto
//! the frontier otherwise.

use std::io;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::Error;
use crate::forest::Forest;
use crate::hyperrect::Hyperrectangle;
use crate::interval::next_up;
use crate::perturbation::AdversarialRegion;
use crate::score::{accumulate_leaf, label_set, overapproximate, AnalysisScratch};
use crate::search::{best_first, PriorityQueue};
use crate::tier::Tiers;
use crate::tree::{DecisionTree, LabelSet, Node};

/// Verdict of one sample's analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stability {
    /// Every point of the region keeps the reference label set.
    Stable,
    /// A concrete point with a different label set was exhibited.
    Unstable,
    /// The wall-clock budget ran out first.
    Unknown,
}

/// Counter-example backing an [`Stability::Unstable`] verdict: a concrete
/// point and the refined sub-region it is the midpoint of.
#[derive(Clone, Debug)]
pub struct Witness {
    pub point: Vec<f64>,
    pub region: Hyperrectangle,
}

/// Outcome of [`verify_forest`] for one sample.
#[derive(Clone, Debug)]
pub struct StabilityReport {
    pub stability: Stability,
    /// The reference sample the region was built around.
    pub sample: Vec<f64>,
    /// Label set the classifier assigns to the reference sample.
    pub labels: LabelSet,
    /// Present exactly when the verdict is [`Stability::Unstable`].
    pub witness: Option<Witness>,
    /// Wall-clock time the analysis took.
    pub elapsed: Duration,
}

impl StabilityReport {
    pub fn is_stable(&self) -> bool {
        self.stability == Stability::Stable
    }

    pub fn is_unstable(&self) -> bool {
        self.stability == Stability::Unstable
    }

    /// Persist the counter-example region as
    /// `<sample_id>: [l0,u0] [l1,u1] …`, one line per sample. Writes
    /// nothing when the verdict exhibited no counter-example.
    pub fn write_counterexample<W: io::Write>(
        &self,
        sample_id: usize,
        out: &mut W,
    ) -> io::Result<()> {
        if let Some(witness) = &self.witness {
            writeln!(out, "{}: {}", sample_id, witness.region)?;
        }
        Ok(())
    }
}

/// Tunables of the best-first search.
///
/// The priority of a decorator is
/// `volume_weight * volume + depth_weight * depth + divergence_weight * d/K`
/// where `d` counts the overapproximated labels outside the reference
/// label set. The defaults favour small regions first, then deep ones,
/// then diverging ones.
#[derive(Clone, Debug)]
pub struct StabilityOptions {
    /// Wall-clock budget per sample; at least one second.
    pub timeout: Duration,
    pub volume_weight: f64,
    pub depth_weight: f64,
    pub divergence_weight: f64,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        StabilityOptions {
            timeout: Duration::from_secs(60),
            volume_weight: -1e6,
            depth_weight: 1.0,
            divergence_weight: 1.0,
        }
    }
}

/// A frontier element: leaves fixed for the first `depth` trees, their
/// contribution collapsed into `totals`, and the region induced by the
/// guards along the way.
struct Decorator {
    depth: usize,
    region: Hyperrectangle,
    totals: Vec<f64>,
    labels: LabelSet,
}

/// Certify the stability of `forest` on the given adversarial region.
///
/// Returns [`Stability::Stable`] when every point of the region keeps the
/// reference sample's label set, [`Stability::Unstable`] with a witness
/// when some point provably differs, and [`Stability::Unknown`] when the
/// timeout struck first. Timeouts are verdicts, not errors.
pub fn verify_forest(
    forest: &Forest,
    region: &AdversarialRegion,
    tiers: &Tiers,
    options: &StabilityOptions,
) -> Result<StabilityReport, Error> {
    if region.sample().len() != forest.n_features() {
        return Err(Error::SampleDimMismatch {
            expected: forest.n_features(),
            found: region.sample().len(),
        });
    }
    if tiers.len() != forest.n_features() {
        return Err(Error::TierLengthMismatch {
            expected: forest.n_features(),
            found: tiers.len(),
        });
    }
    if options.timeout < Duration::from_secs(1) {
        return Err(Error::TimeoutTooSmall);
    }
    let root = region.hyperrectangle();
    if root.is_bottom() {
        return Err(Error::EmptyRegion);
    }

    let start = Instant::now();
    let labels_a = forest.classify(region.sample());
    let mut search = Search {
        forest,
        tiers,
        options,
        labels_a: labels_a.clone(),
        scratch: AnalysisScratch::for_forest(forest),
        walk: PriorityQueue::new(),
        deadline: start + options.timeout,
        witness: None,
        timed_out: false,
        refinements: 0,
    };
    let mut frontier = PriorityQueue::new();
    search.consider(0, root, vec![0.0; forest.n_labels()], &mut frontier);
    best_first(&mut frontier, |decorator, frontier| {
        search.step(decorator, frontier)
    });

    let stability = if search.witness.is_some() {
        Stability::Unstable
    } else if search.timed_out {
        Stability::Unknown
    } else {
        Stability::Stable
    };
    debug!(
        "verdict {:?} after {} refinements in {:?}",
        stability,
        search.refinements,
        start.elapsed()
    );
    Ok(StabilityReport {
        stability,
        sample: region.sample().to_vec(),
        labels: labels_a,
        witness: search.witness,
        elapsed: start.elapsed(),
    })
}

/// The single-tree verifier: the degenerate one-tree case of
/// [`verify_forest`], with the voting scheme inferred from the leaf kind.
pub fn verify_tree(
    tree: &DecisionTree,
    region: &AdversarialRegion,
    tiers: &Tiers,
    options: &StabilityOptions,
) -> Result<StabilityReport, Error> {
    let forest = Forest::single(tree.clone())?;
    verify_forest(&forest, region, tiers, options)
}

struct Search<'a> {
    forest: &'a Forest,
    tiers: &'a Tiers,
    options: &'a StabilityOptions,
    labels_a: LabelSet,
    scratch: AnalysisScratch,
    /// Reused traversal queue of the tree currently being refined.
    walk: PriorityQueue<(usize, usize, Hyperrectangle)>,
    deadline: Instant,
    witness: Option<Witness>,
    timed_out: bool,
    refinements: u64,
}

impl Search<'_> {
    fn priority(&self, decorator: &Decorator) -> f64 {
        let k = self.forest.n_labels() as f64;
        let diverging = decorator.labels.difference(&self.labels_a).count() as f64;
        self.options.volume_weight * decorator.region.volume()
            + self.options.depth_weight * decorator.depth as f64
            + self.options.divergence_weight * diverging / k
    }

    /// Decide the fate of a freshly refined decorator: counter-example,
    /// proven robust (dropped), or frontier.
    fn consider(
        &mut self,
        depth: usize,
        region: Hyperrectangle,
        totals: Vec<f64>,
        frontier: &mut PriorityQueue<Decorator>,
    ) {
        if depth == self.forest.len() {
            // every tree is fixed, so the score vector is constant on the
            // region and the midpoint classifies it exactly
            let point = region.midpoint();
            if self.forest.classify(&point) != self.labels_a {
                self.witness = Some(Witness { point, region });
            }
            return;
        }
        let scores = overapproximate(self.forest, depth, &totals, &region, &mut self.scratch);
        let labels = label_set(&scores);
        if labels.is_disjoint(&self.labels_a) {
            // every label the region can still take differs from the
            // reference; its midpoint is a concrete counter-example
            let point = region.midpoint();
            debug_assert_ne!(self.forest.classify(&point), self.labels_a);
            self.witness = Some(Witness { point, region });
        } else if labels == self.labels_a {
            // proven robust here; nothing below can flip the verdict
        } else {
            let decorator = Decorator {
                depth,
                region,
                totals,
                labels,
            };
            let priority = self.priority(&decorator);
            frontier.push(priority, decorator);
        }
    }

    /// One refinement step: traverse the next tree under the decorator's
    /// region and hand every reachable leaf to [`Search::consider`].
    fn step(
        &mut self,
        decorator: Decorator,
        frontier: &mut PriorityQueue<Decorator>,
    ) -> ControlFlow<()> {
        if Instant::now() >= self.deadline {
            self.timed_out = true;
            return ControlFlow::Break(());
        }
        self.refinements += 1;
        trace!(
            "refining depth {}/{} (frontier {})",
            decorator.depth,
            self.forest.len(),
            frontier.len()
        );
        let forest = self.forest;
        let tiers = self.tiers;
        let tree = &forest.trees()[decorator.depth];
        let Decorator {
            depth,
            region,
            totals,
            ..
        } = decorator;
        let mut walk = std::mem::take(&mut self.walk);
        walk.clear();
        walk.push(0.0, (tree.root(), 0, region));
        'leaves: while let Some((mut node, mut node_depth, region)) = walk.pop() {
            loop {
                match tree.node(node) {
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        let iv = region.interval(*feature);
                        if iv.hi <= *threshold {
                            node = *left;
                            node_depth += 1;
                            continue;
                        }
                        if iv.lo > *threshold {
                            node = *right;
                            node_depth += 1;
                            continue;
                        }
                        // the region straddles the cut: explore both sides,
                        // wider (more uncertain) side first
                        let width = iv.hi - iv.lo;
                        let bias = |side: f64| {
                            if width.is_finite() && width > 0.0 {
                                side / width
                            } else {
                                0.5
                            }
                        };
                        let mut left_region = region.clone();
                        left_region.clamp_upper(*feature, *threshold);
                        tiers.adjust(&mut left_region, *feature);
                        if !left_region.is_bottom() {
                            walk.push(
                                (node_depth + 1) as f64 + bias(*threshold - iv.lo),
                                (*left, node_depth + 1, left_region),
                            );
                        }
                        let mut right_region = region;
                        right_region.clamp_lower(*feature, next_up(*threshold));
                        tiers.adjust(&mut right_region, *feature);
                        if !right_region.is_bottom() {
                            walk.push(
                                (node_depth + 1) as f64 + bias(iv.hi - *threshold),
                                (*right, node_depth + 1, right_region),
                            );
                        }
                        break;
                    }
                    leaf => {
                        let mut child_totals = totals.clone();
                        accumulate_leaf(forest.voting(), &mut child_totals, leaf);
                        self.consider(depth + 1, region, child_totals, frontier);
                        if self.witness.is_some() {
                            break 'leaves;
                        }
                        break;
                    }
                }
            }
        }
        self.walk = walk;
        if self.witness.is_some() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
