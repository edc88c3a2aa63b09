use thiserror::Error;

use crate::forest::VotingScheme;

/// Errors surfaced while assembling classifiers, datasets, or adversarial
/// regions, or when starting an analysis.
///
/// Exhausting the analysis budget is not an error: it is reported as the
/// [`Unknown`](crate::Stability::Unknown) verdict.
#[derive(Debug, Error)]
pub enum Error {
    #[error("a forest needs at least one tree")]
    EmptyForest,

    #[error("tree {tree} expects {found} features, the forest expects {expected}")]
    FeatureCountMismatch {
        tree: usize,
        expected: usize,
        found: usize,
    },

    #[error("tree {tree} does not share the forest's label table")]
    LabelTableMismatch { tree: usize },

    #[error("tree {tree} stores leaves incompatible with {scheme:?} voting")]
    LeafVotingMismatch { tree: usize, scheme: VotingScheme },

    #[error("malformed tree: {0}")]
    MalformedTree(&'static str),

    #[error("sample has {found} features, the classifier expects {expected}")]
    SampleDimMismatch { expected: usize, found: usize },

    #[error("tier vector has {found} entries, the classifier expects {expected}")]
    TierLengthMismatch { expected: usize, found: usize },

    #[error("perturbation radius must be finite and non-negative")]
    InvalidRadius,

    #[error("perturbation clip bounds must satisfy lo <= hi")]
    InvalidClipBounds,

    #[error("adversarial region is empty")]
    EmptyRegion,

    #[error("malformed region: {0}")]
    MalformedRegion(String),

    #[error("analysis timeout must be at least one second")]
    TimeoutTooSmall,

    #[error("malformed dataset: {0}")]
    MalformedDataset(&'static str),
}
