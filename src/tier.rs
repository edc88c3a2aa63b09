//! Tier constraints: groups of one-hot indicator features of which at most
//! one can be on at a time.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::hyperrect::Hyperrectangle;
use crate::interval::Interval;

/// Assigns every feature a tier group; group `0` means "not tiered".
///
/// Features sharing a non-zero group encode one categorical value as
/// mutually exclusive 0/1 indicators. After a refinement clamps such a
/// feature, [`Tiers::adjust`] narrows the region so it cannot contain
/// points that switch two categories on at once.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tiers {
    groups: Vec<usize>,
}

impl Tiers {
    /// A tier vector that constrains nothing.
    pub fn untiered(n_features: usize) -> Self {
        Tiers {
            groups: vec![0; n_features],
        }
    }

    pub fn new(groups: Vec<usize>) -> Self {
        Tiers { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, feature: usize) -> usize {
        self.groups[feature]
    }

    fn members(&self, group: usize) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(move |&(_, &g)| g == group)
            .map(|(i, _)| i)
    }

    /// Re-narrow `region` after the interval of `feature` was clamped.
    ///
    /// An indicator whose interval excludes 0 is *on*: it narrows to
    /// `[1,1]` and the rest of its group turns off. One whose interval
    /// excludes 1 is *off*: it narrows to `[0,0]`, and when a single
    /// undecided member remains, that member must be on. Narrowing always
    /// goes through the greatest lower bound, so the region can only
    /// shrink; an indicator excluding both 0 and 1 makes the region bottom
    /// (the branch is infeasible).
    pub fn adjust(&self, region: &mut Hyperrectangle, feature: usize) {
        let group = self.groups[feature];
        if group == 0 {
            return;
        }
        let iv = region.interval(feature);
        if iv.is_bottom() {
            return;
        }
        let excludes_off = iv.lo > 0.0;
        let excludes_on = iv.hi < 1.0;
        if excludes_off && excludes_on {
            region.set_interval(feature, Interval::BOTTOM);
        } else if excludes_off {
            region.set_interval(feature, iv.glb(&Interval::point(1.0)));
            for other in self.members(group) {
                if other != feature {
                    region.set_interval(other, region.interval(other).glb(&Interval::point(0.0)));
                }
            }
        } else if excludes_on {
            region.set_interval(feature, iv.glb(&Interval::point(0.0)));
            let mut undecided = None;
            let mut n_undecided = 0;
            for other in self.members(group) {
                let other_iv = region.interval(other);
                if other_iv.is_bottom() || other_iv.hi < 1.0 {
                    continue;
                }
                n_undecided += 1;
                undecided = Some(other);
            }
            if n_undecided == 1 {
                let survivor = undecided.expect("counted above");
                region.set_interval(
                    survivor,
                    region.interval(survivor).glb(&Interval::point(1.0)),
                );
            }
        }
    }
}
