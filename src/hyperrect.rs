//! Hyperrectangles: finite products of intervals, the abstract domain the
//! verifier refines.

use std::fmt;
use std::ops::Index;

use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::interval::Interval;

/// An axis-aligned box in feature space, one [`Interval`] per dimension.
///
/// Binary operations are component-wise; the box is bottom as soon as any
/// component is bottom.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hyperrectangle {
    intervals: Vec<Interval>,
}

impl Hyperrectangle {
    pub fn new(intervals: Vec<Interval>) -> Self {
        Hyperrectangle { intervals }
    }

    /// Degenerate box containing exactly `sample`.
    pub fn point(sample: &[f64]) -> Self {
        Hyperrectangle {
            intervals: sample.iter().map(|&v| Interval::point(v)).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.intervals.len()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn interval(&self, i: usize) -> Interval {
        self.intervals[i]
    }

    pub fn set_interval(&mut self, i: usize, interval: Interval) {
        self.intervals[i] = interval;
    }

    /// Lower the upper bound of dimension `i` to at most `bound`.
    pub fn clamp_upper(&mut self, i: usize, bound: f64) {
        let iv = &mut self.intervals[i];
        iv.hi = iv.hi.min(bound);
    }

    /// Raise the lower bound of dimension `i` to at least `bound`.
    pub fn clamp_lower(&mut self, i: usize, bound: f64) {
        let iv = &mut self.intervals[i];
        iv.lo = iv.lo.max(bound);
    }

    pub fn is_bottom(&self) -> bool {
        self.intervals.iter().any(Interval::is_bottom)
    }

    /// Component-wise greatest lower bound (intersection).
    pub fn meet(&self, other: &Hyperrectangle) -> Hyperrectangle {
        assert_eq!(self.dim(), other.dim(), "meet of mismatched dimensions");
        Hyperrectangle {
            intervals: self
                .intervals
                .iter()
                .zip(&other.intervals)
                .map(|(a, b)| a.glb(b))
                .collect(),
        }
    }

    /// Component-wise least upper bound (hull).
    pub fn join(&self, other: &Hyperrectangle) -> Hyperrectangle {
        assert_eq!(self.dim(), other.dim(), "join of mismatched dimensions");
        Hyperrectangle {
            intervals: self
                .intervals
                .iter()
                .zip(&other.intervals)
                .map(|(a, b)| a.lub(b))
                .collect(),
        }
    }

    /// Product of the per-dimension radii. A search heuristic, not a
    /// rounded quantity.
    pub fn volume(&self) -> f64 {
        self.intervals.iter().map(Interval::radius).product()
    }

    pub fn midpoint(&self) -> Vec<f64> {
        self.intervals.iter().map(Interval::midpoint).collect()
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.dim() == point.len()
            && self
                .intervals
                .iter()
                .zip(point)
                .all(|(iv, &v)| iv.contains(v))
    }

    /// `true` iff `other` lies entirely inside `self`.
    pub fn encloses(&self, other: &Hyperrectangle) -> bool {
        self.dim() == other.dim()
            && self
                .intervals
                .iter()
                .zip(&other.intervals)
                .all(|(a, b)| b.is_bottom() || (a.lo <= b.lo && b.hi <= a.hi))
    }

    /// Draw a point uniformly from the box. Must not be bottom.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.intervals.iter().map(|iv| iv.sample(rng)).collect()
    }
}

impl Index<usize> for Hyperrectangle {
    type Output = Interval;

    fn index(&self, i: usize) -> &Interval {
        &self.intervals[i]
    }
}

impl fmt::Display for Hyperrectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, iv) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{iv}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(dim: usize) -> Hyperrectangle {
        Hyperrectangle::new(vec![Interval::new(0.0, 1.0); dim])
    }

    #[test]
    fn bottom_iff_any_component_is_bottom() {
        let mut h = unit_box(3);
        assert!(!h.is_bottom());
        h.set_interval(1, Interval::BOTTOM);
        assert!(h.is_bottom());
    }

    #[test]
    fn meet_is_componentwise() {
        let a = Hyperrectangle::new(vec![Interval::new(0.0, 2.0), Interval::new(-1.0, 1.0)]);
        let b = Hyperrectangle::new(vec![Interval::new(1.0, 3.0), Interval::new(0.5, 2.0)]);
        let m = a.meet(&b);
        assert_eq!(m[0], Interval::new(1.0, 2.0));
        assert_eq!(m[1], Interval::new(0.5, 1.0));
        assert!(a.encloses(&m) && b.encloses(&m));
    }

    #[test]
    fn meet_of_disjoint_boxes_is_bottom() {
        let a = Hyperrectangle::new(vec![Interval::new(0.0, 1.0)]);
        let b = Hyperrectangle::new(vec![Interval::new(2.0, 3.0)]);
        assert!(a.meet(&b).is_bottom());
    }

    #[test]
    fn join_hulls_both_operands() {
        let a = Hyperrectangle::new(vec![Interval::new(0.0, 1.0)]);
        let b = Hyperrectangle::new(vec![Interval::new(2.0, 3.0)]);
        assert_eq!(a.join(&b)[0], Interval::new(0.0, 3.0));
    }

    #[test]
    fn volume_is_product_of_radii() {
        let h = Hyperrectangle::new(vec![Interval::new(0.0, 2.0), Interval::new(-1.0, 3.0)]);
        assert_eq!(h.volume(), 2.0);
        assert_eq!(Hyperrectangle::point(&[1.0, 2.0]).volume(), 0.0);
    }

    #[test]
    fn clamping_narrows_one_dimension() {
        let mut h = unit_box(2);
        h.clamp_upper(0, 0.25);
        h.clamp_lower(1, 0.75);
        assert_eq!(h[0], Interval::new(0.0, 0.25));
        assert_eq!(h[1], Interval::new(0.75, 1.0));
        // clamps never widen
        h.clamp_upper(0, 2.0);
        assert_eq!(h[0], Interval::new(0.0, 0.25));
    }

    #[test]
    fn midpoint_and_containment() {
        let h = Hyperrectangle::new(vec![Interval::new(-1.0, 1.0), Interval::new(2.0, 4.0)]);
        let mid = h.midpoint();
        assert_eq!(mid, vec![0.0, 3.0]);
        assert!(h.contains(&mid));
        assert!(!h.contains(&[0.0, 5.0]));
        assert!(!h.contains(&[0.0]));
    }

    #[test]
    fn sampling_stays_inside() {
        let rng = &mut rand::thread_rng();
        let h = Hyperrectangle::new(vec![Interval::new(-2.0, -1.0), Interval::point(0.5)]);
        for _ in 0..500 {
            assert!(h.contains(&h.sample(rng)));
        }
    }

    #[test]
    fn display_is_space_separated() {
        let h = Hyperrectangle::new(vec![Interval::new(0.0, 1.0), Interval::new(-2.0, 3.5)]);
        assert_eq!(format!("{h}"), "[0,1] [-2,3.5]");
    }
}
