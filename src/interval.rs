//! Closed interval arithmetic with outward rounding.
//!
//! Lower bounds round toward negative infinity and upper bounds toward
//! positive infinity, so every operation returns a superset of the exact
//! real result. Rust exposes no stable control over the hardware rounding
//! mode; bounds are instead nudged one ulp outward after each operation
//! (two for [`Interval::exp`], whose libm implementation is not correctly
//! rounded). The price is one spurious ulp on results that happened to be
//! exact.

use std::fmt;

use rand::distributions::Uniform;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest representable float strictly above `x`.
pub(crate) fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        x
    } else if x == 0.0 {
        f64::from_bits(1)
    } else if x > 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        f64::from_bits(x.to_bits() - 1)
    }
}

/// Largest representable float strictly below `x`.
pub(crate) fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

/// Round a freshly computed lower bound toward negative infinity.
pub(crate) fn round_down(x: f64) -> f64 {
    next_down(x)
}

/// Round a freshly computed upper bound toward positive infinity.
pub(crate) fn round_up(x: f64) -> f64 {
    next_up(x)
}

/// A closed interval `[lo, hi]` of reals.
///
/// The interval is *bottom* (empty) when `lo > hi`; bottom propagates
/// through every operation and is never an error.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    /// The canonical empty interval.
    pub const BOTTOM: Interval = Interval {
        lo: f64::INFINITY,
        hi: f64::NEG_INFINITY,
    };

    pub fn new(lo: f64, hi: f64) -> Self {
        Interval { lo, hi }
    }

    /// Degenerate interval containing exactly `v`.
    pub fn point(v: f64) -> Self {
        Interval { lo: v, hi: v }
    }

    pub fn is_bottom(&self) -> bool {
        self.lo > self.hi
    }

    pub fn contains(&self, v: f64) -> bool {
        self.lo <= v && v <= self.hi
    }

    /// `true` iff every element of `self` lies below every element of
    /// `other`.
    pub fn is_strictly_less_than(&self, other: &Interval) -> bool {
        self.hi < other.lo
    }

    pub fn midpoint(&self) -> f64 {
        self.lo + (self.hi - self.lo) / 2.0
    }

    pub fn radius(&self) -> f64 {
        (self.hi - self.lo) / 2.0
    }

    pub fn add(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::BOTTOM;
        }
        Interval::new(round_down(self.lo + other.lo), round_up(self.hi + other.hi))
    }

    pub fn sub(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::BOTTOM;
        }
        Interval::new(round_down(self.lo - other.hi), round_up(self.hi - other.lo))
    }

    /// Interval product.
    ///
    /// The nine sign patterns of the operands are enumerated so each bound
    /// is computed from exactly the corner products that can attain it;
    /// zero operands short-circuit to `[0, 0]`.
    pub fn mul(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::BOTTOM;
        }
        let zero = Interval::point(0.0);
        if *self == zero || *other == zero {
            return zero;
        }
        let (a, b) = (self, other);
        let (lo, hi) = if a.lo >= 0.0 {
            if b.lo >= 0.0 {
                (a.lo * b.lo, a.hi * b.hi)
            } else if b.hi <= 0.0 {
                (a.hi * b.lo, a.lo * b.hi)
            } else {
                (a.hi * b.lo, a.hi * b.hi)
            }
        } else if a.hi <= 0.0 {
            if b.lo >= 0.0 {
                (a.lo * b.hi, a.hi * b.lo)
            } else if b.hi <= 0.0 {
                (a.hi * b.hi, a.lo * b.lo)
            } else {
                (a.lo * b.hi, a.lo * b.lo)
            }
        } else if b.lo >= 0.0 {
            (a.lo * b.hi, a.hi * b.hi)
        } else if b.hi <= 0.0 {
            (a.hi * b.lo, a.lo * b.lo)
        } else {
            (
                (a.lo * b.hi).min(a.hi * b.lo),
                (a.lo * b.lo).max(a.hi * b.hi),
            )
        };
        Interval::new(round_down(lo), round_up(hi))
    }

    /// `self * other + addend`, rounded outward at both steps.
    pub fn mul_add(&self, other: &Interval, addend: &Interval) -> Interval {
        self.mul(other).add(addend)
    }

    /// Natural power by repeated products.
    pub fn powi(&self, n: u32) -> Interval {
        if self.is_bottom() {
            return Interval::BOTTOM;
        }
        let mut acc = Interval::point(1.0);
        for _ in 0..n {
            acc = acc.mul(self);
        }
        acc
    }

    /// Pointwise `exp`, widened two ulps per bound to absorb libm error.
    /// The lower bound is clamped at zero since the true exponential is
    /// positive.
    pub fn exp(&self) -> Interval {
        if self.is_bottom() {
            return Interval::BOTTOM;
        }
        let lo = round_down(round_down(self.lo.exp())).max(0.0);
        let hi = round_up(round_up(self.hi.exp()));
        Interval::new(lo, hi)
    }

    /// Shift both bounds by `c`.
    pub fn translate(&self, c: f64) -> Interval {
        if self.is_bottom() {
            return Interval::BOTTOM;
        }
        Interval::new(round_down(self.lo + c), round_up(self.hi + c))
    }

    /// Multiply by the scalar `c`.
    pub fn scale(&self, c: f64) -> Interval {
        if self.is_bottom() {
            return Interval::BOTTOM;
        }
        if c >= 0.0 {
            Interval::new(round_down(self.lo * c), round_up(self.hi * c))
        } else {
            Interval::new(round_down(self.hi * c), round_up(self.lo * c))
        }
    }

    /// Greatest lower bound (intersection). Exact, no rounding.
    pub fn glb(&self, other: &Interval) -> Interval {
        Interval::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    /// Least upper bound (convex hull). Exact, no rounding.
    pub fn lub(&self, other: &Interval) -> Interval {
        if self.is_bottom() {
            return *other;
        }
        if other.is_bottom() {
            return *self;
        }
        Interval::new(self.lo.min(other.lo), self.hi.max(other.hi))
    }

    /// Draw uniformly from the interval. Must not be bottom.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        debug_assert!(!self.is_bottom());
        // sampling with lower and upper bound being equal panics
        if self.lo == self.hi {
            self.lo
        } else {
            rng.sample(Uniform::new_inclusive(self.lo, self.hi))
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.lo, self.hi)
    }
}
