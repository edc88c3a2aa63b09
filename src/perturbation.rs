//! Adversarial regions: a reference sample plus a perturbation, translated
//! into the hyperrectangle the verifier refines.

use std::io::BufRead;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hyperrect::Hyperrectangle;
use crate::interval::Interval;

/// A bounded perturbation of a numeric sample.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Perturbation {
    /// L-infinity ball of the given radius around the sample.
    LInf { radius: f64 },
    /// L-infinity ball clipped to `[lo, hi]` in every dimension.
    ClippedLInf { radius: f64, lo: f64, hi: f64 },
    /// An externally supplied interval box, used as-is.
    Region { intervals: Vec<Interval> },
}

impl Perturbation {
    pub fn l_inf(radius: f64) -> Result<Self, Error> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(Error::InvalidRadius);
        }
        Ok(Perturbation::LInf { radius })
    }

    pub fn clipped_l_inf(radius: f64, lo: f64, hi: f64) -> Result<Self, Error> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(Error::InvalidRadius);
        }
        if lo > hi {
            return Err(Error::InvalidClipBounds);
        }
        Ok(Perturbation::ClippedLInf { radius, lo, hi })
    }

    pub fn region(intervals: Vec<Interval>) -> Self {
        Perturbation::Region { intervals }
    }

    /// Read `n` whitespace-separated `[l,u]` pairs, e.g.
    /// `[0,1] [-0.5,0.5]`, and build a [`Perturbation::Region`].
    pub fn from_reader<R: BufRead>(mut reader: R, n: usize) -> Result<Self, Error> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| Error::MalformedRegion(e.to_string()))?;
        let mut tokens = text.split_whitespace();
        let mut intervals = Vec::with_capacity(n);
        for i in 0..n {
            let token = tokens.next().ok_or_else(|| {
                Error::MalformedRegion(format!("expected {n} interval pairs, found {i}"))
            })?;
            intervals.push(parse_pair(token)?);
        }
        Ok(Perturbation::Region { intervals })
    }
}

fn parse_pair(token: &str) -> Result<Interval, Error> {
    let inner = token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| Error::MalformedRegion(format!("expected [l,u], found {token:?}")))?;
    let (l, u) = inner
        .split_once(',')
        .ok_or_else(|| Error::MalformedRegion(format!("expected [l,u], found {token:?}")))?;
    let lo: f64 = l
        .trim()
        .parse()
        .map_err(|_| Error::MalformedRegion(format!("bad bound {l:?}")))?;
    let hi: f64 = u
        .trim()
        .parse()
        .map_err(|_| Error::MalformedRegion(format!("bad bound {u:?}")))?;
    if lo > hi {
        return Err(Error::MalformedRegion(format!("empty interval {token:?}")));
    }
    Ok(Interval::new(lo, hi))
}

/// A reference sample together with the perturbation an adversary may
/// apply to it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdversarialRegion {
    sample: Vec<f64>,
    perturbation: Perturbation,
}

impl AdversarialRegion {
    pub fn new(sample: Vec<f64>, perturbation: Perturbation) -> Result<Self, Error> {
        if let Perturbation::Region { intervals } = &perturbation {
            if intervals.len() != sample.len() {
                return Err(Error::SampleDimMismatch {
                    expected: sample.len(),
                    found: intervals.len(),
                });
            }
        }
        Ok(AdversarialRegion {
            sample,
            perturbation,
        })
    }

    pub fn sample(&self) -> &[f64] {
        &self.sample
    }

    pub fn perturbation(&self) -> &Perturbation {
        &self.perturbation
    }

    /// The hyperrectangle of all points the adversary can reach.
    pub fn hyperrectangle(&self) -> Hyperrectangle {
        let intervals = match &self.perturbation {
            Perturbation::LInf { radius } => self
                .sample
                .iter()
                .map(|&x| Interval::new(x - radius, x + radius))
                .collect(),
            Perturbation::ClippedLInf { radius, lo, hi } => self
                .sample
                .iter()
                .map(|&x| Interval::new((x - radius).max(*lo), (x + radius).min(*hi)))
                .collect(),
            Perturbation::Region { intervals } => intervals.clone(),
        };
        Hyperrectangle::new(intervals)
    }
}
