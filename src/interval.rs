//! Symbolic intervals, boxes, and per-variable bounds maps.
//!
//! These are the currency of the bounds machinery: an [`Interval`] is an
//! inclusive `(min, max)` pair of symbolic expressions, a [`DimBox`] is one
//! interval per dimension, and a [`DimBounds`] maps loop variables to the
//! interval they range over.
//!
//! Extents and areas are only *known* when the endpoints fold to integer
//! literals; everything downstream represents an unknown extent as `None` and
//! lets it absorb through cost arithmetic.

use crate::expr::{self, Expr};
use crate::simplify::simplify;
use std::collections::BTreeMap;

/// Mapping from variable name to the interval it ranges over.
///
/// Backed by a `BTreeMap` so that any iteration over bounds is deterministic.
pub type DimBounds = BTreeMap<String, Interval>;

/// Mapping from function (or image) name to its required region.
pub type RegionMap = BTreeMap<String, DimBox>;

/// An inclusive symbolic interval `[min, max]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Interval {
    pub min: Expr,
    pub max: Expr,
}

impl Interval {
    pub fn new(min: Expr, max: Expr) -> Interval {
        Interval { min, max }
    }

    /// Degenerate interval holding a single point.
    pub fn point(e: Expr) -> Interval {
        Interval {
            min: e.clone(),
            max: e,
        }
    }

    /// Interval `[min, min + extent - 1]` from literal bounds.
    pub fn from_min_extent(min: i64, extent: i64) -> Interval {
        Interval {
            min: Expr::IntImm(min),
            max: Expr::IntImm(min + extent - 1),
        }
    }

    /// Interval `[min, min + extent - 1]` from symbolic bounds.
    pub fn from_min_extent_expr(min: &Expr, extent: &Expr) -> Interval {
        Interval {
            min: simplify(min),
            max: simplify(&(min.clone() + extent.clone() - 1)),
        }
    }

    /// Both endpoints as integer literals, when known.
    pub fn literal(&self) -> Option<(i64, i64)> {
        match (&self.min, &self.max) {
            (Expr::IntImm(a), Expr::IntImm(b)) => Some((*a, *b)),
            _ => None,
        }
    }

    /// `max - min + 1` when both endpoints are literals. May be non-positive
    /// for an empty interval.
    pub fn extent(&self) -> Option<i64> {
        self.literal().map(|(a, b)| b - a + 1)
    }

    /// Smallest interval containing both.
    pub fn hull(&self, other: &Interval) -> Interval {
        Interval {
            min: simplify(&expr::min(self.min.clone(), other.min.clone())),
            max: simplify(&expr::max(self.max.clone(), other.max.clone())),
        }
    }

    /// Per-endpoint intersection. The result may be empty (max < min).
    pub fn intersect(&self, other: &Interval) -> Interval {
        Interval {
            min: simplify(&expr::max(self.min.clone(), other.min.clone())),
            max: simplify(&expr::min(self.max.clone(), other.max.clone())),
        }
    }

    /// The interval translated by a literal offset.
    pub fn shifted(&self, offset: i64) -> Interval {
        Interval {
            min: simplify(&(self.min.clone() + offset)),
            max: simplify(&(self.max.clone() + offset)),
        }
    }
}

/// An axis-aligned box: one interval per dimension, innermost first.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct DimBox {
    dims: Vec<Interval>,
}

impl DimBox {
    pub fn new(dims: Vec<Interval>) -> DimBox {
        DimBox { dims }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn get(&self, i: usize) -> &Interval {
        &self.dims[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.dims.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Interval> {
        self.dims.iter_mut()
    }

    /// Product of extents. `None` if any extent is unknown; `Some(0)` if any
    /// dimension is known-empty.
    pub fn area(&self) -> Option<i64> {
        let mut area: i64 = 1;
        let mut unknown = false;
        for iv in &self.dims {
            match iv.extent() {
                Some(e) if e <= 0 => return Some(0),
                Some(e) => area = area.saturating_mul(e),
                None => unknown = true,
            }
        }
        if unknown { None } else { Some(area) }
    }

    /// True when some dimension is provably empty.
    pub fn is_known_empty(&self) -> bool {
        self.dims.iter().any(|iv| matches!(iv.extent(), Some(e) if e <= 0))
    }

    /// Per-dimension hull of two boxes of equal rank.
    pub fn hull(&self, other: &DimBox) -> DimBox {
        assert_eq!(
            self.rank(),
            other.rank(),
            "internal error: hull of boxes with mismatched rank"
        );
        DimBox {
            dims: self
                .dims
                .iter()
                .zip(&other.dims)
                .map(|(a, b)| a.hull(b))
                .collect(),
        }
    }

    /// Per-dimension intersection of two boxes of equal rank.
    pub fn intersect(&self, other: &DimBox) -> DimBox {
        assert_eq!(
            self.rank(),
            other.rank(),
            "internal error: intersection of boxes with mismatched rank"
        );
        DimBox {
            dims: self
                .dims
                .iter()
                .zip(&other.dims)
                .map(|(a, b)| a.intersect(b))
                .collect(),
        }
    }
}

/// Merge a region map into another, hulling boxes of functions present in both.
pub fn merge_regions(into: &mut RegionMap, from: RegionMap) {
    for (name, reg) in from {
        let merged = match into.get(&name) {
            Some(existing) if existing.rank() == reg.rank() => existing.hull(&reg),
            _ => reg,
        };
        into.insert(name, merged);
    }
}
