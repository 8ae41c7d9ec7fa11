//! Inclusive block ranges and the small interval algebra the planner uses.
//!
//! A [`Range`] is an inclusive interval of block heights. `to == None` means
//! the range is open-ended and follows the chain head forever.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive range of block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// First block of the range.
    pub from: i64,
    /// Last block of the range, or `None` for an open-ended range.
    pub to: Option<i64>,
}

impl Range {
    /// Create a range, validating that `from <= to` when both ends are given.
    pub fn new(from: i64, to: Option<i64>) -> Result<Self> {
        match to {
            Some(to) if to < from => Err(Error::InvalidRange { from, to }),
            _ => Ok(Self { from, to }),
        }
    }

    /// A range covering a single block.
    pub fn single(height: i64) -> Self {
        Self {
            from: height,
            to: Some(height),
        }
    }

    /// An open-ended range starting at `from`.
    pub fn open(from: i64) -> Self {
        Self { from, to: None }
    }

    /// Last covered block, with open-ended ranges mapped to `i64::MAX`.
    pub fn end(&self) -> i64 {
        self.to.unwrap_or(i64::MAX)
    }

    /// Whether `height` falls inside the range.
    pub fn contains(&self, height: i64) -> bool {
        self.from <= height && height <= self.end()
    }

    /// Intersection of two ranges, or `None` when they do not overlap.
    pub fn intersect(&self, other: &Range) -> Option<Range> {
        let from = self.from.max(other.from);
        let end = self.end().min(other.end());
        if from > end {
            return None;
        }
        let to = if end == i64::MAX { None } else { Some(end) };
        Some(Range { from, to })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, ∞)", self.from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted_range() {
        assert!(Range::new(10, Some(5)).is_err());
        assert!(Range::new(10, Some(10)).is_ok());
        assert!(Range::new(10, None).is_ok());
    }

    #[test]
    fn test_end() {
        assert_eq!(Range::new(0, Some(7)).unwrap().end(), 7);
        assert_eq!(Range::open(0).end(), i64::MAX);
    }

    #[test]
    fn test_contains() {
        let r = Range::new(5, Some(10)).unwrap();
        assert!(!r.contains(4));
        assert!(r.contains(5));
        assert!(r.contains(10));
        assert!(!r.contains(11));
        assert!(Range::open(5).contains(i64::MAX));
    }

    #[test]
    fn test_intersect_overlapping() {
        let a = Range::new(0, Some(10)).unwrap();
        let b = Range::new(5, Some(20)).unwrap();
        assert_eq!(a.intersect(&b), Some(Range::new(5, Some(10)).unwrap()));
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = Range::new(0, Some(4)).unwrap();
        let b = Range::new(5, Some(20)).unwrap();
        assert_eq!(a.intersect(&b), None);
    }

    #[test]
    fn test_intersect_touching_single_block() {
        let a = Range::new(0, Some(5)).unwrap();
        let b = Range::new(5, Some(20)).unwrap();
        assert_eq!(a.intersect(&b), Some(Range::single(5)));
    }

    #[test]
    fn test_intersect_open_ended() {
        let a = Range::open(100);
        let b = Range::open(50);
        assert_eq!(a.intersect(&b), Some(Range::open(100)));

        let bounded = Range::new(0, Some(150)).unwrap();
        assert_eq!(
            a.intersect(&bounded),
            Some(Range::new(100, Some(150)).unwrap())
        );
    }
}
