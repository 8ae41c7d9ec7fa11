//! Batch planning: merging per-filter registrations into a fetch plan.
//!
//! The planner takes `{range, request}` registrations in the order the user
//! made them and produces a disjoint, strictly increasing list of segments
//! covering the union of the registered ranges exactly once. Registrations
//! sharing a range merge their requests; overlapping-but-distinct ranges are
//! split at the boundaries so each segment carries the union of every
//! request that applies to it.

use crate::filter::DataRequest;
use crate::range::Range;
use std::collections::BTreeSet;

/// One unit of fetch work: a range plus the filter request that applies to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Blocks this batch covers.
    pub range: Range,
    /// What to fetch for them.
    pub request: DataRequest,
}

/// Merge registrations into a disjoint, strictly increasing plan.
///
/// The sweep collects every range boundary (`from`, and `to + 1` for bounded
/// ranges) and walks the segments between consecutive boundaries. A segment
/// enters the plan when at least one registration covers it, carrying the
/// merge of every covering request in registration order. A trailing segment
/// is open-ended exactly when an open-ended registration covers it.
pub fn merge_batch_requests(registrations: Vec<BatchRequest>) -> Vec<BatchRequest> {
    let mut points = BTreeSet::new();
    for item in &registrations {
        points.insert(item.range.from);
        if let Some(to) = item.range.to {
            points.insert(to + 1);
        }
    }
    let points: Vec<i64> = points.into_iter().collect();

    let mut plan = Vec::new();
    for (i, &start) in points.iter().enumerate() {
        // Segments never straddle a boundary, so covering the segment start
        // means covering the whole segment.
        let mut covering = registrations
            .iter()
            .filter(|item| item.range.contains(start))
            .map(|item| &item.request);

        let Some(first) = covering.next() else {
            continue;
        };
        let request = covering.fold(first.clone(), |acc, r| acc.merge(r));

        let to = match points.get(i + 1) {
            Some(&next) => Some(next - 1),
            // Only open-ended registrations reach past the last boundary.
            None => None,
        };
        plan.push(BatchRequest {
            range: Range { from: start, to },
            request,
        });
    }
    plan
}

/// Clip every segment of `plan` to `bound`, dropping segments that fall
/// entirely outside. Order is preserved.
pub fn apply_range_bound(plan: Vec<BatchRequest>, bound: &Range) -> Vec<BatchRequest> {
    plan.into_iter()
        .filter_map(|item| {
            item.range.intersect(bound).map(|range| BatchRequest {
                range,
                request: item.request,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::LogRequest;

    fn reg(from: i64, to: Option<i64>, tag: &str) -> BatchRequest {
        BatchRequest {
            range: Range { from, to },
            request: DataRequest::from_log(LogRequest {
                address: Some(vec![tag.to_string()]),
                ..LogRequest::default()
            }),
        }
    }

    fn tags(item: &BatchRequest) -> Vec<String> {
        item.request
            .logs
            .iter()
            .flat_map(|l| l.address.clone().unwrap_or_default())
            .collect()
    }

    fn assert_disjoint_increasing(plan: &[BatchRequest]) {
        for pair in plan.windows(2) {
            assert!(
                pair[0].range.end() < pair[1].range.from,
                "plan segments {} and {} overlap or are out of order",
                pair[0].range,
                pair[1].range
            );
        }
    }

    #[test]
    fn test_disjoint_registrations_pass_through() {
        let plan = merge_batch_requests(vec![reg(0, Some(9), "a"), reg(20, Some(29), "b")]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].range, Range::new(0, Some(9)).unwrap());
        assert_eq!(plan[1].range, Range::new(20, Some(29)).unwrap());
        assert_disjoint_increasing(&plan);
    }

    #[test]
    fn test_identical_ranges_merge_requests() {
        let plan = merge_batch_requests(vec![reg(0, Some(9), "a"), reg(0, Some(9), "b")]);
        assert_eq!(plan.len(), 1);
        assert_eq!(tags(&plan[0]), vec!["a", "b"]);
    }

    #[test]
    fn test_overlap_splits_at_boundaries() {
        let plan = merge_batch_requests(vec![reg(0, Some(100), "a"), reg(5, Some(10), "b")]);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].range, Range::new(0, Some(4)).unwrap());
        assert_eq!(tags(&plan[0]), vec!["a"]);
        assert_eq!(plan[1].range, Range::new(5, Some(10)).unwrap());
        assert_eq!(tags(&plan[1]), vec!["a", "b"]);
        assert_eq!(plan[2].range, Range::new(11, Some(100)).unwrap());
        assert_eq!(tags(&plan[2]), vec!["a"]);
        assert_disjoint_increasing(&plan);
    }

    #[test]
    fn test_merge_order_follows_registration_order() {
        // "b" starts earlier but was registered second; within the shared
        // segment the clause list still reads a, b.
        let plan = merge_batch_requests(vec![reg(10, Some(20), "a"), reg(0, Some(20), "b")]);
        let shared = plan
            .iter()
            .find(|p| p.range.from == 10)
            .expect("shared segment");
        assert_eq!(tags(shared), vec!["a", "b"]);
    }

    #[test]
    fn test_open_ended_tail() {
        let plan = merge_batch_requests(vec![reg(0, Some(9), "a"), reg(5, None, "b")]);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].range, Range::new(0, Some(4)).unwrap());
        assert_eq!(plan[1].range, Range::new(5, Some(9)).unwrap());
        assert_eq!(tags(&plan[1]), vec!["a", "b"]);
        assert_eq!(plan[2].range, Range::open(10));
        assert_eq!(tags(&plan[2]), vec!["b"]);
    }

    #[test]
    fn test_coverage_equals_union_of_inputs() {
        let regs = vec![
            reg(3, Some(7), "a"),
            reg(5, Some(12), "b"),
            reg(20, Some(22), "c"),
            reg(21, Some(30), "d"),
        ];
        let plan = merge_batch_requests(regs.clone());
        assert_disjoint_increasing(&plan);
        for height in 0..40 {
            let in_inputs = regs.iter().any(|r| r.range.contains(height));
            let in_plan = plan.iter().filter(|p| p.range.contains(height)).count();
            assert_eq!(in_plan, usize::from(in_inputs), "height {height}");
        }
    }

    #[test]
    fn test_apply_bound_clips_and_drops() {
        let plan = merge_batch_requests(vec![reg(0, Some(9), "a"), reg(20, None, "b")]);
        let bounded = apply_range_bound(plan, &Range::new(5, Some(25)).unwrap());
        assert_eq!(bounded.len(), 2);
        assert_eq!(bounded[0].range, Range::new(5, Some(9)).unwrap());
        assert_eq!(bounded[1].range, Range::new(20, Some(25)).unwrap());

        let emptied = apply_range_bound(bounded, &Range::new(100, Some(200)).unwrap());
        assert!(emptied.is_empty());
    }
}
