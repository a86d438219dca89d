//! Fractional ordering keys
//!
//! Categories and diagrams are ordered by an `f64` position. Moving an
//! item assigns it the midpoint of its new neighbors; appending leaves a
//! gap of [`POSITION_GAP`] so later insertions have room to interpolate.
//! Repeated bisection of the same gap eventually runs out of precision,
//! so callers check [`needs_respacing`] and fall back to [`respace`].

/// Spacing between freshly appended or respaced items
pub const POSITION_GAP: f64 = 1000.0;

/// Default smallest neighbor gap accepted before respacing
pub const DEFAULT_MIN_GAP: f64 = 1e-6;

/// Returns a position strictly between `lower` and `upper`, or an
/// append position after `lower` when there is no upper neighbor.
///
/// `lower` is `0.0` when inserting at the head of a list.
pub fn allocate(lower: f64, upper: Option<f64>) -> f64 {
    match upper {
        Some(upper) => (lower + upper) / 2.0,
        None => append_after(lower),
    }
}

/// Position for an item appended after the current maximum
pub fn append_after(max_existing: f64) -> f64 {
    (max_existing + 1.0) * POSITION_GAP
}

/// Append position for a list given all of its current positions
pub fn next_position<I>(positions: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let max = positions.into_iter().fold(0.0_f64, f64::max);
    append_after(max)
}

/// True when the gap between two neighbors is too small to bisect safely
pub fn needs_respacing(lower: f64, upper: f64, min_gap: f64) -> bool {
    if upper - lower < min_gap {
        return true;
    }
    let mid = (lower + upper) / 2.0;
    !(mid > lower && mid < upper)
}

/// Evenly spaced positions for `ids` in the given order
pub fn respace<I, S>(ids: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter()
        .enumerate()
        .map(|(index, id)| (id.into(), (index as f64 + 1.0) * POSITION_GAP))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_midpoint_is_strictly_between() {
        let cases = [(0.0, 1000.0), (1000.0, 2000.0), (1.5, 1.75), (-10.0, 10.0)];
        for (lower, upper) in cases {
            let p = allocate(lower, Some(upper));
            assert!(p > lower && p < upper, "{} not in ({}, {})", p, lower, upper);
        }
    }

    #[test]
    fn test_append_formula() {
        assert_eq!(allocate(2000.0, None), 2_001_000.0);
        assert_eq!(allocate(0.0, None), 1000.0);
        assert_eq!(next_position(Vec::<f64>::new()), 1000.0);
        assert_eq!(next_position([3.0, 1.0, 2.0]), 4000.0);
    }

    #[test]
    fn test_head_insert_uses_zero_lower_bound() {
        assert_eq!(allocate(0.0, Some(2000.0)), 1000.0);
    }

    #[test]
    fn test_repeated_bisection_eventually_needs_respacing() {
        let lower = 1000.0;
        let mut upper = 2000.0;
        let mut steps = 0;
        while !needs_respacing(lower, upper, DEFAULT_MIN_GAP) {
            upper = allocate(lower, Some(upper));
            steps += 1;
            assert!(steps < 200, "gap never collapsed");
        }
        assert!(upper - lower < DEFAULT_MIN_GAP);
    }

    #[test]
    fn test_needs_respacing_detects_equal_neighbors() {
        assert!(needs_respacing(5.0, 5.0, DEFAULT_MIN_GAP));
        assert!(!needs_respacing(0.0, 1000.0, DEFAULT_MIN_GAP));
    }

    #[test]
    fn test_respace_assigns_even_gaps() {
        let spaced = respace(["b", "a", "c"]);
        assert_eq!(
            spaced,
            vec![
                ("b".to_string(), 1000.0),
                ("a".to_string(), 2000.0),
                ("c".to_string(), 3000.0)
            ]
        );
    }

    /// Smallest float above `x`
    fn next_float(x: f64) -> f64 {
        if x == 0.0 {
            f64::from_bits(1)
        } else if x > 0.0 {
            f64::from_bits(x.to_bits() + 1)
        } else {
            f64::from_bits(x.to_bits() - 1)
        }
    }

    proptest! {
        #[test]
        fn allocate_between_any_neighbours(
            lower in -1e6f64..1e6,
            gap in prop_oneof![1e-9f64..1e-3, 1e-3f64..1e9],
        ) {
            let upper = lower + gap;
            prop_assume!(lower < upper);
            let p = allocate(lower, Some(upper));
            prop_assert!(
                (p > lower && p < upper) || needs_respacing(lower, upper, DEFAULT_MIN_GAP),
                "{} escaped ({}, {}) without asking for respacing", p, lower, upper
            );
        }

        #[test]
        fn adjacent_floats_ask_for_respacing(lower in -1e6f64..1e6, ulps in 1u32..4) {
            let mut upper = lower;
            for _ in 0..ulps {
                upper = next_float(upper);
            }
            prop_assert!(needs_respacing(lower, upper, DEFAULT_MIN_GAP));
        }

        #[test]
        fn accepted_gaps_bisect_strictly(a in -1e9f64..1e9, b in -1e9f64..1e9) {
            let (lower, upper) = if a < b { (a, b) } else { (b, a) };
            prop_assume!(lower < upper);
            if !needs_respacing(lower, upper, DEFAULT_MIN_GAP) {
                let p = allocate(lower, Some(upper));
                prop_assert!(p > lower && p < upper);
            }
        }
    }
}
