//! Consensus estimate: integer mean of the non-abstaining votes, snapped to the scale.

/// Allowed estimate values, ascending.
pub const SCALE: [u32; 6] = [1, 2, 3, 5, 8, 13];

/// Compute the consensus for a set of votes. A vote of 0 means "abstained".
///
/// The mean is truncated before snapping. Snapping scans [`SCALE`] in
/// ascending order and keeps the first value with the smallest distance, so
/// a mean equidistant from two values snaps to the smaller one.
pub fn consensus<I>(votes: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    let (sum, count) = votes
        .into_iter()
        .filter(|v| *v > 0)
        .fold((0u64, 0u64), |(sum, count), v| (sum + u64::from(v), count + 1));

    if count == 0 {
        return 0;
    }

    snap((sum / count) as u32)
}

/// Snap a value to the nearest entry in [`SCALE`].
pub fn snap(value: u32) -> u32 {
    if SCALE.contains(&value) {
        return value;
    }

    let mut closest = SCALE[0];
    let mut min_diff = value.abs_diff(closest);
    for &candidate in &SCALE[1..] {
        let diff = value.abs_diff(candidate);
        if diff < min_diff {
            min_diff = diff;
            closest = candidate;
        }
    }
    closest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_abstained() {
        assert_eq!(consensus([]), 0);
        assert_eq!(consensus([0, 0, 0]), 0);
    }

    #[test]
    fn test_truncated_mean_snaps_down() {
        // mean 18 / 3 = 6
        assert_eq!(consensus([5, 5, 8]), 5);
        // mean 3 / 2 = 1
        assert_eq!(consensus([1, 2]), 1);
    }

    #[test]
    fn test_abstentions_excluded() {
        assert_eq!(consensus([8, 0, 8, 0]), 8);
    }

    #[test]
    fn test_exact_scale_values() {
        for v in SCALE {
            assert_eq!(snap(v), v);
        }
    }

    #[test]
    fn test_ties_go_to_smaller() {
        // 4 is equidistant from 3 and 5
        assert_eq!(snap(4), 3);
        // 10 is 2 from 8 and 3 from 13
        assert_eq!(snap(10), 8);
        // 11 is 3 from 8 and 2 from 13
        assert_eq!(snap(11), 13);
    }

    #[test]
    fn test_large_values_snap_to_top() {
        assert_eq!(snap(100), 13);
        assert_eq!(consensus([40, 40]), 13);
    }
}
