use std::collections::HashSet;

use crate::types::Correspondence;

/// Keep only the matches that are confirmed in both directions.
///
/// A forward match `(i, j)` survives when the backward list contains `(j, i)`,
/// i.e. each keypoint independently picked the other as its best match.
///
/// # Arguments
///
/// * `matches_a_to_b` - For keypoints of image A, their best match in image B.
/// * `matches_b_to_a` - For keypoints of image B, their best match in image A.
///
/// # Returns
///
/// The mutual subset of `matches_a_to_b`, in its original order.
///
/// Example:
///
/// ```
/// use kornia_matching::{mutual_matches, Correspondence};
///
/// let a_to_b: Vec<Correspondence> = vec![(0, 1).into(), (1, 2).into(), (2, 0).into()];
/// let b_to_a: Vec<Correspondence> = vec![(1, 0).into(), (2, 2).into(), (0, 2).into()];
/// let mutual = mutual_matches(&a_to_b, &b_to_a);
/// assert_eq!(mutual, vec![Correspondence::new(0, 1), Correspondence::new(2, 0)]);
/// ```
pub fn mutual_matches(
    matches_a_to_b: &[Correspondence],
    matches_b_to_a: &[Correspondence],
) -> Vec<Correspondence> {
    if matches_a_to_b.is_empty() || matches_b_to_a.is_empty() {
        return vec![];
    }

    let backward: HashSet<Correspondence> = matches_b_to_a.iter().copied().collect();

    matches_a_to_b
        .iter()
        .filter(|m| backward.contains(&m.reversed()))
        .copied()
        .collect()
}
