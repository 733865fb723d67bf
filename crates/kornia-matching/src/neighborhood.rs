use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::MatchingError;
use crate::linalg::euclidean_distance;
use crate::types::{validate_correspondences, Correspondence};

/// Which points form the neighborhood of a keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NeighborRanking {
    /// The `size` closest points.
    #[default]
    Nearest,
    /// The `size` most distant points.
    Farthest,
}

/// Denominator of the consensus ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsensusNormalization {
    /// Divide by the configured neighborhood size, even when fewer neighbors exist.
    #[default]
    Configured,
    /// Divide by the number of neighbors actually available.
    Actual,
}

/// Parameters of the neighborhood consensus filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborhoodParams {
    /// Maximum number of neighbors per keypoint (`K`).
    pub size: usize,
    /// Minimum fraction of corroborating neighbors to keep a correspondence.
    pub threshold: f64,
    /// Neighbor ranking direction.
    pub ranking: NeighborRanking,
    /// Consensus ratio denominator.
    pub normalization: ConsensusNormalization,
}

impl Default for NeighborhoodParams {
    fn default() -> Self {
        Self {
            size: 25,
            threshold: 0.1,
            ranking: NeighborRanking::Nearest,
            normalization: ConsensusNormalization::Configured,
        }
    }
}

impl NeighborhoodParams {
    /// Check that the parameters can be used.
    pub fn validate(&self) -> Result<(), MatchingError> {
        if self.size == 0 {
            return Err(MatchingError::InvalidConfig(
                "neighborhood size must be > 0".to_string(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(MatchingError::InvalidConfig(format!(
                "consensus threshold must be a finite non-negative number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Ranked neighbors of every keypoint in a restricted index set.
///
/// Neighbor lists never contain the keypoint itself and hold at most `size` entries.
#[derive(Debug, Clone, Default)]
pub struct NeighborhoodMap {
    neighbors: HashMap<usize, Vec<usize>>,
}

impl NeighborhoodMap {
    /// Rank, for each index, the other indices by distance and keep the top `size`.
    ///
    /// # Arguments
    ///
    /// * `indices` - The restricted index set. Repeated indices count once.
    /// * `keypoints` - Keypoint coordinates addressed by `indices`.
    /// * `size` - Maximum number of neighbors per keypoint.
    /// * `ranking` - Whether the closest or the most distant points are kept.
    ///
    /// PRECONDITION: every index is valid for `keypoints`.
    pub fn build(
        indices: &[usize],
        keypoints: &[[f64; 2]],
        size: usize,
        ranking: NeighborRanking,
    ) -> Self {
        // deduplicate, keeping the first occurrence so ties rank deterministically
        let mut seen = HashSet::with_capacity(indices.len());
        let unique: Vec<usize> = indices.iter().copied().filter(|i| seen.insert(*i)).collect();

        let mut neighbors = HashMap::with_capacity(unique.len());
        for &center in &unique {
            let p = &keypoints[center];
            let mut ranked: Vec<(usize, f64)> = unique
                .iter()
                .filter(|&&other| other != center)
                .map(|&other| (other, euclidean_distance(p, &keypoints[other])))
                .collect();

            match ranking {
                NeighborRanking::Nearest => ranked.sort_by(|a, b| a.1.total_cmp(&b.1)),
                NeighborRanking::Farthest => ranked.sort_by(|a, b| b.1.total_cmp(&a.1)),
            }
            ranked.truncate(size);

            neighbors.insert(center, ranked.into_iter().map(|(idx, _)| idx).collect());
        }

        Self { neighbors }
    }

    /// The ranked neighbors of `index`, or `None` if it is not in the restricted set.
    pub fn get(&self, index: usize) -> Option<&[usize]> {
        self.neighbors.get(&index).map(|v| v.as_slice())
    }

    /// Whether `candidate` is among the neighbors of `center`.
    pub fn is_neighbor(&self, center: usize, candidate: usize) -> bool {
        self.get(center)
            .is_some_and(|neighbors| neighbors.contains(&candidate))
    }

    /// Number of keypoints with a neighborhood.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether the map holds no keypoints.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Iterate over `(index, neighbors)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.neighbors.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}

/// Neighborhood maps of both images for one correspondence list.
struct NeighborhoodPair {
    source: NeighborhoodMap,
    target: NeighborhoodMap,
}

impl NeighborhoodPair {
    fn build(
        correspondences: &[Correspondence],
        source_keypoints: &[[f64; 2]],
        target_keypoints: &[[f64; 2]],
        params: &NeighborhoodParams,
    ) -> Self {
        let source_idx: Vec<usize> = correspondences.iter().map(|c| c.source).collect();
        let target_idx: Vec<usize> = correspondences.iter().map(|c| c.target).collect();
        Self {
            source: NeighborhoodMap::build(
                &source_idx,
                source_keypoints,
                params.size,
                params.ranking,
            ),
            target: NeighborhoodMap::build(
                &target_idx,
                target_keypoints,
                params.size,
                params.ranking,
            ),
        }
    }

    fn score(&self, m: &Correspondence, correspondences: &[Correspondence]) -> usize {
        correspondences
            .iter()
            .filter(|other| {
                self.source.is_neighbor(m.source, other.source)
                    && self.target.is_neighbor(m.target, other.target)
            })
            .count()
    }

    fn available(&self, m: &Correspondence) -> usize {
        let s = self.source.get(m.source).map_or(0, |n| n.len());
        let t = self.target.get(m.target).map_or(0, |n| n.len());
        s.min(t)
    }
}

/// Count, for every correspondence, the other correspondences that fall in its
/// neighborhood in both images.
///
/// # Arguments
///
/// * `correspondences` - The correspondences to score.
/// * `source_keypoints` - Keypoints of the first image.
/// * `target_keypoints` - Keypoints of the second image.
/// * `params` - Neighborhood size and ranking.
///
/// # Returns
///
/// One consensus score per correspondence, in input order.
pub fn consensus_scores(
    correspondences: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
    params: &NeighborhoodParams,
) -> Result<Vec<usize>, MatchingError> {
    params.validate()?;
    validate_correspondences(
        correspondences,
        source_keypoints.len(),
        target_keypoints.len(),
    )?;

    let maps = NeighborhoodPair::build(
        correspondences,
        source_keypoints,
        target_keypoints,
        params,
    );

    Ok(correspondences
        .iter()
        .map(|m| maps.score(m, correspondences))
        .collect())
}

/// Remove correspondences whose local neighborhood disagrees between the two images.
///
/// A correspondence `(s, t)` is kept when at least `threshold` of its neighborhood is
/// corroborated, that is when enough other correspondences `(s', t')` have `s'` among
/// the neighbors of `s` and `t'` among the neighbors of `t`.
///
/// # Arguments
///
/// * `correspondences` - The correspondences to filter, typically mutual matches.
/// * `source_keypoints` - Keypoints of the first image.
/// * `target_keypoints` - Keypoints of the second image.
/// * `params` - Neighborhood size, threshold, ranking and normalization.
///
/// # Returns
///
/// The retained correspondences, in input order.
pub fn neighborhood_consensus(
    correspondences: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
    params: &NeighborhoodParams,
) -> Result<Vec<Correspondence>, MatchingError> {
    params.validate()?;
    validate_correspondences(
        correspondences,
        source_keypoints.len(),
        target_keypoints.len(),
    )?;

    let maps = NeighborhoodPair::build(
        correspondences,
        source_keypoints,
        target_keypoints,
        params,
    );

    let kept: Vec<Correspondence> = correspondences
        .iter()
        .filter(|m| {
            let score = maps.score(m, correspondences);
            let denom = match params.normalization {
                ConsensusNormalization::Configured => params.size,
                ConsensusNormalization::Actual => maps.available(m),
            };
            if denom == 0 {
                return false;
            }
            score as f64 / denom as f64 >= params.threshold
        })
        .copied()
        .collect();

    log::debug!(
        "Neighborhood consensus kept {}/{} correspondences",
        kept.len(),
        correspondences.len()
    );

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 5x5 grid with 10 px spacing
    fn grid() -> Vec<[f64; 2]> {
        let mut pts = Vec::new();
        for j in 0..5 {
            for i in 0..5 {
                pts.push([i as f64 * 10.0, j as f64 * 10.0]);
            }
        }
        pts
    }

    #[test]
    fn test_neighborhood_size_bound() {
        let pts = grid();
        let indices: Vec<usize> = (0..pts.len()).collect();
        for size in [1, 4, 24, 25, 100] {
            let map = NeighborhoodMap::build(&indices, &pts, size, NeighborRanking::Nearest);
            assert_eq!(map.len(), pts.len());
            for (center, neighbors) in map.iter() {
                assert_eq!(neighbors.len(), size.min(pts.len() - 1));
                assert!(!neighbors.contains(&center));
            }
        }
    }

    #[test]
    fn test_neighborhood_restricted_set() {
        let pts = grid();
        // duplicates count once
        let indices = [0, 6, 12, 6, 24];
        let map = NeighborhoodMap::build(&indices, &pts, 25, NeighborRanking::Nearest);
        assert_eq!(map.len(), 4);
        assert_eq!(map.get(0), Some(&[6, 12, 24][..]));
        assert_eq!(map.get(24), Some(&[12, 6, 0][..]));
        assert!(map.get(1).is_none());
        assert!(!map.is_neighbor(1, 0));
    }

    #[test]
    fn test_neighborhood_ranking_direction() {
        let pts = grid();
        let indices: Vec<usize> = (0..pts.len()).collect();

        let nearest = NeighborhoodMap::build(&indices, &pts, 2, NeighborRanking::Nearest);
        assert_eq!(nearest.get(0), Some(&[1, 5][..]));

        let farthest = NeighborhoodMap::build(&indices, &pts, 1, NeighborRanking::Farthest);
        assert_eq!(farthest.get(0), Some(&[24][..]));
        assert_eq!(farthest.get(24), Some(&[0][..]));
    }

    #[test]
    fn test_consensus_keeps_consistent_and_drops_outlier() -> Result<(), MatchingError> {
        let src = grid();
        // target is the source shifted, with one extra far away point
        let mut dst: Vec<[f64; 2]> = src.iter().map(|p| [p[0] + 100.0, p[1] + 50.0]).collect();
        dst.push([1000.0, 1000.0]);

        let mut matches: Vec<Correspondence> = (0..src.len()).map(|i| (i, i).into()).collect();
        // the center source point is paired with the far away target point
        matches[12] = Correspondence::new(12, 25);

        let params = NeighborhoodParams {
            size: 4,
            threshold: 0.5,
            ..Default::default()
        };
        let kept = neighborhood_consensus(&matches, &src, &dst, &params)?;

        assert!(!kept.contains(&Correspondence::new(12, 25)));
        assert!(kept.contains(&Correspondence::new(0, 0)));
        assert!(kept.contains(&Correspondence::new(24, 24)));
        Ok(())
    }

    #[test]
    fn test_consensus_farthest_ranking() -> Result<(), MatchingError> {
        let src = grid();
        let mut dst: Vec<[f64; 2]> = src.iter().map(|p| [p[0] + 100.0, p[1] + 50.0]).collect();
        dst.push([1000.0, 1000.0]);

        let mut matches: Vec<Correspondence> = (0..src.len()).map(|i| (i, i).into()).collect();
        matches[12] = Correspondence::new(12, 25);

        let params = NeighborhoodParams {
            size: 4,
            threshold: 0.5,
            ranking: NeighborRanking::Farthest,
            ..Default::default()
        };

        // the far target point is the farthest neighbor of every target, so an
        // inlier corner keeps 3 of its 4 farthest neighbors
        let scores = consensus_scores(&matches, &src, &dst, &params)?;
        assert_eq!(scores[0], 3);
        assert_eq!(scores[24], 3);
        // the center's farthest sources are the corners, the far target's are near (100, 50)
        assert_eq!(scores[12], 1);

        let kept = neighborhood_consensus(&matches, &src, &dst, &params)?;
        assert!(!kept.contains(&Correspondence::new(12, 25)));
        assert!(kept.contains(&Correspondence::new(0, 0)));
        assert!(kept.contains(&Correspondence::new(24, 24)));
        Ok(())
    }

    #[test]
    fn test_consensus_small_list_configured_vs_actual() -> Result<(), MatchingError> {
        // 3 correspondences: at most 2 neighbors each
        let src = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let dst = [[5.0, 5.0], [15.0, 5.0], [5.0, 15.0]];
        let matches: Vec<Correspondence> = vec![(0, 0).into(), (1, 1).into(), (2, 2).into()];

        let scores = consensus_scores(&matches, &src, &dst, &NeighborhoodParams::default())?;
        assert_eq!(scores, vec![2, 2, 2]);

        // 2 / 25 < 0.1: the configured denominator rejects everything
        let configured = NeighborhoodParams::default();
        assert!(neighborhood_consensus(&matches, &src, &dst, &configured)?.is_empty());

        // 2 / 2 >= 0.1: the actual denominator keeps everything
        let actual = NeighborhoodParams {
            normalization: ConsensusNormalization::Actual,
            ..Default::default()
        };
        assert_eq!(
            neighborhood_consensus(&matches, &src, &dst, &actual)?,
            matches
        );
        Ok(())
    }

    fn assert_scores_do_not_grow(
        matches: &[Correspondence],
        removed: usize,
        src: &[[f64; 2]],
        dst: &[[f64; 2]],
        params: &NeighborhoodParams,
    ) -> Result<(), MatchingError> {
        let full = consensus_scores(matches, src, dst, params)?;
        let mut reduced = matches.to_vec();
        reduced.remove(removed);
        let scores = consensus_scores(&reduced, src, dst, params)?;

        let before = full
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != removed)
            .map(|(_, s)| *s);
        for (after, before) in scores.into_iter().zip(before) {
            assert!(after <= before, "score grew from {before} to {after}");
        }
        Ok(())
    }

    #[test]
    fn test_consensus_monotonicity_untruncated() -> Result<(), MatchingError> {
        let src = grid();
        let dst = grid();
        // targets repeat, so scores differ between correspondences
        let matches: Vec<Correspondence> = (0..src.len())
            .map(|i| Correspondence::new(i, i % 7))
            .collect();
        let params = NeighborhoodParams {
            size: 100,
            ..Default::default()
        };
        for removed in 0..matches.len() {
            assert_scores_do_not_grow(&matches, removed, &src, &dst, &params)?;
        }
        Ok(())
    }

    #[test]
    fn test_consensus_monotonicity_truncated() -> Result<(), MatchingError> {
        let src = grid();
        let dst: Vec<[f64; 2]> = src.iter().map(|p| [p[1] * 2.0, p[0] * 2.0]).collect();
        let mut matches: Vec<Correspondence> = (0..src.len()).map(|i| (i, i).into()).collect();
        // extra pairs whose indices are already present elsewhere in the list
        matches.extend([
            Correspondence::new(3, 8),
            Correspondence::new(8, 3),
            Correspondence::new(12, 12),
        ]);
        let params = NeighborhoodParams {
            size: 6,
            ..Default::default()
        };
        for removed in 25..matches.len() {
            assert_scores_do_not_grow(&matches, removed, &src, &dst, &params)?;
        }
        Ok(())
    }

    #[test]
    fn test_consensus_invalid_input() {
        let src = [[0.0, 0.0]];
        let dst = [[0.0, 0.0]];
        let matches = [Correspondence::new(0, 3)];
        assert!(matches!(
            neighborhood_consensus(&matches, &src, &dst, &NeighborhoodParams::default()),
            Err(MatchingError::IndexOutOfRange { .. })
        ));

        let params = NeighborhoodParams {
            size: 0,
            ..Default::default()
        };
        assert!(matches!(
            neighborhood_consensus(&[], &src, &dst, &params),
            Err(MatchingError::InvalidConfig(_))
        ));
    }
}
