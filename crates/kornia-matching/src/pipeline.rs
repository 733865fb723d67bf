use serde::{Deserialize, Serialize};

use crate::error::MatchingError;
use crate::mutual::mutual_matches;
use crate::neighborhood::{neighborhood_consensus, NeighborhoodParams};
use crate::ransac::{calculate_best_transform, filter_ransac, RansacParams, RansacResult};
use crate::transform::TransformType;
use crate::types::{validate_correspondences, Correspondence};

/// Configuration of the full verification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Neighborhood consensus settings.
    pub neighborhood: NeighborhoodParams,
    /// RANSAC settings.
    pub ransac: RansacParams,
    /// Model family fitted by RANSAC.
    pub transform_type: TransformType,
}

impl VerifyConfig {
    /// Check that every stage's parameters can be used.
    pub fn validate(&self) -> Result<(), MatchingError> {
        self.neighborhood.validate()?;
        self.ransac.validate()
    }
}

/// Output of every stage of [`verify_matches`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Matches confirmed in both directions.
    pub mutual: Vec<Correspondence>,
    /// Mutual matches that passed the neighborhood consensus filter.
    pub consensus: Vec<Correspondence>,
    /// The best model found on the consensus matches.
    pub ransac: RansacResult,
    /// Consensus matches that agree with the best model.
    pub inliers: Vec<Correspondence>,
}

impl VerificationReport {
    /// Fraction of mutual matches that survived geometric verification.
    ///
    /// Returns `0.0` when there are no mutual matches.
    pub fn inlier_ratio(&self) -> f64 {
        if self.mutual.is_empty() {
            return 0.0;
        }
        self.inliers.len() as f64 / self.mutual.len() as f64
    }
}

/// Verify one-directional descriptor matches between two images.
///
/// Runs the mutual filter, the neighborhood consensus filter, RANSAC model fitting
/// and the final inlier selection.
///
/// # Arguments
///
/// * `keypoints_a` - Keypoints of the first image.
/// * `keypoints_b` - Keypoints of the second image.
/// * `matches_a_to_b` - Best match in B of keypoints of A, as `(index_a, index_b)`.
/// * `matches_b_to_a` - Best match in A of keypoints of B, as `(index_b, index_a)`.
/// * `config` - Settings of every stage.
///
/// # Returns
///
/// The correspondences kept by every stage and the selected model. A stage that
/// receives fewer correspondences than it needs fails with
/// [`MatchingError::InsufficientCorrespondences`].
///
/// Example:
///
/// ```
/// use kornia_matching::{verify_matches, Correspondence, MatchingError, VerifyConfig};
///
/// let keypoints_a: Vec<[f64; 2]> = (0..36)
///     .map(|i| [(i % 6) as f64 * 20.0 + (i / 6) as f64, (i / 6) as f64 * 15.0])
///     .collect();
/// let keypoints_b: Vec<[f64; 2]> = keypoints_a.iter().map(|p| [p[0] + 5.0, p[1] - 3.0]).collect();
/// let a_to_b: Vec<Correspondence> = (0..36).map(|i| (i, i).into()).collect();
/// let b_to_a: Vec<Correspondence> = (0..36).map(|i| (i, i).into()).collect();
///
/// let report = verify_matches(&keypoints_a, &keypoints_b, &a_to_b, &b_to_a, &VerifyConfig::default())?;
/// assert_eq!(report.inliers.len(), 36);
/// # Ok::<(), MatchingError>(())
/// ```
pub fn verify_matches(
    keypoints_a: &[[f64; 2]],
    keypoints_b: &[[f64; 2]],
    matches_a_to_b: &[Correspondence],
    matches_b_to_a: &[Correspondence],
    config: &VerifyConfig,
) -> Result<VerificationReport, MatchingError> {
    config.validate()?;
    validate_correspondences(matches_a_to_b, keypoints_a.len(), keypoints_b.len())?;
    validate_correspondences(matches_b_to_a, keypoints_b.len(), keypoints_a.len())?;

    let mutual = mutual_matches(matches_a_to_b, matches_b_to_a);
    log::debug!(
        "Mutual filter kept {}/{} matches",
        mutual.len(),
        matches_a_to_b.len()
    );

    let consensus =
        neighborhood_consensus(&mutual, keypoints_a, keypoints_b, &config.neighborhood)?;

    let ransac = calculate_best_transform(
        &consensus,
        keypoints_a,
        keypoints_b,
        config.transform_type,
        &config.ransac,
    )?;

    let inliers = filter_ransac(
        &consensus,
        keypoints_a,
        keypoints_b,
        &ransac.model,
        config.ransac.max_error,
    )?;
    log::debug!(
        "Geometric verification kept {}/{} matches",
        inliers.len(),
        consensus.len()
    );

    Ok(VerificationReport {
        mutual,
        consensus,
        ransac,
        inliers,
    })
}

/// Best affine and perspective models fitted on the same correspondences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformEstimates {
    /// Best affine model.
    pub affine: RansacResult,
    /// Best perspective model.
    pub perspective: RansacResult,
}

impl TransformEstimates {
    /// The estimate of the requested family.
    pub fn get(&self, transform_type: TransformType) -> &RansacResult {
        match transform_type {
            TransformType::Affine => &self.affine,
            TransformType::Perspective => &self.perspective,
        }
    }
}

/// Fit both an affine and a perspective model with the same RANSAC settings.
///
/// Needs at least 4 correspondences, the perspective minimal sample.
pub fn estimate_both(
    correspondences: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
    params: &RansacParams,
) -> Result<TransformEstimates, MatchingError> {
    let affine = calculate_best_transform(
        correspondences,
        source_keypoints,
        target_keypoints,
        TransformType::Affine,
        params,
    )?;
    let perspective = calculate_best_transform(
        correspondences,
        source_keypoints,
        target_keypoints,
        TransformType::Perspective,
        params,
    )?;
    Ok(TransformEstimates {
        affine,
        perspective,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighborhood::NeighborRanking;
    use crate::transform::TransformModel;

    fn grid(n: usize, spacing: f64) -> Vec<[f64; 2]> {
        (0..n * n)
            .map(|i| [(i % n) as f64 * spacing, (i / n) as f64 * spacing])
            .collect()
    }

    #[test]
    fn test_verify_config_deserialize_partial() -> Result<(), serde_json::Error> {
        let config: VerifyConfig = serde_json::from_str(
            r#"{ "neighborhood": { "ranking": "Farthest" }, "ransac": { "max_error": 0.5 } }"#,
        )?;
        assert_eq!(config.neighborhood.ranking, NeighborRanking::Farthest);
        assert_eq!(config.neighborhood.size, 25);
        assert_eq!(config.ransac.max_error, 0.5);
        assert_eq!(config.ransac.iterations, 100);
        assert_eq!(config.transform_type, TransformType::Affine);
        Ok(())
    }

    #[test]
    fn test_verify_matches_drops_one_sided_and_outliers() -> Result<(), MatchingError> {
        let keypoints_a = grid(6, 20.0);
        let model = TransformModel::from_affine_mat23(&[[1.1, 0.1, 40.0], [-0.1, 0.95, 25.0]]);
        let mut keypoints_b = vec![[0.0; 2]; keypoints_a.len()];
        model.transform_points(&keypoints_a, &mut keypoints_b);
        // a wrong partner for keypoint 7
        keypoints_b.push([500.0, -300.0]);

        let mut a_to_b: Vec<Correspondence> = (0..36).map(|i| (i, i).into()).collect();
        let mut b_to_a: Vec<Correspondence> = (0..36).map(|i| (i, i).into()).collect();
        a_to_b[7] = Correspondence::new(7, 36);
        b_to_a.push(Correspondence::new(36, 7));
        // not confirmed from B
        b_to_a[3] = Correspondence::new(3, 4);

        let config = VerifyConfig {
            ransac: RansacParams {
                max_error: 1e-6,
                random_seed: Some(11),
                ..Default::default()
            },
            ..Default::default()
        };
        let report = verify_matches(&keypoints_a, &keypoints_b, &a_to_b, &b_to_a, &config)?;

        assert_eq!(report.mutual.len(), 35);
        assert!(!report.mutual.contains(&Correspondence::new(3, 3)));
        assert!(report.mutual.contains(&Correspondence::new(7, 36)));
        assert!(!report.inliers.contains(&Correspondence::new(7, 36)));
        assert_eq!(report.inliers.len(), 34);
        assert_eq!(report.ransac.model.transform_type(), TransformType::Affine);
        assert!((report.inlier_ratio() - 34.0 / 35.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_verify_matches_starved_stage() {
        let keypoints = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let matches: Vec<Correspondence> = (0..3).map(|i| (i, i).into()).collect();
        // 2 / 25 < 0.1 with the configured denominator, consensus keeps nothing
        let res = verify_matches(
            &keypoints,
            &keypoints,
            &matches,
            &matches,
            &VerifyConfig::default(),
        );
        assert_eq!(
            res,
            Err(MatchingError::InsufficientCorrespondences {
                stage: "ransac",
                required: 3,
                actual: 0,
            })
        );
    }

    #[test]
    fn test_verify_matches_invalid_backward_index() {
        let keypoints_a = grid(2, 10.0);
        let keypoints_b = grid(3, 10.0);
        let a_to_b = [Correspondence::new(0, 8)];
        // index 8 exists in B but not in A
        let b_to_a = [Correspondence::new(0, 8)];
        let res = verify_matches(
            &keypoints_a,
            &keypoints_b,
            &a_to_b,
            &b_to_a,
            &VerifyConfig::default(),
        );
        assert!(matches!(res, Err(MatchingError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_estimate_both() -> Result<(), MatchingError> {
        let src = grid(4, 30.0);
        let dst: Vec<[f64; 2]> = src.iter().map(|p| [p[0] * 0.5 + 3.0, p[1] * 0.5 - 1.0]).collect();
        let matches: Vec<Correspondence> = (0..src.len()).map(|i| (i, i).into()).collect();
        let params = RansacParams {
            iterations: 30,
            max_error: 1e-6,
            random_seed: Some(5),
            ..Default::default()
        };
        let both = estimate_both(&matches, &src, &dst, &params)?;
        assert_eq!(both.affine.inlier_count, 16);
        assert_eq!(both.get(TransformType::Perspective).inlier_count, 16);
        assert_eq!(both.get(TransformType::Affine), &both.affine);
        Ok(())
    }
}
