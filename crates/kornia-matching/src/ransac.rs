use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::MatchingError;
use crate::linalg::euclidean_distance;
use crate::solver::fit_minimal_sample;
use crate::transform::{TransformModel, TransformType};
use crate::types::{validate_correspondences, Correspondence};

/// Parameters for RANSAC model estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Number of RANSAC iterations.
    pub iterations: usize,
    /// Inlier threshold as euclidean distance, in keypoint units (pixels).
    pub max_error: f64,
    /// Minimal samples drawn per iteration before the iteration gives up.
    pub max_sample_attempts: usize,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            max_error: 0.01,
            max_sample_attempts: 100,
            random_seed: None,
        }
    }
}

impl RansacParams {
    /// Check that the parameters can be used.
    pub fn validate(&self) -> Result<(), MatchingError> {
        if self.iterations == 0 {
            return Err(MatchingError::InvalidConfig(
                "RANSAC iterations must be > 0".to_string(),
            ));
        }
        if self.max_sample_attempts == 0 {
            return Err(MatchingError::InvalidConfig(
                "RANSAC sample attempts must be > 0".to_string(),
            ));
        }
        if !self.max_error.is_finite() || self.max_error < 0.0 {
            return Err(MatchingError::InvalidConfig(format!(
                "RANSAC max error must be a finite non-negative number, got {}",
                self.max_error
            )));
        }
        Ok(())
    }
}

/// Result of a RANSAC model fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RansacResult {
    /// Best model found.
    pub model: TransformModel,
    /// Number of correspondences within `max_error` under `model`.
    pub inlier_count: usize,
    /// Iteration that produced `model`.
    pub iteration: usize,
}

/// Whether a correspondence agrees with a model.
///
/// The source keypoint is mapped through `model` and compared with the target
/// keypoint; non-finite errors never count as inliers.
///
/// PRECONDITION: the correspondence indexes valid keypoints.
pub fn is_inlier(
    correspondence: &Correspondence,
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
    model: &TransformModel,
    max_error: f64,
) -> bool {
    let projected = model.transform_point(&source_keypoints[correspondence.source]);
    euclidean_distance(&projected, &target_keypoints[correspondence.target]) <= max_error
}

fn count_inliers(
    correspondences: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
    model: &TransformModel,
    max_error: f64,
) -> usize {
    correspondences
        .iter()
        .filter(|c| is_inlier(c, source_keypoints, target_keypoints, model, max_error))
        .count()
}

/// Shared, read-only inputs of every RANSAC iteration.
struct RansacProblem<'a> {
    correspondences: &'a [Correspondence],
    source_keypoints: &'a [[f64; 2]],
    target_keypoints: &'a [[f64; 2]],
    transform_type: TransformType,
    params: &'a RansacParams,
}

impl RansacProblem<'_> {
    /// Sample until a non-degenerate model is found, then score it.
    ///
    /// Returns `None` once `max_sample_attempts` samples were degenerate.
    fn run_iteration(&self, seed: u64) -> Option<(TransformModel, usize)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = self.correspondences.len();
        let k = self.transform_type.sample_size();
        let mut sample = Vec::with_capacity(k);

        for _ in 0..self.params.max_sample_attempts {
            sample.clear();
            sample.extend(
                rand::seq::index::sample(&mut rng, n, k)
                    .iter()
                    .map(|idx| self.correspondences[idx]),
            );

            let model = match fit_minimal_sample(
                self.transform_type,
                &sample,
                self.source_keypoints,
                self.target_keypoints,
            ) {
                Ok(model) => model,
                Err(_) => continue,
            };

            let score = count_inliers(
                self.correspondences,
                self.source_keypoints,
                self.target_keypoints,
                &model,
                self.params.max_error,
            );
            return Some((model, score));
        }

        None
    }

    #[cfg(not(feature = "rayon"))]
    fn run(&self, seeds: &[u64]) -> Vec<Option<(TransformModel, usize)>> {
        seeds.iter().map(|&seed| self.run_iteration(seed)).collect()
    }

    #[cfg(feature = "rayon")]
    fn run(&self, seeds: &[u64]) -> Vec<Option<(TransformModel, usize)>> {
        use rayon::prelude::*;
        seeds
            .par_iter()
            .map(|&seed| self.run_iteration(seed))
            .collect()
    }
}

/// One seed per iteration, drawn from the run's master RNG so serial and
/// parallel runs agree.
fn iteration_seeds(params: &RansacParams) -> Vec<u64> {
    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };
    (0..params.iterations).map(|_| rng.random()).collect()
}

/// Find the transform that agrees with the most correspondences.
///
/// Every iteration draws minimal samples of distinct correspondences until the
/// solver returns a non-degenerate model, then counts the correspondences within
/// `max_error` of it. Iterations that exhaust `max_sample_attempts` are skipped. The
/// best scoring model wins; on ties the earliest iteration is kept.
///
/// # Arguments
///
/// * `correspondences` - The candidate correspondences.
/// * `source_keypoints` - Keypoints of the first image.
/// * `target_keypoints` - Keypoints of the second image.
/// * `transform_type` - The model family to fit.
/// * `params` - Iterations, inlier threshold, attempt cap and seed.
///
/// # Returns
///
/// The best model and its inlier count, or [`MatchingError::FitFailure`] if no
/// iteration produced a model.
pub fn calculate_best_transform(
    correspondences: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
    transform_type: TransformType,
    params: &RansacParams,
) -> Result<RansacResult, MatchingError> {
    params.validate()?;
    validate_correspondences(
        correspondences,
        source_keypoints.len(),
        target_keypoints.len(),
    )?;

    let required = transform_type.sample_size();
    if correspondences.len() < required {
        return Err(MatchingError::InsufficientCorrespondences {
            stage: "ransac",
            required,
            actual: correspondences.len(),
        });
    }

    let seeds = iteration_seeds(params);

    let problem = RansacProblem {
        correspondences,
        source_keypoints,
        target_keypoints,
        transform_type,
        params,
    };
    let outcomes = problem.run(&seeds);

    let mut best: Option<RansacResult> = None;
    let mut failed = 0usize;
    for (iteration, outcome) in outcomes.into_iter().enumerate() {
        let Some((model, inlier_count)) = outcome else {
            failed += 1;
            continue;
        };
        if best.map_or(true, |b| inlier_count > b.inlier_count) {
            log::trace!("RANSAC iteration {iteration}: {inlier_count} inliers");
            best = Some(RansacResult {
                model,
                inlier_count,
                iteration,
            });
        }
    }

    if failed > 0 {
        log::warn!(
            "{failed}/{} RANSAC iterations found no non-degenerate sample in {} attempts",
            params.iterations,
            params.max_sample_attempts
        );
    }

    let best = best.ok_or(MatchingError::FitFailure {
        iterations: params.iterations,
        attempts: params.max_sample_attempts,
    })?;

    log::debug!(
        "RANSAC {:?}: {}/{} inliers (iteration {})",
        transform_type,
        best.inlier_count,
        correspondences.len(),
        best.iteration
    );

    Ok(best)
}

/// Keep the correspondences that agree with a model.
///
/// # Arguments
///
/// * `correspondences` - The correspondences to filter.
/// * `source_keypoints` - Keypoints of the first image.
/// * `target_keypoints` - Keypoints of the second image.
/// * `model` - Typically the model returned by [`calculate_best_transform`].
/// * `max_error` - Inlier threshold, as used to score the model.
///
/// # Returns
///
/// The inlier correspondences, in input order.
pub fn filter_ransac(
    correspondences: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
    model: &TransformModel,
    max_error: f64,
) -> Result<Vec<Correspondence>, MatchingError> {
    validate_correspondences(
        correspondences,
        source_keypoints.len(),
        target_keypoints.len(),
    )?;

    Ok(correspondences
        .iter()
        .filter(|c| is_inlier(c, source_keypoints, target_keypoints, model, max_error))
        .copied()
        .collect())
}
