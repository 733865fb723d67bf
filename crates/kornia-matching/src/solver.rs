use crate::error::MatchingError;
use crate::linalg::{
    degeneracy_ratio, denormalize_mat33, normalize_points_2d, solve_square_system,
    DEGENERACY_TOLERANCE,
};
use crate::transform::{TransformModel, TransformType};
use crate::types::Correspondence;

/// Compute the affine transform from three 2d point correspondences.
///
/// Both point sets are normalized first (centroid at the origin, mean distance
/// `sqrt(2)`), so the verdict on degeneracy does not depend on where the points sit
/// in the image. The 6x6 design matrix is block diagonal: rows 0..3 hold
/// `[x, y, 1, 0, 0, 0]` for the x output, rows 3..6 hold `[0, 0, 0, x, y, 1]` for
/// the y output.
///
/// * `x1` - The source points with shape (3, 2).
/// * `x2` - The destination points with shape (3, 2).
///
/// # Returns
///
/// The affine model, or [`MatchingError::DegenerateSample`] when the source
/// points are collinear.
pub fn affine_3pt2d(x1: &[[f64; 2]; 3], x2: &[[f64; 2]; 3]) -> Result<TransformModel, MatchingError> {
    let n1 = normalize_points_2d(x1);
    let n2 = normalize_points_2d(x2);

    // construct matrix A and b
    let mut mat_a = faer::Mat::<f64>::zeros(6, 6);
    let mut mat_b = faer::Mat::<f64>::zeros(6, 1);

    for i in 0..3 {
        let (x, y) = (n1.points[i][0], n1.points[i][1]);
        mat_a.write(i, 0, x);
        mat_a.write(i, 1, y);
        mat_a.write(i, 2, 1.0);
        mat_a.write(i + 3, 3, x);
        mat_a.write(i + 3, 4, y);
        mat_a.write(i + 3, 5, 1.0);
        mat_b.write(i, 0, n2.points[i][0]);
        mat_b.write(i + 3, 0, n2.points[i][1]);
    }

    let p = solve_square_system(&mat_a, &mat_b)?;

    let affine_n = faer::mat![
        [p.read(0, 0), p.read(1, 0), p.read(2, 0)],
        [p.read(3, 0), p.read(4, 0), p.read(5, 0)],
        [0.0, 0.0, 1.0],
    ];
    let m = denormalize_mat33(affine_n, n1.transform, n2.inverse);
    if !m.iter().flatten().all(|v| v.is_finite()) {
        return Err(MatchingError::DegenerateSample);
    }

    Ok(TransformModel::from_affine_mat23(&[m[0], m[1]]))
}

/// Compute the homography from four 2d point correspondences.
///
/// Direct linear transform on normalized points with the last element fixed to 1.
/// Rows 0..4 hold the x' equations `[x, y, 1, 0, 0, 0, -x'x, -x'y]` and rows 4..8
/// the y' equations `[0, 0, 0, x, y, 1, -y'x, -y'y]`.
///
/// * `x1` - The source points with shape (4, 2).
/// * `x2` - The destination points with shape (4, 2).
///
/// # Returns
///
/// The perspective model, or [`MatchingError::DegenerateSample`] when three of the
/// points are collinear or the system is otherwise singular.
pub fn homography_4pt2d(
    x1: &[[f64; 2]; 4],
    x2: &[[f64; 2]; 4],
) -> Result<TransformModel, MatchingError> {
    let n1 = normalize_points_2d(x1);
    let n2 = normalize_points_2d(x2);

    // construct matrix A and b
    let mut mat_a = faer::Mat::<f64>::zeros(8, 8);
    let mut mat_b = faer::Mat::<f64>::zeros(8, 1);

    for i in 0..4 {
        let (x, y) = (n1.points[i][0], n1.points[i][1]);
        let (xp, yp) = (n2.points[i][0], n2.points[i][1]);

        mat_a.write(i, 0, x);
        mat_a.write(i, 1, y);
        mat_a.write(i, 2, 1.0);
        mat_a.write(i, 6, -xp * x);
        mat_a.write(i, 7, -xp * y);

        mat_a.write(i + 4, 3, x);
        mat_a.write(i + 4, 4, y);
        mat_a.write(i + 4, 5, 1.0);
        mat_a.write(i + 4, 6, -yp * x);
        mat_a.write(i + 4, 7, -yp * y);

        mat_b.write(i, 0, xp);
        mat_b.write(i + 4, 0, yp);
    }

    let h = solve_square_system(&mat_a, &mat_b)?;

    // three collinear source points can still give a solvable system whose
    // homography is rank deficient
    let homo_n = faer::mat![
        [h.read(0, 0), h.read(1, 0), h.read(2, 0)],
        [h.read(3, 0), h.read(4, 0), h.read(5, 0)],
        [h.read(6, 0), h.read(7, 0), 1.0],
    ];
    if degeneracy_ratio(&homo_n) < DEGENERACY_TOLERANCE {
        return Err(MatchingError::DegenerateSample);
    }

    let m = denormalize_mat33(homo_n, n1.transform, n2.inverse);
    TransformModel::from_homography(&m).ok_or(MatchingError::DegenerateSample)
}

/// Gather the keypoint coordinates of a sample into fixed-size arrays.
fn gather<const N: usize>(
    sample: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
) -> ([[f64; 2]; N], [[f64; 2]; N]) {
    let mut x1 = [[0.0; 2]; N];
    let mut x2 = [[0.0; 2]; N];
    for (i, c) in sample.iter().enumerate() {
        x1[i] = source_keypoints[c.source];
        x2[i] = target_keypoints[c.target];
    }
    (x1, x2)
}

/// Fit an affine model to three correspondences.
///
/// PRECONDITION: the correspondences index valid keypoints.
pub fn solve_affine(
    sample: &[Correspondence; 3],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
) -> Result<TransformModel, MatchingError> {
    let (x1, x2) = gather::<3>(sample, source_keypoints, target_keypoints);
    affine_3pt2d(&x1, &x2)
}

/// Fit a perspective model to four correspondences.
///
/// PRECONDITION: the correspondences index valid keypoints.
pub fn solve_perspective(
    sample: &[Correspondence; 4],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
) -> Result<TransformModel, MatchingError> {
    let (x1, x2) = gather::<4>(sample, source_keypoints, target_keypoints);
    homography_4pt2d(&x1, &x2)
}

/// Fit a model of the requested family to a minimal sample.
///
/// # Arguments
///
/// * `transform_type` - The model family to fit.
/// * `sample` - Exactly [`TransformType::sample_size`] correspondences.
/// * `source_keypoints` - Keypoints of the first image.
/// * `target_keypoints` - Keypoints of the second image.
///
/// PRECONDITION: the correspondences index valid keypoints.
pub fn fit_minimal_sample(
    transform_type: TransformType,
    sample: &[Correspondence],
    source_keypoints: &[[f64; 2]],
    target_keypoints: &[[f64; 2]],
) -> Result<TransformModel, MatchingError> {
    let insufficient = || MatchingError::InsufficientCorrespondences {
        stage: "minimal sample",
        required: transform_type.sample_size(),
        actual: sample.len(),
    };

    match transform_type {
        TransformType::Affine => {
            let sample = sample.try_into().map_err(|_| insufficient())?;
            solve_affine(sample, source_keypoints, target_keypoints)
        }
        TransformType::Perspective => {
            let sample = sample.try_into().map_err(|_| insufficient())?;
            solve_perspective(sample, source_keypoints, target_keypoints)
        }
    }
}
