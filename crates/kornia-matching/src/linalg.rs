use faer::prelude::SpSolver;

use crate::error::MatchingError;

/// Below this Hadamard ratio a design matrix is treated as singular.
///
/// The ratio `|det(A)| / prod(||row_i||)` lies in `[0, 1]` and is computed after the
/// columns of `A` are scaled to unit max-abs, so it does not depend on the pixel
/// scale of the keypoints.
pub const DEGENERACY_TOLERANCE: f64 = 1e-10;

/// Euclidean distance between two 2d points.
///
/// NaN and infinite coordinates propagate to the result.
///
/// Example:
///
/// ```
/// use kornia_matching::euclidean_distance;
///
/// let d = euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]);
/// assert_eq!(d, 5.0);
/// ```
pub fn euclidean_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// Points moved by a similarity so their centroid is the origin and their mean
/// distance to it is `sqrt(2)`.
pub(crate) struct NormalizedPoints<const N: usize> {
    pub(crate) points: [[f64; 2]; N],
    /// `T` mapping original to normalized coordinates, 3x3.
    pub(crate) transform: faer::Mat<f64>,
    /// `T^-1`, 3x3.
    pub(crate) inverse: faer::Mat<f64>,
}

/// Hartley normalization of a set of 2d points.
pub(crate) fn normalize_points_2d<const N: usize>(x: &[[f64; 2]; N]) -> NormalizedPoints<N> {
    let n = N as f64;
    let (mut mx, mut my) = (0.0, 0.0);
    for p in x {
        mx += p[0];
        my += p[1];
    }
    mx /= n;
    my /= n;

    let mean_dist = x
        .iter()
        .map(|p| euclidean_distance(p, &[mx, my]))
        .sum::<f64>()
        / n;
    let scale = if mean_dist > 0.0 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let mut points = [[0.0; 2]; N];
    for (dst, p) in points.iter_mut().zip(x.iter()) {
        *dst = [(p[0] - mx) * scale, (p[1] - my) * scale];
    }

    NormalizedPoints {
        points,
        transform: faer::mat![
            [scale, 0.0, -scale * mx],
            [0.0, scale, -scale * my],
            [0.0, 0.0, 1.0],
        ],
        inverse: faer::mat![
            [1.0 / scale, 0.0, mx],
            [0.0, 1.0 / scale, my],
            [0.0, 0.0, 1.0],
        ],
    }
}

/// Undo the normalization of a 3x3 map fitted between normalized point sets:
/// `M = T2^-1 * Mn * T1`.
pub(crate) fn denormalize_mat33(
    mat_n: faer::Mat<f64>,
    t1: faer::Mat<f64>,
    t2_inv: faer::Mat<f64>,
) -> [[f64; 3]; 3] {
    let m = t2_inv * mat_n * t1;
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = m.read(i, j);
        }
    }
    out
}

/// Per-column max-abs scale factors, or `None` if a column is zero or non-finite.
fn column_scales(a: &faer::Mat<f64>) -> Option<Vec<f64>> {
    let mut scales = Vec::with_capacity(a.ncols());
    for j in 0..a.ncols() {
        let mut max_abs = 0.0f64;
        for i in 0..a.nrows() {
            let v = a.read(i, j);
            if !v.is_finite() {
                return None;
            }
            max_abs = max_abs.max(v.abs());
        }
        if max_abs == 0.0 {
            return None;
        }
        scales.push(max_abs);
    }
    Some(scales)
}

fn equilibrate(a: &faer::Mat<f64>, scales: &[f64]) -> faer::Mat<f64> {
    let mut scaled = faer::Mat::<f64>::zeros(a.nrows(), a.ncols());
    for i in 0..a.nrows() {
        for (j, s) in scales.iter().enumerate() {
            scaled.write(i, j, a.read(i, j) / s);
        }
    }
    scaled
}

fn hadamard_ratio(scaled: &faer::Mat<f64>) -> f64 {
    let mut row_norms = 1.0;
    for i in 0..scaled.nrows() {
        let mut sq = 0.0;
        for j in 0..scaled.ncols() {
            let v = scaled.read(i, j);
            sq += v * v;
        }
        row_norms *= sq.sqrt();
    }
    if row_norms == 0.0 {
        return 0.0;
    }
    scaled.determinant().abs() / row_norms
}

/// Scale-free singularity measure of a square matrix.
///
/// Returns the Hadamard ratio of the column-equilibrated matrix, in `[0, 1]`.
/// Zero or non-finite columns give `0.0`.
pub fn degeneracy_ratio(a: &faer::Mat<f64>) -> f64 {
    debug_assert_eq!(a.nrows(), a.ncols());
    match column_scales(a) {
        Some(scales) => hadamard_ratio(&equilibrate(a, &scales)),
        None => 0.0,
    }
}

/// Solve the square linear system `A x = b` exactly using a partial-pivot LU.
///
/// # Arguments
///
/// * `a` - The square design matrix with shape (n, n).
/// * `b` - The right hand side with shape (n, 1).
///
/// # Returns
///
/// The solution with shape (n, 1), or [`MatchingError::DegenerateSample`] when
/// `A` is singular within [`DEGENERACY_TOLERANCE`].
pub fn solve_square_system(
    a: &faer::Mat<f64>,
    b: &faer::Mat<f64>,
) -> Result<faer::Mat<f64>, MatchingError> {
    debug_assert_eq!(a.nrows(), a.ncols());
    debug_assert_eq!(a.nrows(), b.nrows());

    let scales = column_scales(a).ok_or(MatchingError::DegenerateSample)?;
    let scaled = equilibrate(a, &scales);

    let ratio = hadamard_ratio(&scaled);
    if ratio.is_nan() || ratio < DEGENERACY_TOLERANCE {
        return Err(MatchingError::DegenerateSample);
    }

    // solve the scaled system and undo the column scaling: x_j = y_j / s_j
    let y = scaled.partial_piv_lu().solve(b.as_ref());
    let mut x = faer::Mat::<f64>::zeros(a.ncols(), 1);
    for (j, s) in scales.iter().enumerate() {
        let v = y.read(j, 0) / s;
        if !v.is_finite() {
            return Err(MatchingError::DegenerateSample);
        }
        x.write(j, 0, v);
    }

    Ok(x)
}
