use serde::{Deserialize, Serialize};

/// Family of 2d transforms the estimator can fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransformType {
    /// 6 DOF affine transform, fitted from 3 correspondences.
    #[default]
    Affine,
    /// 8 DOF homography, fitted from 4 correspondences.
    Perspective,
}

impl TransformType {
    /// Number of correspondences in a minimal sample.
    pub fn sample_size(&self) -> usize {
        match self {
            TransformType::Affine => 3,
            TransformType::Perspective => 4,
        }
    }

    /// Number of free parameters of the model.
    pub fn num_params(&self) -> usize {
        2 * self.sample_size()
    }
}

/// A fitted 2d transform mapping points of the first image onto the second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TransformModel {
    /// `(x, y) -> (a * x + b * y + c, d * x + e * y + f)`.
    Affine {
        /// x scale / shear term of the x output.
        a: f64,
        /// y term of the x output.
        b: f64,
        /// x translation.
        c: f64,
        /// x term of the y output.
        d: f64,
        /// y scale / shear term of the y output.
        e: f64,
        /// y translation.
        f: f64,
    },
    /// Homography in row-major order with the last element fixed to 1.
    Perspective {
        /// `[h0, .., h7]` of `[[h0, h1, h2], [h3, h4, h5], [h6, h7, 1]]`.
        h: [f64; 8],
    },
}

impl TransformModel {
    /// The identity affine transform.
    pub fn identity_affine() -> Self {
        TransformModel::Affine {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 1.0,
            f: 0.0,
        }
    }

    /// Build a model from a row-major 2x3 affine matrix.
    pub fn from_affine_mat23(m: &[[f64; 3]; 2]) -> Self {
        TransformModel::Affine {
            a: m[0][0],
            b: m[0][1],
            c: m[0][2],
            d: m[1][0],
            e: m[1][1],
            f: m[1][2],
        }
    }

    /// Build a perspective model from a row-major 3x3 homography.
    ///
    /// The matrix is scaled so that its bottom-right element is 1. Returns `None`
    /// when that element is zero or the matrix is not finite.
    pub fn from_homography(m: &[[f64; 3]; 3]) -> Option<Self> {
        let s = m[2][2];
        if s == 0.0 || !m.iter().flatten().all(|v| v.is_finite()) {
            return None;
        }
        Some(TransformModel::Perspective {
            h: [
                m[0][0] / s,
                m[0][1] / s,
                m[0][2] / s,
                m[1][0] / s,
                m[1][1] / s,
                m[1][2] / s,
                m[2][0] / s,
                m[2][1] / s,
            ],
        })
    }

    /// The family this model belongs to.
    pub fn transform_type(&self) -> TransformType {
        match self {
            TransformModel::Affine { .. } => TransformType::Affine,
            TransformModel::Perspective { .. } => TransformType::Perspective,
        }
    }

    /// Map a point of the first image into the second image.
    ///
    /// Perspective points on the line at infinity map to non-finite coordinates.
    pub fn transform_point(&self, p: &[f64; 2]) -> [f64; 2] {
        let (x, y) = (p[0], p[1]);
        match *self {
            TransformModel::Affine { a, b, c, d, e, f } => {
                [a * x + b * y + c, d * x + e * y + f]
            }
            TransformModel::Perspective { h } => {
                let w = h[6] * x + h[7] * y + 1.0;
                [
                    (h[0] * x + h[1] * y + h[2]) / w,
                    (h[3] * x + h[4] * y + h[5]) / w,
                ]
            }
        }
    }

    /// Map a set of points into the second image.
    ///
    /// PRECONDITION: `dst` has the same length as `src`.
    pub fn transform_points(&self, src: &[[f64; 2]], dst: &mut [[f64; 2]]) {
        assert_eq!(src.len(), dst.len());
        for (s, d) in src.iter().zip(dst.iter_mut()) {
            *d = self.transform_point(s);
        }
    }

    /// The model as a row-major 3x3 matrix in homogeneous coordinates.
    pub fn to_mat33(&self) -> [[f64; 3]; 3] {
        match *self {
            TransformModel::Affine { a, b, c, d, e, f } => {
                [[a, b, c], [d, e, f], [0.0, 0.0, 1.0]]
            }
            TransformModel::Perspective { h } => [
                [h[0], h[1], h[2]],
                [h[3], h[4], h[5]],
                [h[6], h[7], 1.0],
            ],
        }
    }
}
