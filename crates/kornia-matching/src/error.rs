use thiserror::Error;

/// Which keypoint set an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSide {
    /// The first image (source side of a correspondence).
    Source,
    /// The second image (target side of a correspondence).
    Target,
}

impl std::fmt::Display for ImageSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSide::Source => write!(f, "source"),
            ImageSide::Target => write!(f, "target"),
        }
    }
}

/// Errors returned by the match verification stages.
#[derive(Debug, Error, PartialEq)]
pub enum MatchingError {
    /// The correspondence list is smaller than the stage needs.
    #[error("{stage} requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Name of the stage that rejected the input.
        stage: &'static str,
        /// Minimum number of correspondences required.
        required: usize,
        /// Number of correspondences provided.
        actual: usize,
    },

    /// A correspondence references a keypoint that does not exist.
    #[error("{side} keypoint index {index} is out of range for {len} keypoints")]
    IndexOutOfRange {
        /// Keypoint set the index refers to.
        side: ImageSide,
        /// Offending index.
        index: usize,
        /// Number of keypoints on that side.
        len: usize,
    },

    /// A parameter struct holds values that cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The minimal sample produced a singular linear system.
    #[error("Degenerate sample: the linear system is singular")]
    DegenerateSample,

    /// No RANSAC iteration managed to draw a non-degenerate sample.
    #[error("RANSAC could not fit a model: {iterations} iterations exhausted {attempts} attempts each")]
    FitFailure {
        /// Number of iterations run.
        iterations: usize,
        /// Sample attempts allowed per iteration.
        attempts: usize,
    },
}
