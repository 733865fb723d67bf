#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the verification stages.
pub mod error;

/// Small numerical helpers shared by the solvers.
pub mod linalg;

/// Mutual nearest neighbor filtering.
pub mod mutual;

/// Neighborhood consensus filtering.
pub mod neighborhood;

/// End-to-end verification of descriptor matches.
pub mod pipeline;

/// Robust model estimation with RANSAC.
pub mod ransac;

/// Minimal-sample affine and perspective solvers.
pub mod solver;

/// 2D transform models.
pub mod transform;

/// Correspondence types.
pub mod types;

pub use error::{ImageSide, MatchingError};
pub use linalg::euclidean_distance;
pub use mutual::mutual_matches;
pub use neighborhood::{
    consensus_scores, neighborhood_consensus, ConsensusNormalization, NeighborRanking,
    NeighborhoodMap, NeighborhoodParams,
};
pub use pipeline::{estimate_both, verify_matches, TransformEstimates, VerificationReport, VerifyConfig};
pub use ransac::{calculate_best_transform, filter_ransac, is_inlier, RansacParams, RansacResult};
pub use solver::fit_minimal_sample;
pub use transform::{TransformModel, TransformType};
pub use types::Correspondence;
