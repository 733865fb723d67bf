use serde::{Deserialize, Serialize};

use crate::error::{ImageSide, MatchingError};

/// A candidate pairing between a keypoint in the first image and one in the second.
///
/// Equality is by index pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Correspondence {
    /// Index into the first image's keypoints.
    pub source: usize,
    /// Index into the second image's keypoints.
    pub target: usize,
}

impl Correspondence {
    /// Create a new correspondence from a source and a target index.
    pub fn new(source: usize, target: usize) -> Self {
        Self { source, target }
    }

    /// The same pairing seen from the other image.
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target,
            target: self.source,
        }
    }
}

impl From<(usize, usize)> for Correspondence {
    fn from((source, target): (usize, usize)) -> Self {
        Self { source, target }
    }
}

impl From<Correspondence> for (usize, usize) {
    fn from(c: Correspondence) -> Self {
        (c.source, c.target)
    }
}

/// Check that every correspondence indexes valid keypoints on both sides.
///
/// # Arguments
///
/// * `correspondences` - The correspondences to check.
/// * `num_source` - Number of keypoints in the first image.
/// * `num_target` - Number of keypoints in the second image.
///
/// # Returns
///
/// The first out-of-range index found, as [`MatchingError::IndexOutOfRange`].
pub fn validate_correspondences(
    correspondences: &[Correspondence],
    num_source: usize,
    num_target: usize,
) -> Result<(), MatchingError> {
    for c in correspondences {
        if c.source >= num_source {
            return Err(MatchingError::IndexOutOfRange {
                side: ImageSide::Source,
                index: c.source,
                len: num_source,
            });
        }
        if c.target >= num_target {
            return Err(MatchingError::IndexOutOfRange {
                side: ImageSide::Target,
                index: c.target,
                len: num_target,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correspondence_from_tuple() {
        let c: Correspondence = (3, 7).into();
        assert_eq!(c, Correspondence::new(3, 7));
        assert_eq!(c.reversed(), Correspondence::new(7, 3));
        let t: (usize, usize) = c.into();
        assert_eq!(t, (3, 7));
    }

    #[test]
    fn test_validate_correspondences() {
        let ok = [Correspondence::new(0, 1), Correspondence::new(2, 0)];
        assert!(validate_correspondences(&ok, 3, 2).is_ok());

        let bad_source = [Correspondence::new(3, 0)];
        assert_eq!(
            validate_correspondences(&bad_source, 3, 2),
            Err(MatchingError::IndexOutOfRange {
                side: ImageSide::Source,
                index: 3,
                len: 3,
            })
        );

        let bad_target = [Correspondence::new(0, 5)];
        assert_eq!(
            validate_correspondences(&bad_target, 3, 2),
            Err(MatchingError::IndexOutOfRange {
                side: ImageSide::Target,
                index: 5,
                len: 2,
            })
        );
    }
}
