use cv_features::FeatureError;
use cv_imgproc::ImgprocError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StitchError {
    #[error("Insufficient features: left image has {left}, right image has {right}")]
    InsufficientFeatures { left: usize, right: usize },

    #[error("Insufficient matches: found {found}, need more than {required}")]
    InsufficientMatches { found: usize, required: usize },

    #[error("Degenerate homography: {0}")]
    DegenerateHomography(String),

    #[error("Warp failure: {0}")]
    WarpFailure(String),

    #[error("No images to stitch")]
    EmptyInput,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Image processing error: {0}")]
    Image(String),
}

impl StitchError {
    /// Per-pair failures: the builder skips the offending image and continues.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StitchError::InsufficientFeatures { .. }
                | StitchError::InsufficientMatches { .. }
                | StitchError::DegenerateHomography(_)
                | StitchError::WarpFailure(_)
        )
    }
}

impl From<FeatureError> for StitchError {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::InsufficientMatches { found, required } => {
                StitchError::InsufficientMatches { found, required }
            }
            FeatureError::DegenerateHomography(msg) => StitchError::DegenerateHomography(msg),
            other => StitchError::DegenerateHomography(other.to_string()),
        }
    }
}

impl From<ImgprocError> for StitchError {
    fn from(err: ImgprocError) -> Self {
        StitchError::Image(err.to_string())
    }
}
