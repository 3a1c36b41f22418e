pub mod descriptor;
pub mod matcher;
pub mod ransac;
pub mod sift;

pub use descriptor::*;
pub use matcher::*;
pub use ransac::*;
pub use sift::*;

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Matching error: {0}")]
    MatchingError(String),

    #[error("Insufficient matches: found {found}, need more than {required}")]
    InsufficientMatches { found: usize, required: usize },

    #[error("Degenerate homography: {0}")]
    DegenerateHomography(String),
}
