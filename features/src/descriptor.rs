use cv_core::{Descriptors, KeyPoints};
use image::GrayImage;

/// A detector that produces keypoints together with one descriptor per keypoint.
///
/// `keypoints.len() == descriptors.len()` and entry `i` of each describes the
/// same feature.
pub trait FeatureExtractor: Send + Sync {
    fn detect_and_compute(&self, image: &GrayImage) -> (KeyPoints, Descriptors);
}

/// Keypoints and descriptors of one image.
#[derive(Debug, Clone, Default)]
pub struct ImageFeatures {
    pub keypoints: KeyPoints,
    pub descriptors: Descriptors,
}

impl ImageFeatures {
    pub fn extract<E: FeatureExtractor + ?Sized>(extractor: &E, image: &GrayImage) -> Self {
        let (keypoints, descriptors) = extractor.detect_and_compute(image);
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}
