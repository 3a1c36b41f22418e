use crate::compositor::composite;
use crate::{Image, Result, StitchConfig, StitchError, StitchPixel};
use cv_core::Homography;
use cv_features::{find_homography, ImageFeatures};
use tracing::debug;

/// Outcome of registering the next image against the current panorama.
#[derive(Debug, Clone)]
pub struct PairAlignment {
    /// Maps the next image's pixel coordinates into the current panorama.
    pub homography: Homography,
    pub features_current: usize,
    pub features_next: usize,
    pub matches: usize,
    pub inliers: usize,
}

/// Estimates the homography taking `next` into the frame of `current`.
pub fn align_pair<P: StitchPixel>(
    current: &Image<P>,
    next: &Image<P>,
    config: &StitchConfig,
) -> Result<PairAlignment> {
    let extractor = config.feature_extractor();
    let (fa, fb) = rayon::join(
        || ImageFeatures::extract(&extractor, &P::to_gray(current)),
        || ImageFeatures::extract(&extractor, &P::to_gray(next)),
    );

    if fa.is_empty() || fb.is_empty() {
        return Err(StitchError::InsufficientFeatures {
            left: fa.len(),
            right: fb.len(),
        });
    }

    let matches = config
        .matcher()
        .match_descriptors(&fa.descriptors, &fb.descriptors);

    let fit = find_homography(
        &matches,
        &fa.keypoints,
        &fb.keypoints,
        &config.homography_options(),
    )?;

    debug!(
        features_current = fa.len(),
        features_next = fb.len(),
        matches = matches.len(),
        inliers = fit.num_inliers,
        "pair aligned"
    );

    Ok(PairAlignment {
        homography: fit.homography,
        features_current: fa.len(),
        features_next: fb.len(),
        matches: matches.len(),
        inliers: fit.num_inliers,
    })
}

/// One fold step: align `next` to `current` and composite them into a new canvas.
pub fn stitch_pair<P: StitchPixel>(current: &Image<P>, next: &Image<P>, config: &StitchConfig) -> Result<Image<P>> {
    let alignment = align_pair(current, next, config)?;
    composite(current, next, &alignment.homography, &config.canvas_limits())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_uniform_images_have_insufficient_features() {
        let a = GrayImage::from_pixel(64, 64, Luma([128]));
        let b = GrayImage::from_pixel(64, 64, Luma([128]));
        let err = stitch_pair(&a, &b, &StitchConfig::default()).unwrap_err();
        assert_eq!(err, StitchError::InsufficientFeatures { left: 0, right: 0 });
    }

    #[test]
    fn test_one_textured_image_is_not_enough() {
        let a = GrayImage::from_fn(64, 64, |x, y| {
            let v = ((x as f32 * 0.4).sin() * (y as f32 * 0.3).cos() * 100.0 + 128.0) as u8;
            Luma([v])
        });
        let b = GrayImage::from_pixel(64, 64, Luma([128]));
        let err = align_pair(&a, &b, &StitchConfig::default()).unwrap_err();
        assert!(matches!(err, StitchError::InsufficientFeatures { right: 0, .. }));
    }
}
