//! Progressive panorama construction
//!
//! The panorama is a left fold over the input sequence: each image is
//! stitched onto the running result, and an image that cannot be registered
//! is skipped while the running result carries over unchanged.

use crate::pair::stitch_pair;
use crate::{Image, Result, StitchConfig, StitchError, StitchPixel};
use cv_imgproc::scale_image;
use tracing::{info, warn};

/// An input image left out of the panorama, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub index: usize,
    pub reason: StitchError,
}

#[derive(Debug, Clone)]
pub struct StitchReport<P: StitchPixel> {
    pub panorama: Image<P>,
    pub skipped: Vec<SkippedImage>,
    /// Images merged into the panorama, the first one included.
    pub stitched: usize,
}

pub struct PanoramaBuilder {
    config: StitchConfig,
}

impl PanoramaBuilder {
    pub fn new(config: StitchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Applies the configured downscale once to every image.
    pub fn prepare<P: StitchPixel>(&self, images: Vec<Image<P>>) -> Result<Vec<Image<P>>> {
        let factor = self.config.downscale_factor;
        if factor == 1.0 {
            return Ok(images);
        }
        images
            .into_iter()
            .map(|img| {
                if img.width() == 0 || img.height() == 0 {
                    return Ok(img);
                }
                scale_image(&img, factor).map_err(StitchError::from)
            })
            .collect()
    }

    pub fn build<P: StitchPixel>(&self, images: Vec<Image<P>>) -> Result<Image<P>> {
        self.build_with_report(images).map(|report| report.panorama)
    }

    pub fn build_with_report<P: StitchPixel>(&self, images: Vec<Image<P>>) -> Result<StitchReport<P>> {
        let total = images.len();
        let mut images = images.into_iter().enumerate();
        let Some((_, first)) = images.next() else {
            return Err(StitchError::EmptyInput);
        };

        let mut skipped = Vec::new();
        let panorama = images.try_fold(first, |current, (index, next)| {
            match stitch_pair(&current, &next, &self.config) {
                Ok(stitched) => Ok(stitched),
                Err(reason) if reason.is_recoverable() => {
                    warn!(index, %reason, "skipping image");
                    skipped.push(SkippedImage { index, reason });
                    Ok(current)
                }
                Err(e) => Err(e),
            }
        })?;

        let stitched = total - skipped.len();
        info!(
            images = total,
            stitched,
            skipped = skipped.len(),
            width = panorama.width(),
            height = panorama.height(),
            "panorama built"
        );

        Ok(StitchReport {
            panorama,
            skipped,
            stitched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn builder() -> PanoramaBuilder {
        PanoramaBuilder::new(StitchConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let err = builder().build::<Luma<u8>>(Vec::new()).unwrap_err();
        assert_eq!(err, StitchError::EmptyInput);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_single_image_is_returned_unchanged() {
        let img = RgbImage::from_fn(17, 9, |x, y| Rgb([x as u8, y as u8, 7]));
        let report = builder().build_with_report(vec![img.clone()]).unwrap();
        assert_eq!(report.panorama, img);
        assert!(report.skipped.is_empty());
        assert_eq!(report.stitched, 1);
    }

    #[test]
    fn test_featureless_images_are_skipped() {
        let first = GrayImage::from_pixel(48, 48, Luma([128]));
        let images = vec![first.clone(), GrayImage::from_pixel(48, 48, Luma([128])), GrayImage::from_pixel(48, 48, Luma([60]))];
        let report = builder().build_with_report(images).unwrap();

        assert_eq!(report.panorama, first);
        assert_eq!(report.stitched, 1);
        let indices: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(report
            .skipped
            .iter()
            .all(|s| matches!(s.reason, StitchError::InsufficientFeatures { .. })));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = StitchConfig::default().with_match_ratio(2.0);
        assert!(matches!(PanoramaBuilder::new(config), Err(StitchError::Config(_))));
    }

    #[test]
    fn test_prepare_downscales_once() {
        let images = vec![RgbImage::new(100, 60), RgbImage::new(41, 20)];
        let prepared = builder().prepare(images).unwrap();
        assert_eq!(prepared[0].dimensions(), (50, 30));
        assert_eq!(prepared[1].dimensions(), (21, 10));
    }

    #[test]
    fn test_prepare_reports_resize_failure_as_image_error() {
        let builder = PanoramaBuilder {
            config: StitchConfig {
                downscale_factor: f64::NAN,
                ..StitchConfig::default()
            },
        };
        let err = builder.prepare(vec![GrayImage::new(8, 8)]).unwrap_err();
        assert!(matches!(err, StitchError::Image(_)), "{err:?}");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_prepare_identity_factor() {
        let b = PanoramaBuilder::new(StitchConfig::default().with_downscale_factor(1.0)).unwrap();
        let img = GrayImage::from_fn(5, 5, |x, y| Luma([(x * 5 + y) as u8]));
        assert_eq!(b.prepare(vec![img.clone()]).unwrap(), vec![img]);
    }
}
