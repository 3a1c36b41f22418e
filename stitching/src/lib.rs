//! Sequential pairwise panorama stitching
//!
//! Frames are registered one after another against the growing panorama:
//! SIFT features, ratio-tested matches and a RANSAC homography align each new
//! frame, which is then warped onto an enlarged canvas. Black borders left by
//! the warps are trimmed once at the end.

pub mod compositor;
pub mod config;
pub mod crop;
pub mod error;
pub mod pair;
pub mod panorama;

pub use compositor::{canvas_layout, composite, CanvasLayout, CanvasLimits};
pub use config::StitchConfig;
pub use crop::{content_bounds, crop_black_borders, Rect};
pub use error::StitchError;
pub use pair::{align_pair, stitch_pair, PairAlignment};
pub use panorama::{PanoramaBuilder, SkippedImage, StitchReport};

use cv_imgproc::ToGrayscale;
use image::ImageBuffer;

pub type Result<T> = std::result::Result<T, StitchError>;

/// An 8-bit image with any channel layout.
pub type Image<P> = ImageBuffer<P, Vec<u8>>;

/// Pixel types the engine can stitch (grayscale and RGB).
pub trait StitchPixel: ToGrayscale {}

impl<P: ToGrayscale> StitchPixel for P {}

/// Downscales, stitches and crops `images` in one call.
pub fn stitch_panorama<P: StitchPixel>(images: Vec<Image<P>>, config: &StitchConfig) -> Result<StitchReport<P>> {
    let builder = PanoramaBuilder::new(config.clone())?;
    let prepared = builder.prepare(images)?;
    let mut report = builder.build_with_report(prepared)?;
    report.panorama = crop_black_borders(&report.panorama);
    Ok(report)
}
