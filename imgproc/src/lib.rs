pub mod color;
pub mod convolve;
pub mod geometry;
pub mod resize;

pub use color::*;
pub use convolve::*;
pub use geometry::*;
pub use resize::*;

use image::{GrayImage, ImageBuffer, Luma};

pub type Result<T> = std::result::Result<T, ImgprocError>;

/// Single-channel floating point image used by scale-space processing.
pub type GrayFloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, thiserror::Error)]
pub enum ImgprocError {
    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Algorithm error: {0}")]
    AlgorithmError(String),
}

/// Converts 8-bit intensities to `f32` without rescaling (values stay in 0..=255).
pub fn gray_to_f32(image: &GrayImage) -> GrayFloatImage {
    let data = image.as_raw().iter().map(|&v| v as f32).collect();
    GrayFloatImage::from_raw(image.width(), image.height(), data)
        .unwrap_or_else(|| GrayFloatImage::new(image.width(), image.height()))
}
