//! Canvas compositing for a single image pair
//!
//! Image B is warped into the coordinate frame of image A through a
//! homography. The output canvas is the union of A's footprint and B's
//! projected corners, shifted so that every coordinate is non-negative.
//! A is pasted last and always wins in the overlap.

use crate::{Image, Result, StitchError};
use cv_core::Homography;
use cv_imgproc::warp_perspective;
use image::Pixel;
use nalgebra::Point2;
use rayon::prelude::*;
use tracing::debug;

/// Upper bounds on the canvas a composite may allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasLimits {
    pub max_side: u32,
    pub max_pixels: u64,
}

impl Default for CanvasLimits {
    fn default() -> Self {
        Self {
            max_side: 32767,
            max_pixels: 1 << 28,
        }
    }
}

/// Geometry of a pairwise composite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasLayout {
    pub width: u32,
    pub height: u32,
    /// Position of A's top-left pixel on the canvas.
    pub offset_x: u32,
    pub offset_y: u32,
    /// Maps B's pixel coordinates onto the canvas (translation after `H`).
    pub transform: Homography,
}

fn corners(width: u32, height: u32) -> [Point2<f64>; 4] {
    let (w, h) = (width as f64, height as f64);
    [
        Point2::new(0.0, 0.0),
        Point2::new(0.0, h),
        Point2::new(w, h),
        Point2::new(w, 0.0),
    ]
}

/// Computes the canvas holding A untouched and B projected through `h`.
///
/// The union box is widened by half a pixel on each side and truncated to
/// integers, so an identity transform reproduces A's size exactly.
pub fn canvas_layout(
    a_dims: (u32, u32),
    b_dims: (u32, u32),
    h: &Homography,
    limits: &CanvasLimits,
) -> Result<CanvasLayout> {
    let mut points: Vec<Point2<f64>> = corners(a_dims.0, a_dims.1).to_vec();
    for corner in corners(b_dims.0, b_dims.1) {
        if h.depth(corner) <= 0.0 {
            return Err(StitchError::WarpFailure(format!(
                "corner ({}, {}) of the new image projects behind the camera",
                corner.x, corner.y
            )));
        }
        let projected = h.apply(corner).ok_or_else(|| {
            StitchError::WarpFailure("corner projects to infinity".into())
        })?;
        points.push(projected);
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in &points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let side_limit = limits.max_side as f64;
    if [min_x, min_y, max_x, max_y]
        .iter()
        .any(|v| !v.is_finite() || v.abs() > side_limit * 4.0)
    {
        return Err(StitchError::WarpFailure(format!(
            "projected extent [{min_x:.1}, {max_x:.1}] x [{min_y:.1}, {max_y:.1}] is out of range"
        )));
    }

    // truncation toward zero
    let x_min = (min_x - 0.5) as i64;
    let y_min = (min_y - 0.5) as i64;
    let x_max = (max_x + 0.5) as i64;
    let y_max = (max_y + 0.5) as i64;

    let width = x_max - x_min;
    let height = y_max - y_min;
    if width <= 0 || height <= 0 {
        return Err(StitchError::WarpFailure(format!(
            "canvas size {width}x{height} is not positive"
        )));
    }
    if width > limits.max_side as i64
        || height > limits.max_side as i64
        || (width as u64) * (height as u64) > limits.max_pixels
    {
        return Err(StitchError::WarpFailure(format!(
            "canvas size {width}x{height} exceeds the configured limits"
        )));
    }

    // A's corner (0, 0) is part of the union, so both minima are <= 0
    let (offset_x, offset_y) = (-x_min, -y_min);
    let transform = Homography::translation(offset_x as f64, offset_y as f64) * *h;

    Ok(CanvasLayout {
        width: width as u32,
        height: height as u32,
        offset_x: offset_x as u32,
        offset_y: offset_y as u32,
        transform,
    })
}

/// Warps `b` into `a`'s frame and overlays `a` unchanged. Returns a new buffer.
pub fn composite<P>(a: &Image<P>, b: &Image<P>, h: &Homography, limits: &CanvasLimits) -> Result<Image<P>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    if a.width() == 0 || a.height() == 0 || b.width() == 0 || b.height() == 0 {
        return Err(StitchError::WarpFailure("cannot composite an empty image".into()));
    }

    let layout = canvas_layout(a.dimensions(), b.dimensions(), h, limits)?;
    debug!(
        width = layout.width,
        height = layout.height,
        offset_x = layout.offset_x,
        offset_y = layout.offset_y,
        "canvas layout"
    );

    let mut canvas = warp_perspective(b, layout.transform.matrix(), layout.width, layout.height)
        .map_err(|e| StitchError::WarpFailure(e.to_string()))?;

    let channels = P::CHANNEL_COUNT as usize;
    let canvas_row = layout.width as usize * channels;
    let a_row = a.width() as usize * channels;
    let x0 = layout.offset_x as usize * channels;

    canvas
        .par_chunks_mut(canvas_row)
        .skip(layout.offset_y as usize)
        .take(a.height() as usize)
        .zip(a.as_raw().par_chunks(a_row))
        .for_each(|(dst, src)| dst[x0..x0 + a_row].copy_from_slice(src));

    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use nalgebra::Matrix3;

    fn limits() -> CanvasLimits {
        CanvasLimits::default()
    }

    #[test]
    fn test_identity_layout_matches_image() {
        let layout = canvas_layout((100, 80), (100, 80), &Homography::identity(), &limits()).unwrap();
        assert_eq!((layout.width, layout.height), (100, 80));
        assert_eq!((layout.offset_x, layout.offset_y), (0, 0));
    }

    #[test]
    fn test_translation_extends_canvas_right() {
        let h = Homography::translation(20.0, 0.0);
        let layout = canvas_layout((100, 100), (100, 100), &h, &limits()).unwrap();
        assert_eq!((layout.width, layout.height), (120, 100));
        assert_eq!((layout.offset_x, layout.offset_y), (0, 0));
    }

    #[test]
    fn test_negative_translation_shifts_a() {
        let h = Homography::translation(-30.0, -10.0);
        let layout = canvas_layout((100, 100), (100, 100), &h, &limits()).unwrap();
        assert_eq!((layout.width, layout.height), (130, 110));
        assert_eq!((layout.offset_x, layout.offset_y), (30, 10));
        let p = layout.transform.apply(Point2::new(0.0, 0.0)).unwrap();
        assert!((p - Point2::new(0.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_layout_rejects_points_behind_camera() {
        let h = Homography::from_matrix(Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -0.02, 0.0, 1.0)).unwrap();
        let err = canvas_layout((100, 100), (100, 100), &h, &limits()).unwrap_err();
        assert!(matches!(err, StitchError::WarpFailure(_)));
    }

    #[test]
    fn test_layout_rejects_oversized_canvas() {
        let h = Homography::translation(5000.0, 0.0);
        let small = CanvasLimits {
            max_side: 1000,
            max_pixels: 1 << 20,
        };
        assert!(matches!(
            canvas_layout((100, 100), (100, 100), &h, &small),
            Err(StitchError::WarpFailure(_))
        ));

        let tight_area = CanvasLimits {
            max_side: 32767,
            max_pixels: 100 * 100,
        };
        assert!(canvas_layout((100, 100), (100, 100), &Homography::identity(), &tight_area).is_ok());
        assert!(canvas_layout((100, 100), (100, 100), &Homography::translation(1.0, 0.0), &tight_area).is_err());
    }

    #[test]
    fn test_layout_rejects_extreme_scale() {
        let h = Homography::from_matrix(Matrix3::new(1e6, 0.0, 0.0, 0.0, 1e6, 0.0, 0.0, 0.0, 1.0)).unwrap();
        assert!(matches!(
            canvas_layout((10, 10), (10, 10), &h, &limits()),
            Err(StitchError::WarpFailure(_))
        ));
    }

    #[test]
    fn test_composite_a_wins_overlap() {
        let a = RgbImage::from_pixel(40, 30, Rgb([200, 10, 10]));
        let b = RgbImage::from_pixel(40, 30, Rgb([10, 10, 200]));
        let out = composite(&a, &b, &Homography::translation(15.0, 0.0), &limits()).unwrap();

        assert_eq!(out.dimensions(), (55, 30));
        for y in 0..30 {
            for x in 0..40 {
                assert_eq!(out.get_pixel(x, y), a.get_pixel(x, y));
            }
        }
        assert_eq!(*out.get_pixel(50, 15), Rgb([10, 10, 200]));
    }

    #[test]
    fn test_composite_zero_fills_uncovered_canvas() {
        let a = GrayImage::from_pixel(20, 20, Luma([90]));
        let b = GrayImage::from_pixel(20, 20, Luma([160]));
        let out = composite(&a, &b, &Homography::translation(10.0, 10.0), &limits()).unwrap();

        assert_eq!(out.dimensions(), (30, 30));
        assert_eq!(out.get_pixel(25, 5)[0], 0);
        assert_eq!(out.get_pixel(5, 25)[0], 0);
        assert_eq!(out.get_pixel(25, 25)[0], 160);
        assert_eq!(out.get_pixel(5, 5)[0], 90);
    }

    #[test]
    fn test_composite_places_a_at_offset() {
        let a = GrayImage::from_fn(10, 8, |x, y| Luma([(10 + x + 10 * y) as u8]));
        let b = GrayImage::from_pixel(10, 8, Luma([250]));
        let out = composite(&a, &b, &Homography::translation(-4.0, -3.0), &limits()).unwrap();

        assert_eq!(out.dimensions(), (14, 11));
        for y in 0..8 {
            for x in 0..10 {
                assert_eq!(out.get_pixel(x + 4, y + 3), a.get_pixel(x, y));
            }
        }
        assert_eq!(out.get_pixel(0, 0)[0], 250);
    }

    #[test]
    fn test_composite_rejects_empty_image() {
        let a = GrayImage::new(0, 0);
        let b = GrayImage::from_pixel(4, 4, Luma([1]));
        assert!(matches!(
            composite(&a, &b, &Homography::identity(), &limits()),
            Err(StitchError::WarpFailure(_))
        ));
    }
}
