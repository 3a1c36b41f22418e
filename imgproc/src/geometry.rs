use crate::{ImgprocError, Result};
use image::{ImageBuffer, Pixel};
use nalgebra::{Matrix3, Point2};
use rayon::prelude::*;

/// Bilinear sample of channel `c` at `pt`; taps outside the image read as zero.
fn sample_bilinear(raw: &[u8], width: usize, height: usize, channels: usize, pt: Point2<f64>, c: usize) -> f64 {
    let x0 = pt.x.floor() as isize;
    let y0 = pt.y.floor() as isize;
    let fx = pt.x - x0 as f64;
    let fy = pt.y - y0 as f64;

    let tap = |x: isize, y: isize| {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0.0
        } else {
            raw[(y as usize * width + x as usize) * channels + c] as f64
        }
    };

    let v0 = tap(x0, y0) * (1.0 - fx) + tap(x0 + 1, y0) * fx;
    let v1 = tap(x0, y0 + 1) * (1.0 - fx) + tap(x0 + 1, y0 + 1) * fx;
    v0 * (1.0 - fy) + v1 * fy
}

/// Maps `pt` through `matrix`; `None` when the point lands at or behind the
/// line at infinity.
pub fn transform_point(matrix: &Matrix3<f64>, pt: &Point2<f64>) -> Option<Point2<f64>> {
    let w = matrix[(2, 0)] * pt.x + matrix[(2, 1)] * pt.y + matrix[(2, 2)];
    if w <= 1e-12 {
        return None;
    }
    Some(Point2::new(
        (matrix[(0, 0)] * pt.x + matrix[(0, 1)] * pt.y + matrix[(0, 2)]) / w,
        (matrix[(1, 0)] * pt.x + matrix[(1, 1)] * pt.y + matrix[(1, 2)]) / w,
    ))
}

/// Warps `src` forward through `matrix` into a `width x height` canvas.
///
/// Each destination pixel pulls from `matrix^-1 * (x, y)` with bilinear
/// interpolation; pixels that map outside `src` stay black.
pub fn warp_perspective<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    matrix: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> Result<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let inverse = matrix.try_inverse().ok_or_else(|| {
        ImgprocError::AlgorithmError("perspective matrix is not invertible".into())
    })?;

    let mut dst: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(width, height);
    if width == 0 || height == 0 {
        return Ok(dst);
    }

    let channels = P::CHANNEL_COUNT as usize;
    let (src_w, src_h) = (src.width() as usize, src.height() as usize);
    let raw = src.as_raw();

    dst.par_chunks_mut(width as usize * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(channels).enumerate() {
                let Some(src_pt) = transform_point(&inverse, &Point2::new(x as f64, y as f64)) else {
                    continue;
                };
                for (c, out) in px.iter_mut().enumerate() {
                    let v = sample_bilinear(raw, src_w, src_h, channels, src_pt, c);
                    *out = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    Ok(dst)
}
