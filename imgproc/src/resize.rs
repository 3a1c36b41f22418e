use crate::{GrayFloatImage, ImgprocError, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel};
use rayon::prelude::*;

/// Bilinear resize to exactly `width x height`.
pub fn resize<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if width == 0 || height == 0 {
        return ImageBuffer::new(0, 0);
    }
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    imageops::resize(src, width, height, FilterType::Triangle)
}

/// Uniformly rescales `src` by `factor`; each side keeps at least one pixel.
pub fn scale_image<P>(src: &ImageBuffer<P, Vec<u8>>, factor: f64) -> Result<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ImgprocError::AlgorithmError(format!(
            "scale factor must be positive and finite, got {factor}"
        )));
    }
    if src.width() == 0 || src.height() == 0 {
        return Err(ImgprocError::ImageError("cannot scale an empty image".into()));
    }

    let width = ((src.width() as f64 * factor).round() as u32).max(1);
    let height = ((src.height() as f64 * factor).round() as u32).max(1);
    Ok(resize(src, width, height))
}

/// Doubles both sides with bilinear interpolation, sampling pixel centers.
pub fn upsample_2x_f32(src: &GrayFloatImage) -> GrayFloatImage {
    let (sw, sh) = (src.width() as usize, src.height() as usize);
    let (dw, dh) = (sw * 2, sh * 2);
    let mut dst = GrayFloatImage::new(dw as u32, dh as u32);
    if sw == 0 || sh == 0 {
        return dst;
    }
    let data = src.as_raw();

    dst.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
        let fy = ((y as f32 + 0.5) * 0.5 - 0.5).max(0.0);
        let y0 = (fy as usize).min(sh - 1);
        let y1 = (y0 + 1).min(sh - 1);
        let wy = fy - y0 as f32;

        for (x, out) in row.iter_mut().enumerate() {
            let fx = ((x as f32 + 0.5) * 0.5 - 0.5).max(0.0);
            let x0 = (fx as usize).min(sw - 1);
            let x1 = (x0 + 1).min(sw - 1);
            let wx = fx - x0 as f32;

            let top = data[y0 * sw + x0] * (1.0 - wx) + data[y0 * sw + x1] * wx;
            let bottom = data[y1 * sw + x0] * (1.0 - wx) + data[y1 * sw + x1] * wx;
            *out = top * (1.0 - wy) + bottom * wy;
        }
    });

    dst
}

/// Halves both sides by keeping every other pixel.
pub fn downsample_2x_f32(src: &GrayFloatImage) -> GrayFloatImage {
    let sw = src.width() as usize;
    let (dw, dh) = (src.width() / 2, src.height() / 2);
    let mut dst = GrayFloatImage::new(dw, dh);
    if dw == 0 || dh == 0 {
        return dst;
    }
    let data = src.as_raw();

    dst.par_chunks_mut(dw as usize).enumerate().for_each(|(y, row)| {
        let src_row = &data[(2 * y) * sw..];
        for (x, out) in row.iter_mut().enumerate() {
            *out = src_row[2 * x];
        }
    });

    dst
}
