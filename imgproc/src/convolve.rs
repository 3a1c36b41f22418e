use crate::GrayFloatImage;
use rayon::prelude::*;

pub fn gaussian_kernel_1d(sigma: f32, size: usize) -> Vec<f32> {
    assert!(size % 2 == 1, "gaussian kernel size must be odd");
    let mut kernel = Vec::with_capacity(size);
    let center = (size / 2) as isize;
    let sigma2 = sigma * sigma;
    let mut sum = 0.0f32;

    for i in 0..size {
        let x = (i as isize - center) as f32;
        let v = (-(x * x) / (2.0 * sigma2)).exp();
        kernel.push(v);
        sum += v;
    }

    if sum != 0.0 {
        for v in &mut kernel {
            *v /= sum;
        }
    }

    kernel
}

/// Kernel length covering +-4 sigma, always odd.
pub fn gaussian_kernel_size(sigma: f32) -> usize {
    ((sigma * 8.0 + 1.0).round() as usize) | 1
}

/// Reflects `coord` into `0..len` without repeating the edge pixel
/// (`gfedcb|abcdefgh|gfedcba`).
pub(crate) fn reflect_101(coord: isize, len: usize) -> usize {
    let n = len as isize;
    if n <= 1 {
        return 0;
    }
    let period = 2 * n - 2;
    let c = coord.rem_euclid(period);
    (if c >= n { period - c } else { c }) as usize
}

/// Convolves rows with `kx`, then columns with `ky`. Borders are reflected.
pub fn separable_convolve_f32(image: &GrayFloatImage, kx: &[f32], ky: &[f32]) -> GrayFloatImage {
    assert!(kx.len() % 2 == 1, "kx size must be odd");
    assert!(ky.len() % 2 == 1, "ky size must be odd");

    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut out = GrayFloatImage::new(image.width(), image.height());
    if width == 0 || height == 0 {
        return out;
    }

    let rx = kx.len() / 2;
    let ry = ky.len() / 2;
    let src = image.as_raw();

    // Horizontal Pass (using kx)
    let mut tmp = vec![0.0f32; width * height];
    tmp.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row_out)| {
            let row = &src[y * width..(y + 1) * width];
            let padded: Vec<f32> = (0..width + 2 * rx)
                .map(|i| row[reflect_101(i as isize - rx as isize, width)])
                .collect();
            for (x, out) in row_out.iter_mut().enumerate() {
                *out = padded[x..x + kx.len()]
                    .iter()
                    .zip(kx)
                    .map(|(p, k)| p * k)
                    .sum();
            }
        });

    // Vertical Pass (using ky)
    let rows: Vec<usize> = (0..height + 2 * ry)
        .map(|i| reflect_101(i as isize - ry as isize, height))
        .collect();
    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row_out)| {
            for (x, out) in row_out.iter_mut().enumerate() {
                *out = rows[y..y + ky.len()]
                    .iter()
                    .zip(ky)
                    .map(|(&iy, k)| tmp[iy * width + x] * k)
                    .sum();
            }
        });

    out
}

pub fn gaussian_blur_f32(image: &GrayFloatImage, sigma: f32) -> GrayFloatImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    let kernel = gaussian_kernel_1d(sigma, gaussian_kernel_size(sigma));
    separable_convolve_f32(image, &kernel, &kernel)
}
