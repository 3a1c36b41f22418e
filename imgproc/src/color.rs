use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage};
use rayon::prelude::*;
use rayon::ThreadPool;

/// 8-bit pixel formats that can be reduced to a single luminance channel.
pub trait ToGrayscale: Pixel<Subpixel = u8> + Send + Sync + 'static {
    fn to_gray(image: &ImageBuffer<Self, Vec<u8>>) -> GrayImage;
}

impl ToGrayscale for Luma<u8> {
    fn to_gray(image: &GrayImage) -> GrayImage {
        image.clone()
    }
}

impl ToGrayscale for Rgb<u8> {
    fn to_gray(image: &RgbImage) -> GrayImage {
        convert_rgb_to_gray(image)
    }
}

pub fn convert_rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    convert_rgb_to_gray_in_pool(rgb, None)
}

/// ITU-R BT.601 luma in 8-bit fixed point.
pub fn convert_rgb_to_gray_in_pool(rgb: &RgbImage, pool: Option<&ThreadPool>) -> GrayImage {
    let run = || {
        let (w, h) = rgb.dimensions();
        let mut gray = GrayImage::new(w, h);

        gray.as_mut()
            .par_chunks_mut(4096)
            .zip(rgb.as_raw().par_chunks(4096 * 3))
            .for_each(|(g_chunk, rgb_chunk)| {
                for (g, px) in g_chunk.iter_mut().zip(rgb_chunk.chunks_exact(3)) {
                    let luma = 77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32;
                    *g = ((luma + 128) >> 8) as u8;
                }
            });

        gray
    };

    if let Some(p) = pool {
        p.install(run)
    } else {
        run()
    }
}
