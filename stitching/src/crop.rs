use crate::Image;
use image::Pixel;
use rayon::prelude::*;

/// A pixel counts as content when any channel is above this value.
pub const CONTENT_THRESHOLD: u8 = 1;

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Smallest rectangle enclosing every content pixel, or `None` for an all-black image.
pub fn content_bounds<P>(image: &Image<P>) -> Option<Rect>
where
    P: Pixel<Subpixel = u8> + Send + Sync + 'static,
{
    let channels = P::CHANNEL_COUNT as usize;
    let row_len = image.width() as usize * channels;
    if row_len == 0 {
        return None;
    }

    let is_content = |px: &[u8]| px.iter().any(|&c| c > CONTENT_THRESHOLD);

    let (min_x, max_x, min_y, max_y) = image
        .par_chunks(row_len)
        .enumerate()
        .filter_map(|(y, row)| {
            let first = row.chunks_exact(channels).position(is_content)?;
            let last = row.chunks_exact(channels).rposition(is_content)?;
            Some((first, last, y, y))
        })
        .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1), a.2.min(b.2), a.3.max(b.3)))?;

    Some(Rect {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Trims black borders. An all-black image is returned unchanged.
pub fn crop_black_borders<P>(image: &Image<P>) -> Image<P>
where
    P: Pixel<Subpixel = u8> + Send + Sync + 'static,
{
    match content_bounds(image) {
        Some(r) => image::imageops::crop_imm(image, r.x, r.y, r.width, r.height).to_image(),
        None => image.clone(),
    }
}
