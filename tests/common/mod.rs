use image::{imageops, Rgb, RgbImage};

/// Colored smooth blobs; every channel stays well above black.
pub fn blob_scene(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut state = seed ^ 0xD1B5_4A32_D192_ED03;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 33) as f32) / (1u64 << 31) as f32
    };

    let blobs: Vec<(f32, f32, f32, [f32; 3])> = (0..(width * height / 110))
        .map(|_| {
            let (x, y, s) = (next() * width as f32, next() * height as f32, 1.5 + next() * 4.5);
            let amp = (next() - 0.5) * 240.0;
            (x, y, s, [amp, amp * (0.5 + next()), amp * (1.5 - next())])
        })
        .collect();

    RgbImage::from_fn(width, height, |x, y| {
        let mut v = [128.0f32; 3];
        for &(bx, by, s, amp) in &blobs {
            let d2 = (x as f32 - bx).powi(2) + (y as f32 - by).powi(2);
            if d2 < 16.0 * s * s {
                let w = (-d2 / (2.0 * s * s)).exp();
                for c in 0..3 {
                    v[c] += amp[c] * w;
                }
            }
        }
        Rgb(v.map(|c| c.clamp(5.0, 250.0) as u8))
    })
}

/// Full-height vertical strip of `scene` starting at column `x`.
#[allow(dead_code)]
pub fn frame(scene: &RgbImage, x: u32, width: u32) -> RgbImage {
    imageops::crop_imm(scene, x, 0, width, scene.height()).to_image()
}
