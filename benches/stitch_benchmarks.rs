//! Benchmarks for the stitching pipeline
//!
//! Measures SIFT extraction at a few frame sizes and a full two-frame stitch.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cv_panorama::features::Sift;
use cv_panorama::stitching::stitch_pair;
use cv_panorama::StitchConfig;
use cv_panorama::imgproc::convert_rgb_to_gray;
use image::imageops;
use std::time::Duration;

#[path = "../tests/common/mod.rs"]
mod common;
use common::blob_scene;

fn benchmark_sift(c: &mut Criterion) {
    let mut group = c.benchmark_group("sift_detect_and_compute");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(10);

    for size in [128u32, 256, 512] {
        let img = convert_rgb_to_gray(&blob_scene(size, size, size as u64));
        let sift = Sift::new();
        group.bench_with_input(
            BenchmarkId::new("cpu", format!("{}x{}", size, size)),
            &img,
            |b, img| b.iter(|| sift.detect_and_compute(black_box(img))),
        );
    }

    group.finish();
}

fn benchmark_stitch_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("stitch_pair");
    group.measurement_time(Duration::from_secs(8));
    group.sample_size(10);

    let scene = blob_scene(400, 240, 7);
    let a = imageops::crop_imm(&scene, 0, 0, 320, 240).to_image();
    let b = imageops::crop_imm(&scene, 80, 0, 320, 240).to_image();
    let config = StitchConfig::default();

    group.bench_function("320x240_shift_80", |bench| {
        bench.iter(|| stitch_pair(black_box(&a), black_box(&b), &config))
    });

    group.finish();
}

criterion_group!(benches, benchmark_sift, benchmark_stitch_pair);
criterion_main!(benches);
