use cv_panorama::imgproc::convert_rgb_to_gray;
use cv_panorama::stitching::{crop_black_borders, stitch_pair};
use cv_panorama::{stitch_panorama, PanoramaBuilder, StitchConfig, StitchError};
use image::{imageops, Rgb};

mod common;
use common::{blob_scene, frame};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn full_resolution() -> StitchConfig {
    StitchConfig::default().with_downscale_factor(1.0)
}

#[test]
fn test_three_frame_pan() {
    init_tracing();
    let world = blob_scene(190, 100, 77);
    let frames = vec![frame(&world, 0, 110), frame(&world, 40, 110), frame(&world, 80, 110)];

    let report = stitch_panorama(frames, &full_resolution()).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.stitched, 3);

    let (w, h) = report.panorama.dimensions();
    assert!((w as i64 - 190).abs() <= 2, "width {w}");
    assert!((h as i64 - 100).abs() <= 2, "height {h}");
    // the first frame is never resampled
    assert_eq!(report.panorama.get_pixel(5, 5), world.get_pixel(5, 5));
}

#[test]
fn test_unrelated_frame_is_skipped() {
    init_tracing();
    let world = blob_scene(150, 100, 5);
    let stranger = blob_scene(110, 100, 999);
    let frames = vec![frame(&world, 0, 110), stranger, frame(&world, 40, 110)];

    let report = stitch_panorama(frames, &full_resolution()).unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 1);
    assert!(report.skipped[0].reason.is_recoverable());
    assert_eq!(report.stitched, 2);
    assert!((report.panorama.width() as i64 - 150).abs() <= 2);
}

#[test]
fn test_identical_frames_reproduce_input() {
    let img = frame(&blob_scene(110, 100, 3), 0, 100);
    let stitched = stitch_pair(&img, &img.clone(), &full_resolution()).unwrap();
    assert_eq!(crop_black_borders(&stitched), img);
}

#[test]
fn test_downscale_applies_before_stitching() {
    let world = blob_scene(170, 120, 12);
    let frames = vec![frame(&world, 0, 120), frame(&world, 40, 120)];
    let config = StitchConfig::default().with_downscale_factor(0.75);

    let report = stitch_panorama(frames, &config).unwrap();
    // 160 px of scene at 0.75 scale
    assert!((report.panorama.width() as i64 - 120).abs() <= 3, "{}", report.panorama.width());
    assert!((report.panorama.height() as i64 - 90).abs() <= 2);
}

#[test]
fn test_empty_sequence() {
    let builder = PanoramaBuilder::new(StitchConfig::default()).unwrap();
    assert_eq!(builder.build::<Rgb<u8>>(vec![]).unwrap_err(), StitchError::EmptyInput);
    assert_eq!(
        stitch_panorama::<Rgb<u8>>(vec![], &StitchConfig::default()).unwrap_err(),
        StitchError::EmptyInput
    );
}

#[test]
fn test_grayscale_frames() {
    let world = convert_rgb_to_gray(&blob_scene(150, 100, 41));
    let a = imageops::crop_imm(&world, 0, 0, 110, 100).to_image();
    let b = imageops::crop_imm(&world, 40, 0, 110, 100).to_image();

    let report = stitch_panorama(vec![a, b], &full_resolution()).unwrap();
    assert!(report.skipped.is_empty());
    assert!((report.panorama.width() as i64 - 150).abs() <= 2);
}

#[test]
fn test_thread_pool_init_is_idempotent() {
    let first = cv_panorama::init_thread_pool(None);
    assert_eq!(cv_panorama::init_thread_pool(Some(3)), first);
}
