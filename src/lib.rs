//! Progressive pairwise panorama stitching.
//!
//! Facade over the member crates: shared types and RANSAC in [`core`], pixel
//! operations in [`imgproc`], SIFT and matching in [`features`], and the
//! panorama builder in [`stitching`].

pub use cv_core as core;
pub use cv_features as features;
pub use cv_imgproc as imgproc;
pub use cv_stitching as stitching;

pub use cv_stitching::{stitch_panorama, PanoramaBuilder, StitchConfig, StitchError, StitchReport};

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before stitching. Repeated calls are
/// idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `PANORAMA_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    cv_core::init_global_thread_pool(num_threads)
}
