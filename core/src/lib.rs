pub mod descriptor;
pub mod geometry;
pub mod keypoint;
pub mod robust;
pub mod runtime;

pub use descriptor::*;
pub use geometry::*;
pub use keypoint::*;
pub use robust::{Ransac, RobustConfig, RobustModel, RobustResult};
pub use runtime::{current_cpu_threads, init_global_thread_pool};
