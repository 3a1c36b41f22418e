//! Robust Estimation Module
//!
//! Provides a generic, seedable RANSAC implementation that can be used for any
//! model estimation task. The random source is seeded from the configuration,
//! so identical inputs and seeds always select the same hypothesis.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::marker::PhantomData;

/// Configuration for robust estimation
#[derive(Debug, Clone)]
pub struct RobustConfig {
    pub threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            max_iterations: 1000,
            confidence: 0.99,
            seed: 0,
        }
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    pub residual: f64,
}

impl<M> RobustResult<M> {
    fn failed(n: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
        }
    }
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a sample of at least `min_sample_size` points.
    /// Returns `None` for degenerate samples.
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Compute error for a single data point against the model
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &RobustConfig {
        &self.config
    }

    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if n < k || k == 0 {
            return RobustResult::failed(n);
        }

        let mut best = RobustResult::failed(n);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..n).collect();
        let mut max_iterations = self.config.max_iterations;
        let mut iteration = 0;

        while iteration < max_iterations {
            iteration += 1;

            // 1. Sample
            let (picked, _) = indices.partial_shuffle(&mut rng, k);
            let sample: Vec<&D> = picked.iter().map(|&i| &data[i]).collect();

            // 2. Estimate
            let Some(model) = estimator.estimate(&sample) else {
                continue;
            };

            // 3. Score
            let (inliers, num_inliers, residual) = self.score(estimator, &model, data);

            if num_inliers > best.num_inliers
                || (num_inliers == best.num_inliers && num_inliers > 0 && residual < best.residual)
            {
                best = RobustResult {
                    model: Some(model),
                    inliers,
                    num_inliers,
                    residual,
                };
                max_iterations = max_iterations.min(self.adaptive_iterations(num_inliers, n, k));
            }
        }

        best
    }

    /// Marks every datum whose error is below the threshold.
    pub fn score(&self, estimator: &M, model: &M::Model, data: &[D]) -> (Vec<bool>, usize, f64) {
        let mut inliers = vec![false; data.len()];
        let mut num_inliers = 0;
        let mut total_error = 0.0;

        for (j, d) in data.iter().enumerate() {
            let err = estimator.compute_error(model, d);
            if err < self.config.threshold {
                inliers[j] = true;
                num_inliers += 1;
                total_error += err;
            }
        }

        let residual = if num_inliers > 0 {
            total_error / num_inliers as f64
        } else {
            f64::INFINITY
        };
        (inliers, num_inliers, residual)
    }

    /// Iterations needed to draw one all-inlier sample with the configured confidence.
    fn adaptive_iterations(&self, num_inliers: usize, n: usize, k: usize) -> usize {
        let inlier_ratio = num_inliers as f64 / n as f64;
        let p_good_sample = inlier_ratio.powi(k as i32);
        if p_good_sample >= 1.0 {
            return 1;
        }
        if p_good_sample <= f64::EPSILON {
            return self.config.max_iterations;
        }
        let confidence = self.config.confidence.clamp(0.0, 1.0 - f64::EPSILON);
        let needed = (1.0 - confidence).ln() / (1.0 - p_good_sample).ln();
        if needed.is_finite() && needed >= 0.0 {
            (needed.ceil() as usize).max(1)
        } else {
            self.config.max_iterations
        }
    }
}
