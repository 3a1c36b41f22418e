//! RANSAC (Random Sample Consensus) for geometric verification
//!
//! Estimates the planar homography relating two views from putative feature
//! matches, tolerating a large fraction of outliers. Candidate models are
//! fitted with the normalized Direct Linear Transform on minimal 4-point
//! samples, and the winning consensus set is refitted by least squares.

use crate::{FeatureError, Result};
use cv_core::{Homography, KeyPoints, Matches, Ransac, RobustConfig, RobustModel};
use nalgebra::{DMatrix, Matrix3, Point2};
use tracing::debug;

pub type RansacConfig = RobustConfig;

/// A point correspondence: `src` is mapped onto `dst` by the estimated model.
#[derive(Clone, Copy, Debug)]
pub struct MatchPair {
    pub src: Point2<f64>,
    pub dst: Point2<f64>,
}

/// Twice the signed area of the triangle `abc`.
fn triangle_area2(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// True when any three of the points are (nearly) collinear.
fn has_collinear_triplet(points: &[Point2<f64>]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let area = triangle_area2(&points[i], &points[j], &points[k]).abs();
                let scale = (points[j] - points[i]).norm() * (points[k] - points[i]).norm();
                if area <= 1e-6 * scale.max(1e-12) {
                    return true;
                }
            }
        }
    }
    false
}

/// Similarity transform moving the centroid to the origin with mean distance sqrt(2).
fn normalization_transform(points: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if !mean_dist.is_finite() || mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

fn apply_normalization(t: &Matrix3<f64>, p: &Point2<f64>) -> Point2<f64> {
    Point2::new(t[(0, 0)] * p.x + t[(0, 2)], t[(1, 1)] * p.y + t[(1, 2)])
}

/// Normalized DLT over all correspondences.
pub fn homography_dlt(pairs: &[&MatchPair]) -> Option<Homography> {
    if pairs.len() < 4 {
        return None;
    }

    let src: Vec<Point2<f64>> = pairs.iter().map(|m| m.src).collect();
    let dst: Vec<Point2<f64>> = pairs.iter().map(|m| m.dst).collect();
    let t_src = normalization_transform(&src)?;
    let t_dst = normalization_transform(&dst)?;

    let n_rows = (pairs.len() * 2).max(9);
    let mut a = DMatrix::<f64>::zeros(n_rows, 9);
    for (i, (s, d)) in src.iter().zip(&dst).enumerate() {
        let s = apply_normalization(&t_src, s);
        let d = apply_normalization(&t_dst, d);
        let (x1, y1, x2, y2) = (s.x, s.y, d.x, d.y);

        let r = 2 * i;
        a[(r, 0)] = -x1;
        a[(r, 1)] = -y1;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = x2 * x1;
        a[(r, 7)] = x2 * y1;
        a[(r, 8)] = x2;

        a[(r + 1, 3)] = -x1;
        a[(r + 1, 4)] = -y1;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = y2 * x1;
        a[(r + 1, 7)] = y2 * y1;
        a[(r + 1, 8)] = y2;
    }

    // null vector = right singular vector of the smallest singular value
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.total_cmp(y.1))?;
    let h = v_t.row(min_idx);
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst.try_inverse()?;
    Homography::from_matrix(t_dst_inv * hn * t_src)
}

pub struct HomographyEstimator;

impl RobustModel<MatchPair> for HomographyEstimator {
    type Model = Homography;

    fn min_sample_size(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[&MatchPair]) -> Option<Self::Model> {
        let src: Vec<Point2<f64>> = data.iter().map(|m| m.src).collect();
        let dst: Vec<Point2<f64>> = data.iter().map(|m| m.dst).collect();
        if has_collinear_triplet(&src) || has_collinear_triplet(&dst) {
            return None;
        }
        homography_dlt(data)
    }

    fn compute_error(&self, model: &Self::Model, data: &MatchPair) -> f64 {
        model.reprojection_error(data.src, data.dst)
    }
}

#[derive(Debug, Clone)]
pub struct HomographyOptions {
    /// More than this many matches are needed to attempt estimation, and the
    /// final model must explain at least this many of them.
    pub min_matches: usize,
    /// Inlier cutoff in pixels.
    pub reprojection_threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
    /// Refit the model over the final inlier set.
    pub refine: bool,
}

impl Default for HomographyOptions {
    fn default() -> Self {
        Self {
            min_matches: 10,
            reprojection_threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0x5EED,
            refine: true,
        }
    }
}

impl HomographyOptions {
    pub fn with_min_matches(mut self, min_matches: usize) -> Self {
        self.min_matches = min_matches;
        self
    }

    pub fn with_reprojection_threshold(mut self, threshold: f64) -> Self {
        self.reprojection_threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn ransac_config(&self) -> RansacConfig {
        RansacConfig {
            threshold: self.reprojection_threshold,
            max_iterations: self.max_iterations,
            confidence: self.confidence,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HomographyFit {
    pub homography: Homography,
    /// Parallel to the input matches.
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
}

/// Robustly estimates the homography mapping image B coordinates onto image A.
///
/// Each match pairs keypoint `query_idx` of `keypoints_a` with keypoint
/// `train_idx` of `keypoints_b`.
pub fn find_homography(
    matches: &Matches,
    keypoints_a: &KeyPoints,
    keypoints_b: &KeyPoints,
    options: &HomographyOptions,
) -> Result<HomographyFit> {
    if matches.len() <= options.min_matches {
        return Err(FeatureError::InsufficientMatches {
            found: matches.len(),
            required: options.min_matches,
        });
    }

    let data = matches
        .iter()
        .map(|m| {
            let a = keypoints_a.keypoints.get(m.query_idx);
            let b = keypoints_b.keypoints.get(m.train_idx);
            match (a, b) {
                (Some(a), Some(b)) => Ok(MatchPair {
                    src: b.pt(),
                    dst: a.pt(),
                }),
                _ => Err(FeatureError::MatchingError(format!(
                    "match ({}, {}) refers to a missing keypoint",
                    m.query_idx, m.train_idx
                ))),
            }
        })
        .collect::<Result<Vec<MatchPair>>>()?;

    let ransac = Ransac::new(options.ransac_config());
    let result = ransac.run(&HomographyEstimator, &data);
    let Some(mut homography) = result.model else {
        return Err(FeatureError::DegenerateHomography(
            "no non-degenerate minimal sample found".into(),
        ));
    };
    let (mut inliers, mut num_inliers) = (result.inliers, result.num_inliers);

    if options.refine && num_inliers > 4 {
        let inlier_pairs: Vec<&MatchPair> = data
            .iter()
            .zip(&inliers)
            .filter_map(|(d, &keep)| keep.then_some(d))
            .collect();
        if let Some(refit) = homography_dlt(&inlier_pairs) {
            let (refit_inliers, refit_count, _) = ransac.score(&HomographyEstimator, &refit, &data);
            if refit_count >= num_inliers {
                homography = refit;
                inliers = refit_inliers;
                num_inliers = refit_count;
            }
        }
    }

    debug!(
        matches = data.len(),
        inliers = num_inliers,
        "homography estimated"
    );

    if num_inliers < options.min_matches {
        return Err(FeatureError::DegenerateHomography(format!(
            "only {num_inliers} inliers, need {}",
            options.min_matches
        )));
    }

    Ok(HomographyFit {
        homography,
        inliers,
        num_inliers,
    })
}
