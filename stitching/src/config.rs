use crate::compositor::CanvasLimits;
use crate::{Result, StitchError};
use cv_features::{HomographyOptions, Matcher, Sift};
use serde::{Deserialize, Serialize};

/// Tunables of the stitching engine. Every field is optional when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Keypoints kept per image, strongest first.
    pub max_features: usize,
    /// Lowe ratio-test threshold.
    pub match_ratio: f32,
    /// Keep only matches that are also mutual nearest neighbours.
    pub cross_check: bool,
    /// More than this many matches are needed before estimating a homography.
    pub min_inlier_matches: usize,
    /// RANSAC inlier cutoff in pixels.
    pub reprojection_threshold: f64,
    /// Uniform resize applied once to every input image.
    pub downscale_factor: f64,
    pub ransac_max_iterations: usize,
    pub ransac_confidence: f64,
    pub ransac_seed: u64,
    pub max_canvas_side: u32,
    pub max_canvas_pixels: u64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            max_features: 500,
            match_ratio: 0.75,
            cross_check: false,
            min_inlier_matches: 10,
            reprojection_threshold: 5.0,
            downscale_factor: 0.5,
            ransac_max_iterations: 2000,
            ransac_confidence: 0.995,
            ransac_seed: 0x5EED,
            max_canvas_side: 32767,
            max_canvas_pixels: 1 << 28,
        }
    }
}

impl StitchConfig {
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_match_ratio(mut self, ratio: f32) -> Self {
        self.match_ratio = ratio;
        self
    }

    pub fn with_cross_check(mut self, cross_check: bool) -> Self {
        self.cross_check = cross_check;
        self
    }

    pub fn with_min_inlier_matches(mut self, min: usize) -> Self {
        self.min_inlier_matches = min;
        self
    }

    pub fn with_reprojection_threshold(mut self, threshold: f64) -> Self {
        self.reprojection_threshold = threshold;
        self
    }

    pub fn with_downscale_factor(mut self, factor: f64) -> Self {
        self.downscale_factor = factor;
        self
    }

    pub fn with_ransac_seed(mut self, seed: u64) -> Self {
        self.ransac_seed = seed;
        self
    }

    pub fn with_max_canvas_side(mut self, side: u32) -> Self {
        self.max_canvas_side = side;
        self
    }

    pub fn with_max_canvas_pixels(mut self, pixels: u64) -> Self {
        self.max_canvas_pixels = pixels;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_features == 0 {
            return Err(StitchError::Config("max_features must be at least 1".into()));
        }
        if !(self.match_ratio > 0.0 && self.match_ratio <= 1.0) {
            return Err(StitchError::Config(format!(
                "match_ratio must lie in (0, 1], got {}",
                self.match_ratio
            )));
        }
        if !(self.reprojection_threshold.is_finite() && self.reprojection_threshold > 0.0) {
            return Err(StitchError::Config(format!(
                "reprojection_threshold must be positive, got {}",
                self.reprojection_threshold
            )));
        }
        if !(self.downscale_factor.is_finite() && self.downscale_factor > 0.0) {
            return Err(StitchError::Config(format!(
                "downscale_factor must be positive, got {}",
                self.downscale_factor
            )));
        }
        if self.ransac_max_iterations == 0 {
            return Err(StitchError::Config("ransac_max_iterations must be at least 1".into()));
        }
        if !(self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0) {
            return Err(StitchError::Config(format!(
                "ransac_confidence must lie in (0, 1), got {}",
                self.ransac_confidence
            )));
        }
        if self.max_canvas_side == 0 || self.max_canvas_pixels == 0 {
            return Err(StitchError::Config("canvas limits must be positive".into()));
        }
        Ok(())
    }

    pub fn matcher(&self) -> Matcher {
        let matcher = Matcher::new().with_ratio_test(self.match_ratio);
        if self.cross_check {
            matcher.with_cross_check()
        } else {
            matcher
        }
    }

    pub fn feature_extractor(&self) -> Sift {
        Sift::new().with_n_features(self.max_features)
    }

    pub fn homography_options(&self) -> HomographyOptions {
        HomographyOptions {
            min_matches: self.min_inlier_matches,
            reprojection_threshold: self.reprojection_threshold,
            max_iterations: self.ransac_max_iterations,
            confidence: self.ransac_confidence,
            seed: self.ransac_seed,
            refine: true,
        }
    }

    pub fn canvas_limits(&self) -> CanvasLimits {
        CanvasLimits {
            max_side: self.max_canvas_side,
            max_pixels: self.max_canvas_pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StitchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_features, 500);
        assert_eq!(config.match_ratio, 0.75);
        assert_eq!(config.min_inlier_matches, 10);
        assert_eq!(config.reprojection_threshold, 5.0);
        assert_eq!(config.downscale_factor, 0.5);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let bad = [
            StitchConfig::default().with_match_ratio(0.0),
            StitchConfig::default().with_match_ratio(1.5),
            StitchConfig::default().with_match_ratio(f32::NAN),
            StitchConfig::default().with_max_features(0),
            StitchConfig::default().with_reprojection_threshold(-1.0),
            StitchConfig::default().with_downscale_factor(0.0),
            StitchConfig::default().with_downscale_factor(f64::INFINITY),
            StitchConfig::default().with_max_canvas_side(0),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(StitchError::Config(_))), "{config:?}");
        }
        assert!(StitchConfig::default().with_match_ratio(1.0).validate().is_ok());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: StitchConfig =
            serde_json::from_str(r#"{ "match_ratio": 0.6, "downscale_factor": 1.0 }"#).unwrap();
        assert_eq!(config.match_ratio, 0.6);
        assert_eq!(config.downscale_factor, 1.0);
        assert_eq!(config.max_features, 500);
        assert_eq!(config.ransac_seed, 0x5EED);
    }

    #[test]
    fn test_json_round_trip() {
        let config = StitchConfig::default().with_ransac_seed(7).with_max_features(120);
        let json = serde_json::to_string(&config).unwrap();
        let back: StitchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_derived_options() {
        let config = StitchConfig::default().with_min_inlier_matches(6).with_reprojection_threshold(3.0);
        let opts = config.homography_options();
        assert_eq!(opts.min_matches, 6);
        assert_eq!(opts.reprojection_threshold, 3.0);
        assert_eq!(opts.seed, 0x5EED);
        assert_eq!(config.feature_extractor().n_features, 500);
        assert_eq!(config.canvas_limits().max_side, 32767);
    }
}
