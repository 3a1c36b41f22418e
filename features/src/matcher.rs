//! Brute-force descriptor matching with Lowe's ratio test
//!
//! Every query descriptor is compared against every train descriptor by L2
//! distance. Matches are emitted in query order.

use cv_core::{Descriptors, FeatureMatch, Matches};
use rayon::prelude::*;

pub struct Matcher {
    cross_check: bool,
    ratio_threshold: Option<f32>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            cross_check: false,
            ratio_threshold: None,
        }
    }

    pub fn with_cross_check(mut self) -> Self {
        self.cross_check = true;
        self
    }

    /// Keep a match only when `best < ratio * second_best`.
    pub fn with_ratio_test(mut self, threshold: f32) -> Self {
        self.ratio_threshold = Some(threshold);
        self
    }

    pub fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Matches {
        if query.is_empty() || train.is_empty() {
            return Matches::new();
        }

        let matches: Vec<FeatureMatch> = knn_match(query, train, 2)
            .into_par_iter()
            .filter_map(|knn| {
                let best = *knn.first()?;

                if let Some(ratio) = self.ratio_threshold {
                    // a lone candidate cannot pass the ratio test
                    let second = knn.get(1)?;
                    if !(best.distance < ratio * second.distance) {
                        return None;
                    }
                }

                if self.cross_check {
                    let reverse = nearest(&train.descriptors[best.train_idx], query)?;
                    if reverse != best.query_idx {
                        return None;
                    }
                }

                Some(best)
            })
            .collect();

        Matches { matches }
    }
}

/// Index of the descriptor in `train` closest to `desc`; ties resolve to the lowest index.
fn nearest(desc: &cv_core::Descriptor, train: &Descriptors) -> Option<usize> {
    train
        .iter()
        .enumerate()
        .map(|(idx, t)| (idx, desc.l2_distance_squared(t)))
        .fold(None, |best: Option<(usize, f32)>, (idx, d)| match best {
            Some((_, bd)) if bd <= d => best,
            _ => Some((idx, d)),
        })
        .map(|(idx, _)| idx)
}

pub fn match_descriptors(
    query: &Descriptors,
    train: &Descriptors,
    ratio_threshold: Option<f32>,
) -> Matches {
    let mut matcher = Matcher::new();

    if let Some(threshold) = ratio_threshold {
        matcher = matcher.with_ratio_test(threshold);
    }

    matcher.match_descriptors(query, train)
}

/// The `k` nearest train descriptors for each query descriptor, closest first.
pub fn knn_match(query: &Descriptors, train: &Descriptors, k: usize) -> Vec<Vec<FeatureMatch>> {
    query
        .descriptors
        .par_iter()
        .enumerate()
        .map(|(query_idx, q_desc)| {
            let mut distances: Vec<(usize, f32)> = train
                .iter()
                .enumerate()
                .map(|(idx, t_desc)| (idx, q_desc.l2_distance(t_desc)))
                .collect();

            // stable: equal distances keep train order
            distances.sort_by(|a, b| a.1.total_cmp(&b.1));

            distances
                .into_iter()
                .take(k)
                .map(|(train_idx, distance)| FeatureMatch::new(query_idx, train_idx, distance))
                .collect()
        })
        .collect()
}
