//! RANSAC homography estimation between two sets of matched keypoints.
//!
//! 1. Draw a random minimal sample of 4 correspondences
//! 2. Fit a homography with the normalized DLT
//! 3. Score it by truncated squared reprojection error over all matches
//! 4. Refine promising hypotheses on their inliers (LO-RANSAC)
//! 5. Refit the best model on its final inlier set


use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::homography::{Homography, estimate_homography};

/// Correspondences needed to fix a homography.
pub const MIN_SAMPLE: usize = 4;

/// RANSAC configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Inlier reprojection threshold in pixels.
    pub inlier_threshold: f64,
    /// Target confidence for early termination.
    pub confidence: f64,
    /// Minimum inlier ratio before early termination is considered.
    pub min_inlier_ratio: f64,
    /// Random seed (None draws one from the OS).
    pub seed: Option<u64>,
    /// Refine promising hypotheses on their inliers.
    pub use_local_optimization: bool,
    pub lo_max_iterations: usize,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            inlier_threshold: 3.0,
            confidence: 0.999,
            min_inlier_ratio: 0.2,
            seed: Some(0x5EED),
            use_local_optimization: true,
            lo_max_iterations: 10,
        }
    }
}

/// Result of RANSAC estimation.
#[derive(Debug, Clone)]
pub struct RansacResult {
    /// Maps reference points onto target points.
    pub homography: Homography,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    pub inlier_ratio: f64,
}

pub struct RansacEstimator {
    config: RansacConfig,
}

impl RansacEstimator {
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Estimate the homography mapping `ref_points` onto `target_points`.
    ///
    /// Returns `None` with fewer than 4 correspondences or when no sample yields
    /// a model supported by at least 4 inliers.
    pub fn estimate(&self, ref_points: &[DVec2], target_points: &[DVec2]) -> Option<RansacResult> {
        let n = ref_points.len();
        if n < MIN_SAMPLE || target_points.len() != n {
            return None;
        }

        let mut rng: ChaCha8Rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };

        let mut best: Option<Homography> = None;
        let mut best_inliers: Vec<usize> = Vec::new();
        let mut best_score = 0.0f64;

        let mut sample_indices: Vec<usize> = Vec::with_capacity(MIN_SAMPLE);
        let mut sample_ref: Vec<DVec2> = Vec::with_capacity(MIN_SAMPLE);
        let mut sample_target: Vec<DVec2> = Vec::with_capacity(MIN_SAMPLE);

        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            iterations += 1;

            random_sample_into(&mut rng, n, MIN_SAMPLE, &mut sample_indices);
            sample_ref.clear();
            sample_target.clear();
            for &i in &sample_indices {
                sample_ref.push(ref_points[i]);
                sample_target.push(target_points[i]);
            }
            if is_degenerate_sample(&sample_ref) || is_degenerate_sample(&sample_target) {
                continue;
            }

            let Some(model) = estimate_homography(&sample_ref, &sample_target) else {
                continue;
            };

            let (mut inliers, mut score) = count_inliers(
                ref_points,
                target_points,
                &model,
                self.config.inlier_threshold,
            );
            let mut model = model;

            if self.config.use_local_optimization && inliers.len() > MIN_SAMPLE {
                (model, inliers, score) =
                    self.local_optimization(ref_points, target_points, model, inliers, score);
            }

            if score > best_score {
                best_score = score;
                best_inliers = inliers;
                best = Some(model);

                let inlier_ratio = best_inliers.len() as f64 / n as f64;
                if inlier_ratio >= self.config.min_inlier_ratio
                    && iterations
                        >= adaptive_iterations(inlier_ratio, MIN_SAMPLE, self.config.confidence)
                {
                    break;
                }
            }
        }

        let model = best?;
        if best_inliers.len() < MIN_SAMPLE {
            return None;
        }

        let inlier_ref: Vec<DVec2> = best_inliers.iter().map(|&i| ref_points[i]).collect();
        let inlier_target: Vec<DVec2> = best_inliers.iter().map(|&i| target_points[i]).collect();
        let refined = estimate_homography(&inlier_ref, &inlier_target).unwrap_or(model);

        let (final_inliers, _) = count_inliers(
            ref_points,
            target_points,
            &refined,
            self.config.inlier_threshold,
        );
        // Keep the sampled model if the refit lost support.
        let (homography, inliers) = if final_inliers.len() >= best_inliers.len() {
            (refined, final_inliers)
        } else {
            (model, best_inliers)
        };

        let inlier_ratio = inliers.len() as f64 / n as f64;
        tracing::trace!(
            iterations,
            matches = n,
            inliers = inliers.len(),
            inlier_ratio,
            "RANSAC finished"
        );

        Some(RansacResult {
            homography,
            inliers,
            iterations,
            inlier_ratio,
        })
    }

    /// Re-fit on the current inliers until the score stops improving.
    fn local_optimization(
        &self,
        ref_points: &[DVec2],
        target_points: &[DVec2],
        model: Homography,
        inliers: Vec<usize>,
        score: f64,
    ) -> (Homography, Vec<usize>, f64) {
        let mut current = (model, inliers, score);

        for _ in 0..self.config.lo_max_iterations {
            let inlier_ref: Vec<DVec2> = current.1.iter().map(|&i| ref_points[i]).collect();
            let inlier_target: Vec<DVec2> = current.1.iter().map(|&i| target_points[i]).collect();

            let Some(refined) = estimate_homography(&inlier_ref, &inlier_target) else {
                break;
            };
            let (new_inliers, new_score) = count_inliers(
                ref_points,
                target_points,
                &refined,
                self.config.inlier_threshold,
            );
            if new_score <= current.2 || new_inliers.len() < MIN_SAMPLE {
                break;
            }
            current = (refined, new_inliers, new_score);
        }

        current
    }
}

/// Floyd's algorithm: `k` distinct indices from `0..n`.
fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    debug_assert!(k <= n, "Cannot sample {k} indices from {n}");
    buffer.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if buffer.contains(&t) {
            buffer.push(j);
        } else {
            buffer.push(t);
        }
    }
}

/// A minimal sample with three nearly collinear points cannot fix a homography.
fn is_degenerate_sample(points: &[DVec2]) -> bool {
    const MIN_TWICE_AREA: f64 = 1.0;
    let n = points.len();
    for a in 0..n {
        for b in (a + 1)..n {
            for c in (b + 1)..n {
                let twice_area = (points[b] - points[a]).perp_dot(points[c] - points[a]);
                if twice_area.abs() < MIN_TWICE_AREA {
                    return true;
                }
            }
        }
    }
    false
}

/// Inlier indices and MSAC score: every inlier adds `1 - err² / threshold²`.
fn count_inliers(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    model: &Homography,
    threshold: f64,
) -> (Vec<usize>, f64) {
    let threshold_sq = threshold * threshold;
    let mut inliers = Vec::new();
    let mut score = 0.0;

    for (i, (r, t)) in ref_points.iter().zip(target_points).enumerate() {
        let Some(mapped) = model.apply(*r) else {
            continue;
        };
        let err_sq = mapped.distance_squared(*t);
        if err_sq < threshold_sq {
            inliers.push(i);
            score += 1.0 - err_sq / threshold_sq;
        }
    }

    (inliers, score)
}

/// Iterations needed to draw one all-inlier sample with the given confidence.
pub(crate) fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 || inlier_ratio >= 1.0 {
        return 1;
    }

    // N = log(1 - confidence) / log(1 - w^n)
    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_conf = (1.0 - confidence).ln();
    let log_outlier = (1.0 - w_n).ln();

    if log_outlier >= 0.0 {
        return usize::MAX;
    }

    (log_conf / log_outlier).ceil() as usize
}
