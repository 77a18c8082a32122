//! Panorama assembly from 2–5 overlapping processed images.
//!
//! Adjacent images `(k, k+1)` are registered by matching BRIEF descriptors on FAST
//! corners and fitting a homography with RANSAC. Pair transforms are chained into the
//! frame of the middle image, the union of all mapped frames becomes the canvas and
//! every image is blended in with distance-to-edge feathering.
//!
//! The outcome keeps "not attempted" (image count outside the configured range) apart
//! from "attempted and failed" (registration could not produce a consistent panorama).
//! Neither is an error: only a deadline expiry escapes as [`Error`](crate::error::Error).


pub mod compose;
pub mod features;
pub mod homography;
pub mod matching;
pub mod ransac;

use glam::DVec2;
use image::RgbImage;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::config::StitchConfig;
use crate::error::Result;
use crate::pipeline::Deadline;

use compose::{Canvas, compose};
use features::{Features, extract_features};
pub use homography::Homography;
use matching::Matcher;
use ransac::RansacEstimator;

/// Why stitching was skipped without trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotAttemptedReason {
    InsufficientImages { count: usize, min: usize },
    TooManyImages { count: usize, max: usize },
}

/// Why an attempted registration did not produce a panorama.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RegistrationFailure {
    #[error("Image {image} has {found} usable features, {required} required")]
    InsufficientFeatures {
        image: usize,
        found: usize,
        required: usize,
    },

    #[error("Images {pair:?} share {found} descriptor matches, {required} required")]
    InsufficientMatches {
        pair: (usize, usize),
        found: usize,
        required: usize,
    },

    #[error("No homography with at least {required} inliers between images {pair:?}")]
    HomographyNotFound { pair: (usize, usize), required: usize },

    #[error("Homography between images {pair:?} is degenerate")]
    DegenerateHomography { pair: (usize, usize) },

    #[error("Panorama canvas of {width}x{height} exceeds {max_pixels} pixels")]
    CanvasTooLarge {
        width: u64,
        height: u64,
        max_pixels: u64,
    },
}

/// A successfully blended panorama.
#[derive(Debug, Clone)]
pub struct Panorama {
    pub pixels: RgbImage,
    /// Per input image: transform into canvas pixel coordinates.
    pub transforms: Vec<Homography>,
    /// RANSAC inliers of each adjacent pair.
    pub pair_inliers: Vec<usize>,
}

#[derive(Debug, Clone)]
pub enum PanoramaOutcome {
    Stitched(Panorama),
    RegistrationFailed(RegistrationFailure),
    NotAttempted(NotAttemptedReason),
}

impl PanoramaOutcome {
    pub fn is_attempted(&self) -> bool {
        !matches!(self, PanoramaOutcome::NotAttempted(_))
    }

    pub fn panorama(&self) -> Option<&Panorama> {
        match self {
            PanoramaOutcome::Stitched(panorama) => Some(panorama),
            _ => None,
        }
    }
}

pub struct Stitcher {
    config: StitchConfig,
}

impl Stitcher {
    pub fn new(config: StitchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Registers and blends `images` in order.
    ///
    /// Fails only when `deadline` expires between steps.
    pub fn stitch(&self, images: &[&RgbImage], deadline: &Deadline) -> Result<PanoramaOutcome> {
        let count = images.len();
        if count < self.config.min_images {
            return Ok(PanoramaOutcome::NotAttempted(
                NotAttemptedReason::InsufficientImages {
                    count,
                    min: self.config.min_images,
                },
            ));
        }
        if count > self.config.max_images {
            return Ok(PanoramaOutcome::NotAttempted(
                NotAttemptedReason::TooManyImages {
                    count,
                    max: self.config.max_images,
                },
            ));
        }

        deadline.check()?;
        let features: Vec<Features> = images
            .par_iter()
            .map(|image| {
                extract_features(image, self.config.max_features, self.config.fast_threshold)
            })
            .collect();

        for (image, f) in features.iter().enumerate() {
            tracing::debug!(image, features = f.len(), "Features extracted");
            if f.len() < self.config.min_inliers {
                return Ok(PanoramaOutcome::RegistrationFailed(
                    RegistrationFailure::InsufficientFeatures {
                        image,
                        found: f.len(),
                        required: self.config.min_inliers,
                    },
                ));
            }
        }

        // pair_transforms[k] maps image k+1 into the frame of image k.
        let mut pair_transforms = Vec::with_capacity(count - 1);
        let mut pair_inliers = Vec::with_capacity(count - 1);
        for k in 0..count - 1 {
            deadline.check()?;
            match self.register_pair(&features[k], &features[k + 1], images[k + 1], (k, k + 1)) {
                Ok((h, inliers)) => {
                    pair_transforms.push(h);
                    pair_inliers.push(inliers);
                }
                Err(failure) => return Ok(PanoramaOutcome::RegistrationFailed(failure)),
            }
        }

        let Some(transforms) = chain_to_middle(&pair_transforms) else {
            return Ok(PanoramaOutcome::RegistrationFailed(
                RegistrationFailure::DegenerateHomography {
                    pair: (0, count - 1),
                },
            ));
        };

        deadline.check()?;
        let sizes: Vec<(u32, u32)> = images.iter().map(|image| image.dimensions()).collect();
        let Some(canvas) = Canvas::enclosing(&sizes, &transforms) else {
            return Ok(PanoramaOutcome::RegistrationFailed(
                RegistrationFailure::DegenerateHomography {
                    pair: (0, count - 1),
                },
            ));
        };
        let too_large = RegistrationFailure::CanvasTooLarge {
            width: canvas.width as u64,
            height: canvas.height as u64,
            max_pixels: self.config.max_canvas_pixels,
        };
        if canvas.pixel_count() > self.config.max_canvas_pixels {
            return Ok(PanoramaOutcome::RegistrationFailed(too_large));
        }

        let pixels = match compose(images, &transforms, &canvas) {
            Ok(pixels) => pixels,
            Err(_) => return Ok(PanoramaOutcome::RegistrationFailed(too_large)),
        };

        // Express the transforms in canvas pixel coordinates.
        let shift = Homography::translation(-canvas.origin.x, -canvas.origin.y);
        let transforms = transforms.iter().map(|t| shift.compose(t)).collect();

        tracing::debug!(
            images = count,
            width = canvas.width,
            height = canvas.height,
            inliers = ?pair_inliers,
            "Panorama composed"
        );

        Ok(PanoramaOutcome::Stitched(Panorama {
            pixels,
            transforms,
            pair_inliers,
        }))
    }

    /// Homography mapping image `pair.1` into the frame of image `pair.0`.
    fn register_pair(
        &self,
        reference: &Features,
        moving: &Features,
        moving_image: &RgbImage,
        pair: (usize, usize),
    ) -> std::result::Result<(Homography, usize), RegistrationFailure> {
        let required = self.config.min_inliers;
        let matcher = Matcher::new(self.config.match_ratio, self.config.max_hamming_distance);
        let matches = matcher.match_descriptors(&moving.descriptors, &reference.descriptors);
        tracing::debug!(?pair, matches = matches.len(), "Descriptors matched");
        if matches.len() < required {
            return Err(RegistrationFailure::InsufficientMatches {
                pair,
                found: matches.len(),
                required,
            });
        }

        let moving_points: Vec<DVec2> = matches.iter().map(|m| moving.keypoints[m.query]).collect();
        let reference_points: Vec<DVec2> =
            matches.iter().map(|m| reference.keypoints[m.train]).collect();

        let estimator = RansacEstimator::new(self.config.ransac.clone());
        let result = estimator
            .estimate(&moving_points, &reference_points)
            .filter(|r| r.inliers.len() >= required)
            .ok_or(RegistrationFailure::HomographyNotFound { pair, required })?;

        if !result
            .homography
            .is_plausible(moving_image.width(), moving_image.height())
        {
            return Err(RegistrationFailure::DegenerateHomography { pair });
        }

        tracing::debug!(
            ?pair,
            inliers = result.inliers.len(),
            iterations = result.iterations,
            "Pair registered"
        );
        Ok((result.homography, result.inliers.len()))
    }
}

/// Transforms of every image into the frame of image `n / 2`, given the
/// transforms of each image `k + 1` into frame `k`.
fn chain_to_middle(pair_transforms: &[Homography]) -> Option<Vec<Homography>> {
    let n = pair_transforms.len() + 1;
    let middle = n / 2;
    let mut transforms = vec![Homography::IDENTITY; n];

    for i in (middle + 1)..n {
        transforms[i] = transforms[i - 1].compose(&pair_transforms[i - 1]);
    }
    for i in (0..middle).rev() {
        transforms[i] = transforms[i + 1].compose(&pair_transforms[i].inverse()?);
    }

    transforms
        .iter()
        .all(Homography::is_finite)
        .then_some(transforms)
}
