//! Scalar summary statistics recorded after each pipeline stage.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Arithmetic mean over every channel sample of `image`.
///
/// The sum is accumulated exactly in `u64`, so the result is bit-identical across calls
/// and stage means can be diffed directly. Returns `0.0` for an empty image.
pub fn mean_intensity(image: &RgbImage) -> f64 {
    let samples = image.as_raw();
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|&v| v as u64).sum();
    sum as f64 / samples.len() as f64
}

/// Mean intensity after each stage of one image's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageMeans {
    /// After decode and resource fitting.
    pub original: f64,
    pub denoised: f64,
    pub enhanced: f64,
    /// After detail enhancement.
    #[serde(rename = "final")]
    pub final_: f64,
}
