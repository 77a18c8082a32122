//! Resource governor: batch-size cap, per-image dimension cap and memory budget.
//!
//! All checks run before any heavy work: the batch cap before a single file is read,
//! the memory check on header dimensions before the full decode.

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::config::GovernorConfig;
use crate::error::{Error, Result};

/// Percentage of available system memory the pipeline may use when no explicit
/// budget is configured.
pub const MEMORY_PERCENT: u64 = 75;

/// Peak bytes per source pixel while decoding (RGBA decode plus the RGB copy).
pub const DECODE_BYTES_PER_PIXEL: u64 = 7;

/// Peak bytes per fitted pixel while the stages run: two RGB buffers, three `f32`
/// colour planes and the denoiser's `f32` accumulators and patch-distance integral.
pub const PIPELINE_BYTES_PER_PIXEL: u64 = 48;

#[derive(Debug, Clone)]
pub struct ResourceGovernor {
    config: GovernorConfig,
    budget_bytes: u64,
}

impl ResourceGovernor {
    /// Creates a governor. Without an explicit budget, available system memory is
    /// sampled once here.
    pub fn new(config: GovernorConfig) -> Self {
        let budget_bytes = config
            .memory_budget_bytes
            .unwrap_or_else(|| get_available_memory() * MEMORY_PERCENT / 100);

        tracing::debug!(
            budget_mb = budget_bytes / (1024 * 1024),
            max_long_edge = config.max_long_edge,
            max_batch_size = config.max_batch_size,
            "Resource governor initialized"
        );

        Self {
            config,
            budget_bytes,
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Rejects a batch of `count` files when it exceeds the configured maximum.
    pub fn check_batch(&self, count: usize) -> Result<()> {
        check_batch_size(&self.config, count)
    }

    /// Dimensions after fitting `width × height` into the long-edge cap.
    pub fn fitted_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        fit_long_edge(width, height, self.config.max_long_edge)
    }

    /// Estimated peak working set for an image whose header reports `width × height`.
    pub fn estimate_peak_bytes(&self, width: u32, height: u32) -> u64 {
        let source = width as u64 * height as u64;
        let (fw, fh) = self.fitted_dimensions(width, height);
        let fitted = fw as u64 * fh as u64;

        let decode = source.saturating_mul(DECODE_BYTES_PER_PIXEL);
        let pipeline = fitted.saturating_mul(PIPELINE_BYTES_PER_PIXEL);
        decode.max(pipeline)
    }

    /// Fails with [`Error::MemoryExhaustion`] when the image would not fit the budget.
    pub fn check_memory(&self, name: &str, width: u32, height: u32) -> Result<()> {
        let required_bytes = self.estimate_peak_bytes(width, height);
        if required_bytes > self.budget_bytes {
            tracing::warn!(
                image = name,
                width,
                height,
                required_mb = required_bytes / (1024 * 1024),
                budget_mb = self.budget_bytes / (1024 * 1024),
                "Image exceeds memory budget"
            );
            return Err(Error::MemoryExhaustion {
                name: name.to_string(),
                required_bytes,
                available_bytes: self.budget_bytes,
            });
        }
        Ok(())
    }

    /// Downscales `image` so its longer edge equals the cap, preserving aspect ratio.
    ///
    /// Images already within bounds are returned untouched. The input buffer is
    /// consumed and released before this returns.
    pub fn fit(&self, image: RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let max = self.config.max_long_edge;
        if width.max(height) <= max {
            return image;
        }

        let (tw, th) = fit_long_edge(width, height, max);

        let image = if self.config.reduced_decode && width.max(height) >= max.saturating_mul(2) {
            let reduced = imageops::thumbnail(&image, tw * 2, th * 2);
            drop(image);
            reduced
        } else {
            image
        };

        let resized = imageops::resize(&image, tw, th, FilterType::Triangle);
        tracing::debug!(width, height, tw, th, "Image downscaled");
        resized
    }
}

/// Batch cap on its own, for hosts that must reject a request before reading any file.
pub fn check_batch_size(config: &GovernorConfig, count: usize) -> Result<()> {
    let max = config.max_batch_size;
    if count > max {
        tracing::warn!(count, max, "Batch rejected: too many files");
        return Err(Error::Capacity { count, max });
    }
    Ok(())
}

/// Scales `(width, height)` so the longer edge becomes `max`. Returns the input when it
/// already fits.
pub fn fit_long_edge(width: u32, height: u32, max: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= max || long == 0 {
        return (width, height);
    }
    let scale = max as f64 / long as f64;
    let short = |v: u32| ((v as f64 * scale).round() as u32).clamp(1, max);
    if width >= height {
        (max, short(height))
    } else {
        (short(width), max)
    }
}

/// Get available system memory in bytes.
fn get_available_memory() -> u64 {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}
