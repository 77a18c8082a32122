//! Per-image pipeline: decode → fit → denoise → contrast → detail.
//!
//! Mean intensity is recorded after every stage. Each stage consumes the previous
//! buffer, so only the final [`ProcessedImage`] outlives a call.


mod deadline;

pub use deadline::Deadline;

use std::collections::TryReserveError;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::codec::{DecodeFailure, Decoder, ImageCrateDecoder};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::governor::ResourceGovernor;
use crate::stages;
use crate::stats::{StageMeans, mean_intensity};

/// A decoded, governor-fitted input image.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub pixels: RgbImage,
    /// Size of the encoded upload.
    pub byte_size: usize,
    /// Dimensions reported by the container before fitting.
    pub source_dimensions: (u32, u32),
}

/// Wall-clock time spent in each stage, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageTimings {
    /// Header read, decode and resize.
    pub decode_ms: f64,
    pub denoise_ms: f64,
    pub contrast_ms: f64,
    pub detail_ms: f64,
}

impl StageTimings {
    pub fn total_ms(&self) -> f64 {
        self.decode_ms + self.denoise_ms + self.contrast_ms + self.detail_ms
    }
}

/// Final pipeline output for one source image.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub name: String,
    pub pixels: RgbImage,
    pub means: StageMeans,
    pub timings: StageTimings,
    pub source_dimensions: (u32, u32),
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub struct ImagePipeline<D: Decoder = ImageCrateDecoder> {
    config: PipelineConfig,
    governor: ResourceGovernor,
    decoder: D,
}

impl ImagePipeline<ImageCrateDecoder> {
    pub fn new(config: PipelineConfig, governor: ResourceGovernor) -> Self {
        Self::with_decoder(config, governor, ImageCrateDecoder)
    }
}

impl<D: Decoder> ImagePipeline<D> {
    pub fn with_decoder(config: PipelineConfig, governor: ResourceGovernor, decoder: D) -> Self {
        Self {
            config,
            governor,
            decoder,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn governor(&self) -> &ResourceGovernor {
        &self.governor
    }

    /// Reads the header, checks the memory budget, decodes and fits the image.
    pub fn decode(&self, name: &str, bytes: &[u8]) -> Result<SourceImage> {
        let (width, height) = self
            .decoder
            .dimensions(bytes)
            .map_err(|failure| self.decode_error(name, failure, (0, 0)))?;
        self.governor.check_memory(name, width, height)?;

        let pixels = self
            .decoder
            .decode(bytes)
            .map_err(|failure| self.decode_error(name, failure, (width, height)))?;
        let pixels = self.governor.fit(pixels);

        Ok(SourceImage {
            name: name.to_string(),
            pixels,
            byte_size: bytes.len(),
            source_dimensions: (width, height),
        })
    }

    /// Runs the three stages over `source`, consuming it.
    pub fn run(&self, source: SourceImage, deadline: &Deadline) -> Result<ProcessedImage> {
        let SourceImage {
            name,
            pixels,
            source_dimensions,
            ..
        } = source;
        let (w, h) = pixels.dimensions();
        let oom = |_: TryReserveError| self.out_of_memory(&name, w, h);

        let mut means = StageMeans {
            original: mean_intensity(&pixels),
            ..Default::default()
        };
        let mut timings = StageTimings::default();

        deadline.check()?;
        let start = Instant::now();
        let pixels = stages::denoise(pixels, &self.config.denoise.params()).map_err(oom)?;
        timings.denoise_ms = elapsed_ms(start);
        means.denoised = mean_intensity(&pixels);

        deadline.check()?;
        let start = Instant::now();
        let pixels =
            stages::enhance_contrast(pixels, &self.config.contrast.params()).map_err(oom)?;
        timings.contrast_ms = elapsed_ms(start);
        means.enhanced = mean_intensity(&pixels);

        deadline.check()?;
        let start = Instant::now();
        let pixels = stages::enhance_detail(pixels, &self.config.detail).map_err(oom)?;
        timings.detail_ms = elapsed_ms(start);
        means.final_ = mean_intensity(&pixels);

        tracing::debug!(
            image = %name,
            width = w,
            height = h,
            original = means.original,
            denoised = means.denoised,
            enhanced = means.enhanced,
            final_mean = means.final_,
            denoise_ms = timings.denoise_ms,
            contrast_ms = timings.contrast_ms,
            detail_ms = timings.detail_ms,
            "Image pipeline complete"
        );

        Ok(ProcessedImage {
            name,
            pixels,
            means,
            timings,
            source_dimensions,
        })
    }

    /// [`decode`](Self::decode) followed by [`run`](Self::run).
    pub fn process(&self, name: &str, bytes: &[u8], deadline: &Deadline) -> Result<ProcessedImage> {
        deadline.check()?;
        let start = Instant::now();
        let source = self.decode(name, bytes)?;
        let decode_ms = elapsed_ms(start);

        let mut processed = self.run(source, deadline)?;
        processed.timings.decode_ms = decode_ms;
        Ok(processed)
    }

    fn decode_error(&self, name: &str, failure: DecodeFailure, dims: (u32, u32)) -> Error {
        match failure {
            DecodeFailure::Malformed(reason) => Error::Decode {
                name: name.to_string(),
                reason,
            },
            DecodeFailure::OutOfMemory(_) => self.out_of_memory(name, dims.0, dims.1),
        }
    }

    fn out_of_memory(&self, name: &str, width: u32, height: u32) -> Error {
        Error::MemoryExhaustion {
            name: name.to_string(),
            required_bytes: self.governor.estimate_peak_bytes(width, height),
            available_bytes: self.governor.budget_bytes(),
        }
    }
}
