//! Unified batch configuration.
//!
//! A single [`Config`] record carries every knob the governor, the per-image pipeline,
//! the stitcher and the worker need. Two named profiles are provided:
//! [`Config::standard`] (default) and [`Config::constrained`] for memory-limited hosts.
//!
//! ```ignore
//! use lucent::config::{Config, DetailStrategy};
//!
//! let config = Config {
//!     pipeline: PipelineConfig {
//!         detail: DetailStrategy::edge_aware(),
//!         ..Default::default()
//!     },
//!     ..Config::constrained()
//! };
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::ConfigError;
use crate::stitch::ransac::RansacConfig;

/// Prefix of every processed-image entry written to the session store.
pub const OUTPUT_PREFIX: &str = "processed_";

// ============================================================================
// Governor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Maximum number of files accepted in one batch.
    pub max_batch_size: usize,
    /// Images whose longer edge exceeds this are downscaled to it.
    pub max_long_edge: u32,
    /// Allow a fast box reduction before the final resize of very large images.
    pub reduced_decode: bool,
    /// Explicit memory budget in bytes. `None` = 75% of available system memory.
    pub memory_budget_bytes: Option<u64>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 5,
            max_long_edge: 1200,
            reduced_decode: false,
            memory_budget_bytes: None,
        }
    }
}

// ============================================================================
// Pipeline stages
// ============================================================================

/// Non-local-means strength presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DenoiseProfile {
    /// Stronger filtering with larger windows.
    #[default]
    Quality,
    /// Smaller windows, a fraction of the compute.
    Light,
}

/// Concrete non-local-means parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenoiseParams {
    /// Filter strength `h` on the 0..255 scale.
    pub strength: f32,
    /// Side of the square patch compared between pixels (odd).
    pub template_window: usize,
    /// Side of the square search area around each pixel (odd).
    pub search_window: usize,
}

impl DenoiseProfile {
    pub fn params(self) -> DenoiseParams {
        match self {
            DenoiseProfile::Quality => DenoiseParams {
                strength: 10.0,
                template_window: 7,
                search_window: 21,
            },
            DenoiseProfile::Light => DenoiseParams {
                strength: 6.0,
                template_window: 5,
                search_window: 11,
            },
        }
    }
}

/// CLAHE presets applied to the luminance channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContrastPreset {
    /// Clip limit 3.0 over an 8×8 tile grid.
    #[default]
    Standard,
    /// Clip limit 1.5 over a 4×4 tile grid.
    Constrained,
}

/// Concrete CLAHE parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Histogram clip limit, relative to the mean bin height.
    pub clip_limit: f32,
    /// Tiles along the x axis.
    pub tiles_x: usize,
    /// Tiles along the y axis.
    pub tiles_y: usize,
}

impl ContrastPreset {
    pub fn params(self) -> ClaheParams {
        match self {
            ContrastPreset::Standard => ClaheParams {
                clip_limit: 3.0,
                tiles_x: 8,
                tiles_y: 8,
            },
            ContrastPreset::Constrained => ClaheParams {
                clip_limit: 1.5,
                tiles_x: 4,
                tiles_y: 4,
            },
        }
    }
}

/// Detail enhancement strategy. Exactly one is active per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
#[strum(serialize_all = "snake_case")]
pub enum DetailStrategy {
    /// 3×3 kernel `[0 -1 0; -1 5 -1; 0 -1 0]`.
    #[default]
    KernelSharpen,
    /// Edge-preserving base/detail decomposition with boosted detail.
    EdgeAware {
        /// Spatial sigma in pixels.
        sigma_s: f32,
        /// Range sigma on the normalized 0..1 intensity scale.
        sigma_r: f32,
    },
}

impl DetailStrategy {
    /// Edge-aware strategy with default sigmas.
    pub fn edge_aware() -> Self {
        Self::EdgeAware {
            sigma_s: 10.0,
            sigma_r: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub denoise: DenoiseProfile,
    pub contrast: ContrastPreset,
    pub detail: DetailStrategy,
}

// ============================================================================
// Stitching
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Fewer processed images than this are not stitched.
    pub min_images: usize,
    /// More processed images than this are not stitched.
    pub max_images: usize,
    /// Upper bound on detected corners per image.
    pub max_features: usize,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Lowe ratio for the nearest/second-nearest descriptor distance.
    pub match_ratio: f32,
    /// Matches with a larger Hamming distance are discarded.
    pub max_hamming_distance: u32,
    /// Minimum RANSAC inliers for a pair to be considered registered.
    pub min_inliers: usize,
    /// Panoramas larger than this many pixels are rejected.
    pub max_canvas_pixels: u64,
    pub ransac: RansacConfig,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            min_images: 2,
            max_images: 5,
            max_features: 800,
            fast_threshold: 20,
            match_ratio: 0.8,
            max_hamming_distance: 64,
            min_inliers: 12,
            max_canvas_pixels: 40_000_000,
            ransac: RansacConfig::default(),
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Threads in the batch pool. `0` = one per core.
    pub threads: usize,
    /// Batches a worker accepts before it asks to be recycled. `None` = unlimited.
    pub max_operations: Option<u32>,
    /// Upper bound of the random extra operations added to `max_operations`.
    pub max_operations_jitter: u32,
    /// Wall-clock limit for one batch in seconds. `0` disables the limit.
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_operations: None,
            max_operations_jitter: 0,
            request_timeout_secs: 120,
        }
    }
}

impl WorkerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

// ============================================================================
// Upload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Accepted file extensions, lowercase and without the dot.
    pub allowed_extensions: Vec<String>,
    /// Maximum total payload size of one request in bytes.
    pub max_payload_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: common::file_utils::IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_payload_bytes: 32 * 1024 * 1024,
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub governor: GovernorConfig,
    pub pipeline: PipelineConfig,
    pub stitch: StitchConfig,
    pub worker: WorkerConfig,
    pub upload: UploadPolicy,
    /// Prefix of processed-image entries in the session store.
    pub output_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            governor: GovernorConfig::default(),
            pipeline: PipelineConfig::default(),
            stitch: StitchConfig::default(),
            worker: WorkerConfig::default(),
            upload: UploadPolicy::default(),
            output_prefix: OUTPUT_PREFIX.to_string(),
        }
    }
}

/// Named configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Profile {
    #[default]
    Standard,
    Constrained,
}

impl Profile {
    pub fn config(self) -> Config {
        match self {
            Profile::Standard => Config::standard(),
            Profile::Constrained => Config::constrained(),
        }
    }
}

impl Config {
    // ========== Presets ==========

    /// Preset: full-quality processing on a multi-core host.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Preset: one cooperative worker with bounded memory and a recycling budget.
    pub fn constrained() -> Self {
        Self {
            governor: GovernorConfig {
                max_long_edge: 1024,
                reduced_decode: true,
                ..Default::default()
            },
            pipeline: PipelineConfig {
                denoise: DenoiseProfile::Light,
                contrast: ContrastPreset::Constrained,
                detail: DetailStrategy::KernelSharpen,
            },
            worker: WorkerConfig {
                threads: 1,
                max_operations: Some(50),
                max_operations_jitter: 5,
                request_timeout_secs: 90,
            },
            upload: UploadPolicy {
                max_payload_bytes: 10 * 1024 * 1024,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    // ========== Loading ==========

    /// Load a configuration from a YAML or JSON file; missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file_name = path.to_string_lossy();
        let format = common::FileFormat::from_file_name(&file_name)?;
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        common::deserialize(&text, format).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    // ========== Validation ==========

    /// Validate configuration parameters.
    ///
    /// # Panics
    ///
    /// Panics if parameters are out of range.
    pub fn validate(&self) {
        assert!(
            self.governor.max_batch_size > 0,
            "Max batch size must be at least 1"
        );
        assert!(
            self.governor.max_long_edge >= 16,
            "Max long edge must be at least 16 pixels"
        );
        if let DetailStrategy::EdgeAware { sigma_s, sigma_r } = self.pipeline.detail {
            assert!(sigma_s > 0.0, "Spatial sigma must be positive");
            assert!(sigma_r > 0.0, "Range sigma must be positive");
        }
        assert!(
            self.stitch.min_images >= 2,
            "Stitching needs at least 2 images"
        );
        assert!(
            self.stitch.max_images >= self.stitch.min_images,
            "Stitch max images must be >= min images"
        );
        assert!(
            self.stitch.match_ratio > 0.0 && self.stitch.match_ratio <= 1.0,
            "Match ratio must be in (0, 1]"
        );
        assert!(
            self.stitch.min_inliers >= 4,
            "A homography needs at least 4 inliers"
        );
        assert!(
            !self.output_prefix.contains(['/', '\\']),
            "Output prefix must not contain path separators"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_is_default() {
        let config = Config::standard();
        assert_eq!(config, Config::default());
        assert_eq!(config.governor.max_batch_size, 5);
        assert_eq!(config.governor.max_long_edge, 1200);
        assert_eq!(config.pipeline.denoise, DenoiseProfile::Quality);
        assert_eq!(config.pipeline.contrast, ContrastPreset::Standard);
        assert_eq!(config.pipeline.detail, DetailStrategy::KernelSharpen);
        assert_eq!(config.output_prefix, "processed_");
        config.validate();
    }

    #[test]
    fn test_constrained_preset() {
        let config = Config::constrained();
        assert_eq!(config.governor.max_long_edge, 1024);
        assert!(config.governor.reduced_decode);
        assert_eq!(config.pipeline.denoise, DenoiseProfile::Light);
        assert_eq!(config.pipeline.contrast, ContrastPreset::Constrained);
        assert_eq!(config.worker.threads, 1);
        assert_eq!(config.worker.max_operations, Some(50));
        assert_eq!(config.worker.max_operations_jitter, 5);
        assert_eq!(config.worker.request_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.upload.max_payload_bytes, 10 * 1024 * 1024);
        config.validate();
    }

    #[test]
    fn test_preset_params() {
        let quality = DenoiseProfile::Quality.params();
        let light = DenoiseProfile::Light.params();
        assert!(quality.strength > light.strength);
        assert!(quality.search_window > light.search_window);
        assert_eq!(quality.template_window % 2, 1);
        assert_eq!(light.search_window % 2, 1);

        let standard = ContrastPreset::Standard.params();
        assert_eq!((standard.tiles_x, standard.tiles_y), (8, 8));
        assert!((standard.clip_limit - 3.0).abs() < f32::EPSILON);
        let constrained = ContrastPreset::Constrained.params();
        assert_eq!((constrained.tiles_x, constrained.tiles_y), (4, 4));
        assert!((constrained.clip_limit - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_timeout_disables_limit() {
        let worker = WorkerConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(worker.request_timeout(), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(DenoiseProfile::Light.to_string(), "light");
        assert_eq!(ContrastPreset::Constrained.to_string(), "constrained");
        assert_eq!(DetailStrategy::edge_aware().to_string(), "edge_aware");
        assert_eq!(Profile::Constrained.to_string(), "constrained");
    }

    #[test]
    fn test_load_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lucent.yaml");
        std::fs::write(
            &path,
            "governor:\n  max_long_edge: 800\npipeline:\n  denoise: light\n  detail:\n    kind: edge_aware\n    sigma_s: 5.0\n    sigma_r: 0.2\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.governor.max_long_edge, 800);
        assert_eq!(config.governor.max_batch_size, 5);
        assert_eq!(config.pipeline.denoise, DenoiseProfile::Light);
        assert_eq!(config.pipeline.contrast, ContrastPreset::Standard);
        assert_eq!(
            config.pipeline.detail,
            DetailStrategy::EdgeAware {
                sigma_s: 5.0,
                sigma_r: 0.2
            }
        );
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lucent.json");
        let text = common::serialize(&Config::constrained(), common::FileFormat::Json).unwrap();
        std::fs::write(&path, text).unwrap();

        assert_eq!(Config::load(&path).unwrap(), Config::constrained());
    }

    #[test]
    fn test_load_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lucent.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Format(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(matches!(Config::load(&path), Err(ConfigError::Read { .. })));
    }

    #[test]
    #[should_panic(expected = "Max batch size must be at least 1")]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.governor.max_batch_size = 0;
        config.validate();
    }

    #[test]
    #[should_panic(expected = "Range sigma must be positive")]
    fn test_validate_rejects_bad_sigma() {
        let mut config = Config::default();
        config.pipeline.detail = DetailStrategy::EdgeAware {
            sigma_s: 10.0,
            sigma_r: 0.0,
        };
        config.validate();
    }
}
