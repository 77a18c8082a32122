//! Common imports for hosts embedding the batch processor.

pub use crate::batch::{
    BatchProcessor, BatchReport, FailureKind, ItemFailure, ItemReport, PanoramaReport,
    UploadedFile, WorkerBudget,
};
pub use crate::config::{
    Config, ContrastPreset, DenoiseProfile, DetailStrategy, GovernorConfig, PipelineConfig,
    Profile, StitchConfig, UploadPolicy, WorkerConfig,
};
pub use crate::error::{ConfigError, Error, Result, SessionError};
pub use crate::governor::ResourceGovernor;
pub use crate::pipeline::{Deadline, ImagePipeline, ProcessedImage};
pub use crate::session::{FsSessionStore, MemorySessionStore, SessionId, SessionStore};
pub use crate::stats::StageMeans;
pub use crate::stitch::{NotAttemptedReason, PanoramaOutcome, RegistrationFailure, Stitcher};
pub use crate::upload::UploadError;
