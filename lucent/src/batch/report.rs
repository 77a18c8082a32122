//! Serializable results of one batch.

use serde::Serialize;
use strum_macros::Display;

use crate::error::Error;
use crate::pipeline::{ProcessedImage, StageTimings};
use crate::session::SessionId;
use crate::stats::StageMeans;
use crate::stitch::{NotAttemptedReason, RegistrationFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Decode,
    MemoryExhaustion,
    /// The upload name is not a plain file name.
    InvalidName,
    /// Another upload of the same batch maps to the same session entry.
    DuplicateName,
}

/// A per-image failure that did not abort the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
    /// Whether resubmitting the image (possibly smaller) may succeed.
    pub retryable: bool,
}

impl ItemFailure {
    /// Per-item view of `error`; `None` for errors that must abort the batch.
    pub fn from_error(name: &str, error: &Error) -> Option<Self> {
        let kind = match error {
            Error::Decode { .. } => FailureKind::Decode,
            Error::MemoryExhaustion { .. } => FailureKind::MemoryExhaustion,
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            kind,
            message: error.to_string(),
            retryable: error.is_retryable(),
        })
    }

    /// An upload refused on its name alone. Resubmitting it unchanged cannot succeed.
    pub fn rejected(name: &str, kind: FailureKind, message: String) -> Self {
        Self {
            name: name.to_string(),
            kind,
            message,
            retryable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedReport {
    pub name: String,
    /// Session entry the output was written to.
    pub output: String,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub means: StageMeans,
    pub timings: StageTimings,
}

impl ProcessedReport {
    pub fn new(image: &ProcessedImage, output: String) -> Self {
        Self {
            name: image.name.clone(),
            output,
            width: image.pixels.width(),
            height: image.pixels.height(),
            source_width: image.source_dimensions.0,
            source_height: image.source_dimensions.1,
            means: image.means,
            timings: image.timings,
        }
    }
}

/// Outcome for one uploaded file, in upload order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemReport {
    Processed(ProcessedReport),
    Failed(ItemFailure),
}

impl ItemReport {
    pub fn name(&self) -> &str {
        match self {
            ItemReport::Processed(report) => &report.name,
            ItemReport::Failed(failure) => &failure.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PanoramaReport {
    Stitched {
        output: String,
        width: u32,
        height: u32,
        pair_inliers: Vec<usize>,
    },
    /// Attempted and failed; surfaced to the caller as a warning.
    Failed {
        message: String,
        failure: RegistrationFailure,
    },
    NotAttempted(NotAttemptedReason),
}

impl PanoramaReport {
    pub fn is_attempted(&self) -> bool {
        !matches!(self, PanoramaReport::NotAttempted(_))
    }

    pub fn is_stitched(&self) -> bool {
        matches!(self, PanoramaReport::Stitched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub session: SessionId,
    pub items: Vec<ItemReport>,
    pub panorama: PanoramaReport,
    pub elapsed_ms: f64,
}

impl BatchReport {
    pub fn processed(&self) -> impl Iterator<Item = &ProcessedReport> {
        self.items.iter().filter_map(|item| match item {
            ItemReport::Processed(report) => Some(report),
            ItemReport::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.items.iter().filter_map(|item| match item {
            ItemReport::Failed(failure) => Some(failure),
            ItemReport::Processed(_) => None,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
